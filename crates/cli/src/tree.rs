// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The execution tree and its two passes.
//!
//! A deployment is a finite rooted tree: group nodes frame and order
//! their children, transform leaves do the work. The Calculate pass
//! threads a hash through every leaf and rewrites the tree on the way:
//! the leaf whose output equals the resume hash is dropped together
//! with everything before it, and a leaf whose output state is fully
//! cached is replaced by a restore-from-cache subtree. Both rewrites
//! ride the same rule: a child that reports `changed` discards all
//! previously accumulated siblings. The Run pass then executes whatever
//! survived, strictly depth-first, recording the resume hash after
//! every leaf and feeding slow interior states into the cache.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cache::CacheManager;
use crate::console::Console;
use crate::error::Result;
use crate::hash::StateHash;
use crate::resume;
use crate::transforms::{
    RequirementSink, RestoreDatabasesTransform, RunEnv, StateTransform,
};

/// Interior node: frames an ordered list of children.
#[derive(Debug)]
pub struct GroupNode {
    /// Line emitted before the children run.
    pub pre: Option<String>,

    /// Line emitted after the children ran.
    pub post: Option<String>,

    /// Paths that must exist before any child runs (task `requires`).
    pub required_paths: Vec<PathBuf>,

    /// Ordered children; order is significant for hashing and execution.
    pub children: Vec<ExecutionNode>,
}

/// A node is either a group or a single transform, never both.
pub enum ExecutionNode {
    Group(GroupNode),
    Transform(Box<dyn StateTransform>),
}

impl std::fmt::Debug for ExecutionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionNode::Group(g) => f.debug_tuple("Group").field(g).finish(),
            ExecutionNode::Transform(t) => {
                f.debug_tuple("Transform").field(&t.describe()).finish()
            }
        }
    }
}

/// Result of calculating one node.
pub struct CalcOutcome {
    /// The rewritten node; `None` elides it from the parent.
    pub node: Option<ExecutionNode>,

    /// Hash after this node.
    pub hash: StateHash,

    /// This node (or a descendant) superseded everything before it.
    pub changed: bool,

    /// State hash of the latest cache substitution in this subtree.
    pub cache_hash: Option<StateHash>,
}

/// Inputs of the Calculate pass.
pub struct CalcContext<'a> {
    /// Project-declared databases; a cache hit needs a backup for all.
    pub databases: &'a [String],
}

/// Inputs of the Run pass.
pub struct RunContext<'a> {
    pub env: RunEnv<'a>,
    pub databases: &'a [String],
    pub resume_path: &'a Path,
    /// Interior leaves at least this slow are worth caching.
    pub min_deploy_time: Duration,
}

impl ExecutionNode {
    pub fn group(pre: Option<String>, post: Option<String>, children: Vec<ExecutionNode>) -> Self {
        ExecutionNode::Group(GroupNode {
            pre,
            post,
            required_paths: Vec::new(),
            children,
        })
    }

    pub fn transform(transform: impl StateTransform + 'static) -> Self {
        ExecutionNode::Transform(Box::new(transform))
    }

    /// Calculate pass: thread the hash, rewrite for resume and cache.
    pub fn calculate(
        self,
        ctx: &CalcContext<'_>,
        input: &StateHash,
        starting: Option<&StateHash>,
        cache: Option<&CacheManager>,
    ) -> Result<CalcOutcome> {
        match self {
            ExecutionNode::Transform(transform) => {
                let hash = transform.calculate(input)?;

                // Resume point: drop this leaf and everything before it
                if starting == Some(&hash) {
                    return Ok(CalcOutcome {
                        node: None,
                        hash,
                        changed: true,
                        cache_hash: None,
                    });
                }

                // Full cache hit: restore instead of replaying history
                if let Some(cache) = cache
                    && let Some(backups) = cache.cached_backups(ctx.databases, &hash)
                {
                    let restore = ExecutionNode::group(
                        Some("Restoring state from cache".to_string()),
                        None,
                        vec![ExecutionNode::transform(
                            RestoreDatabasesTransform::from_cache(backups, hash),
                        )],
                    );
                    return Ok(CalcOutcome {
                        node: Some(restore),
                        hash,
                        changed: true,
                        cache_hash: Some(hash),
                    });
                }

                Ok(CalcOutcome {
                    node: Some(ExecutionNode::Transform(transform)),
                    hash,
                    changed: false,
                    cache_hash: None,
                })
            }

            ExecutionNode::Group(node) => {
                let mut current = *input;
                let mut rewritten: Vec<ExecutionNode> = Vec::new();
                let mut changed = false;
                let mut cache_hash = None;

                for child in node.children {
                    let outcome = child.calculate(ctx, &current, starting, cache)?;
                    current = outcome.hash;

                    if outcome.changed {
                        // The resume / cache step supersedes earlier leaves
                        rewritten.clear();
                        changed = true;
                    }
                    if outcome.cache_hash.is_some() {
                        cache_hash = outcome.cache_hash;
                    }
                    if let Some(child) = outcome.node {
                        rewritten.push(child);
                    }
                }

                if rewritten.is_empty() {
                    return Ok(CalcOutcome {
                        node: None,
                        hash: current,
                        changed,
                        cache_hash,
                    });
                }

                Ok(CalcOutcome {
                    node: Some(ExecutionNode::Group(GroupNode {
                        pre: node.pre,
                        post: node.post,
                        required_paths: node.required_paths,
                        children: rewritten,
                    })),
                    hash: current,
                    changed,
                    cache_hash,
                })
            }
        }
    }

    /// Requirements pass: depth-first collection of unmet preconditions.
    pub fn requirements(&self, sink: &mut RequirementSink) {
        match self {
            ExecutionNode::Transform(transform) => transform.requirements(sink),
            ExecutionNode::Group(node) => {
                for path in &node.required_paths {
                    sink.require_path(path, "task requirement");
                }
                for child in &node.children {
                    child.requirements(sink);
                }
            }
        }
    }

    /// Run pass: execute depth-first, threading the hash.
    ///
    /// `first`/`last` mark the outermost leaves of the whole run; they
    /// are never cached — the baseline restore is the starting state and
    /// the terminal leaf is the finished one.
    pub fn run(
        &self,
        ctx: &RunContext<'_>,
        console: &mut Console,
        cache: Option<&CacheManager>,
        input: &StateHash,
        first: bool,
        last: bool,
    ) -> Result<StateHash> {
        match self {
            ExecutionNode::Group(node) => {
                if let Some(pre) = &node.pre {
                    console.heading(pre);
                }
                console.push();

                let mut current = *input;
                let count = node.children.len();
                for (index, child) in node.children.iter().enumerate() {
                    current = child.run(
                        ctx,
                        console,
                        cache,
                        &current,
                        first && index == 0,
                        last && index + 1 == count,
                    )?;
                }

                console.pop();
                if let Some(post) = &node.post {
                    console.line(post);
                }
                Ok(current)
            }

            ExecutionNode::Transform(transform) => {
                console.line(&transform.describe());

                let started = Instant::now();
                let output = transform.run(input, &ctx.env, console)?;
                let elapsed = started.elapsed();

                if !ctx.env.dry_run {
                    resume::save(ctx.resume_path, &output)?;

                    if !first
                        && !last
                        && elapsed >= ctx.min_deploy_time
                        && let Some(cache) = cache
                    {
                        for db in ctx.databases {
                            cache.add(ctx.env.runner, ctx.env.connection, db, &output);
                        }
                    }
                }
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
