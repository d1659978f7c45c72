// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Leaf operations of the execution tree.
//!
//! A transform deterministically maps an input [`StateHash`] to an
//! output hash and optionally performs side effects. The contract every
//! implementation must honor: `calculate` is pure and returns exactly
//! the hash `run` would, and `run` under dry-run only narrates.

pub mod copy;
pub mod restore;
pub mod sql;

use std::path::Path;

pub use copy::CopyTransform;
pub use restore::{DatabaseBackup, RestoreDatabasesTransform};
pub use sql::SqlTransform;

use crate::console::Console;
use crate::error::Result;
use crate::hash::StateHash;
use crate::sql::SqlRunner;

/// Execution-time collaborators handed to every leaf.
pub struct RunEnv<'a> {
    pub runner: &'a dyn SqlRunner,
    pub connection: &'a str,
    pub dry_run: bool,
}

/// A leaf operation of the execution tree.
pub trait StateTransform {
    /// One-line description for progress output.
    fn describe(&self) -> String;

    /// Pure fingerprint step: no side effects, reads only the input
    /// files needed to compute the hash.
    fn calculate(&self, input: &StateHash) -> Result<StateHash>;

    /// Report unmet preconditions; called before any side effect.
    fn requirements(&self, sink: &mut RequirementSink);

    /// Perform the side effects and return the same hash `calculate`
    /// would. Under `env.dry_run` this narrates instead of mutating.
    fn run(&self, input: &StateHash, env: &RunEnv<'_>, console: &mut Console)
    -> Result<StateHash>;
}

/// Collects unmet preconditions across the tree.
#[derive(Debug, Default)]
pub struct RequirementSink {
    unmet: Vec<String>,
}

/// Enumerate files under `root` whose base name matches `regex`,
/// sorted by `/`-normalized relative path (case-sensitive byte order).
/// Every hashing traversal goes through here: directory order is not
/// deterministic across platforms, sorted relative paths are.
pub(crate) fn matching_files(
    root: &Path,
    regex: &regex::Regex,
) -> Result<Vec<(String, std::path::PathBuf)>> {
    use crate::error::Error;

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .build()
    {
        let entry = entry.map_err(|e| {
            Error::config(format!("walk error under {}: {e}", root.display()))
        })?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !regex.is_match(&name) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let normalized = relative.to_string_lossy().replace('\\', "/");
        files.push((normalized, entry.into_path()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

impl RequirementSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` must exist for `what` to run.
    pub fn require_path(&mut self, path: &Path, what: &str) {
        if !path.exists() {
            self.unmet
                .push(format!("{what}: missing path {}", path.display()));
        }
    }

    pub fn record(&mut self, message: String) {
        self.unmet.push(message);
    }

    pub fn unmet(&self) -> &[String] {
        &self.unmet
    }

    /// True when anything was recorded.
    pub fn finish(&self) -> bool {
        !self.unmet.is_empty()
    }
}
