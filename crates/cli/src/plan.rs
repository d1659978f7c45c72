// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Baseline resolution: walk the release chain backwards to the newest
//! release whose backups exist on disk, and plan the releases to replay
//! on top of it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::{Project, ReleaseConfig};
use crate::error::{Error, Result};
use crate::transforms::DatabaseBackup;

/// The planner's output: which backups to restore and which releases to
/// apply afterwards, baseline-adjacent first.
#[derive(Debug)]
pub struct ActionPlan {
    /// One backup per project database, in project-declared order.
    pub databases: Vec<DatabaseBackup>,

    /// Releases to replay, innermost (closest to the baseline) first.
    pub releases: Vec<ReleaseConfig>,
}

/// Backups on disk, indexed by release, then environment in discovery
/// order, then database. Keys are lowercased; SQL Server identifiers
/// and backup file names are not case-sensitive in practice.
struct BackupIndex {
    releases: BTreeMap<String, Vec<(String, BTreeMap<String, PathBuf>)>>,
}

impl BackupIndex {
    fn scan(dir: &Path, pattern: &Regex) -> Result<Self> {
        let group_names: Vec<&str> = pattern.capture_names().flatten().collect();
        for required in ["release", "dbName"] {
            if !group_names.contains(&required) {
                return Err(Error::config(format!(
                    "backup pattern must contain a named group '{required}'"
                )));
            }
        }

        let mut releases: BTreeMap<String, Vec<(String, BTreeMap<String, PathBuf>)>> =
            BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Self { releases });
        }

        // Sorted names make env discovery order reproducible
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
            let entry = entry.map_err(|e| Error::io(dir, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();

        for name in names {
            let Some(captures) = pattern.captures(&name) else {
                continue;
            };
            let release = captures["release"].to_lowercase();
            let db = captures["dbName"].to_lowercase();
            // No env group, or an unmatched optional one: agnostic backup
            let env = captures
                .name("env")
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default();

            let envs = releases.entry(release).or_default();
            let databases = match envs.iter_mut().find(|(known, _)| *known == env) {
                Some((_, databases)) => databases,
                None => {
                    envs.push((env, BTreeMap::new()));
                    &mut envs
                        .last_mut()
                        .ok_or_else(|| Error::config("backup index corrupt"))?
                        .1
                }
            };
            databases.insert(db, dir.join(&name));
        }

        Ok(Self { releases })
    }

    /// A complete backup set for `release`: the preferred environment
    /// when it covers every database, else the first one that does.
    fn complete_set(
        &self,
        release: &str,
        preferred_env: &str,
        databases: &[String],
    ) -> Option<Vec<DatabaseBackup>> {
        let envs = self.releases.get(&release.to_lowercase())?;
        let preferred = preferred_env.to_lowercase();

        let ordered = envs
            .iter()
            .filter(|(env, _)| *env == preferred)
            .chain(envs.iter().filter(|(env, _)| *env != preferred));

        for (_, available) in ordered {
            let mut backups = Vec::with_capacity(databases.len());
            for db in databases {
                match available.get(&db.to_lowercase()) {
                    Some(path) => backups.push(DatabaseBackup {
                        database: db.clone(),
                        backup: path.clone(),
                    }),
                    None => {
                        backups.clear();
                        break;
                    }
                }
            }
            if !backups.is_empty() {
                return Some(backups);
            }
        }
        None
    }
}

/// Resolve the baseline for `active` and stack the releases to replay.
pub fn build_plan(
    project: &Project,
    active: &ReleaseConfig,
    environment: &str,
) -> Result<ActionPlan> {
    let backups_dir = project.root.join(&project.user.backups.path);
    let pattern = Regex::new(&project.user.backups.pattern)
        .map_err(|e| Error::config(format!("invalid backup pattern: {e}")))?;
    let index = BackupIndex::scan(&backups_dir, &pattern)?;

    let mut stack: Vec<ReleaseConfig> = Vec::new();
    let mut head = active.clone();

    loop {
        if let Some(databases) =
            index.complete_set(&head.name, environment, &project.config.databases)
        {
            // Replay order: pop the stack, baseline-adjacent first
            let releases = stack.into_iter().rev().collect();
            return Ok(ActionPlan {
                databases,
                releases,
            });
        }

        let Some(baseline) = head.baseline.clone() else {
            return Err(Error::NoBaseline {
                release: head.name.clone(),
            });
        };
        let next = project.release(&baseline)?.clone();
        stack.push(head);
        head = next;
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
