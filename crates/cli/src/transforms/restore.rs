// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Database restore leaf, used for both the baseline restore and the
//! cache-substituted restore.

use std::path::PathBuf;
use std::time::SystemTime;

use super::{RequirementSink, RunEnv, StateTransform};
use crate::console::Console;
use crate::error::{Error, Result};
use crate::hash::{HashTransformer, StateHash};

/// One database and the backup file it restores from.
#[derive(Debug, Clone)]
pub struct DatabaseBackup {
    pub database: String,
    pub backup: PathBuf,
}

/// Restores every listed database, in order.
///
/// For a baseline restore the fingerprint is derived from each backup's
/// descriptor (path, size, mtime). A cache restore instead carries the
/// fixed hash the cache entry was stored under: the leaf must reproduce
/// exactly that state fingerprint, or every leaf after it would hash
/// differently than the run that populated the cache.
pub struct RestoreDatabasesTransform {
    databases: Vec<DatabaseBackup>,
    result_hash: Option<StateHash>,
}

impl RestoreDatabasesTransform {
    pub fn baseline(databases: Vec<DatabaseBackup>) -> Self {
        Self {
            databases,
            result_hash: None,
        }
    }

    pub fn from_cache(databases: Vec<DatabaseBackup>, result_hash: StateHash) -> Self {
        Self {
            databases,
            result_hash: Some(result_hash),
        }
    }
}

impl StateTransform for RestoreDatabasesTransform {
    fn describe(&self) -> String {
        format!("restore {} database(s)", self.databases.len())
    }

    fn calculate(&self, input: &StateHash) -> Result<StateHash> {
        if let Some(fixed) = &self.result_hash {
            return Ok(*fixed);
        }

        let mut transformer = HashTransformer::new(input);
        for entry in &self.databases {
            let meta = std::fs::metadata(&entry.backup)
                .map_err(|e| Error::io(&entry.backup, e))?;
            let mtime = meta
                .modified()
                .map_err(|e| Error::io(&entry.backup, e))?
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();

            transformer.update(entry.database.as_bytes());
            transformer.update(&[0u8]);
            let descriptor = format!(
                "{}|{}|{}.{:09}",
                entry.backup.display().to_string().replace('\\', "/"),
                meta.len(),
                mtime.as_secs(),
                mtime.subsec_nanos(),
            );
            transformer.update(descriptor.as_bytes());
        }
        Ok(transformer.finish())
    }

    fn requirements(&self, sink: &mut RequirementSink) {
        for entry in &self.databases {
            sink.require_path(&entry.backup, "database backup");
        }
    }

    fn run(&self, input: &StateHash, env: &RunEnv<'_>, console: &mut Console)
    -> Result<StateHash> {
        let hash = self.calculate(input)?;

        for entry in &self.databases {
            if env.dry_run {
                console.note(&format!(
                    "would restore {} from {}",
                    entry.database,
                    entry.backup.display()
                ));
                continue;
            }
            console.line(&format!("restoring {}", entry.database));
            env.runner
                .restore_database(env.connection, &entry.database, &entry.backup)?;
        }
        Ok(hash)
    }
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
