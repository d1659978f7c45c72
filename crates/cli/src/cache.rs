// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed backup cache.
//!
//! Layout under the configured root:
//!
//! ```text
//! caches/<dbName>/<hex-hash>   one backup file per (database, state)
//! hit.json                     { dbName: { hexHash: lastHitTicks } }
//! ```
//!
//! The hit table is the single source of truth for GC: a file without an
//! entry is an orphan and is deleted, an entry without a file is
//! forgotten and is dropped. Every hit-table mutation is a
//! read-modify-write under an exclusive OS file lock, and the table is
//! rewritten whole — no in-place edits.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::hash::StateHash;
use crate::sql::SqlRunner;
use crate::transforms::DatabaseBackup;

/// Hit-table file name under the cache root.
pub const HIT_FILE_NAME: &str = "hit.json";

/// `db -> hex -> last-hit ticks`. BTreeMaps keep the rewrite stable.
type HitTable = BTreeMap<String, BTreeMap<String, i64>>;

/// What one garbage collection did.
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    /// Files whose name did not parse as a state hash.
    pub invalid_files: usize,
    /// Files with no hit-table entry.
    pub orphan_files: usize,
    /// Hit-table entries with no file.
    pub forgotten_entries: usize,
    /// Live entries evicted to honor the size bound.
    pub evicted: usize,
    /// Entries surviving the collection.
    pub live_entries: usize,
    /// Bytes surviving the collection.
    pub live_bytes: u64,
}

/// Content-addressed backup store. Owns no in-memory state across
/// calls; everything lives on disk so crashed runs leave nothing stale.
pub struct CacheManager {
    root: PathBuf,
    max_cache_size: i64,
    auto_gc: bool,
    compress: bool,
}

impl CacheManager {
    pub fn new(root: PathBuf, config: &CacheConfig) -> Self {
        Self {
            root,
            max_cache_size: config.max_cache_size,
            auto_gc: config.auto_gc,
            compress: config.compress,
        }
    }

    fn caches_dir(&self) -> PathBuf {
        self.root.join("caches")
    }

    fn entry_path(&self, db: &str, hash: &StateHash) -> PathBuf {
        self.caches_dir().join(db).join(hash.to_hex())
    }

    /// Path of the cached backup for `(db, hash)`, if present.
    /// `update_hit` also touches the hit table (best effort).
    pub fn try_get(&self, db: &str, hash: &StateHash, update_hit: bool) -> Option<PathBuf> {
        let path = self.entry_path(db, hash);
        if !path.is_file() {
            return None;
        }
        if update_hit
            && let Err(e) = self.update_hits(&[(db.to_string(), *hash)])
        {
            tracing::warn!("failed to update hit table: {e}");
        }
        Some(path)
    }

    /// The full backup set for `hash`, when every database has one.
    pub fn cached_backups(&self, databases: &[String], hash: &StateHash)
    -> Option<Vec<DatabaseBackup>> {
        let mut backups = Vec::with_capacity(databases.len());
        for db in databases {
            backups.push(DatabaseBackup {
                database: db.clone(),
                backup: self.try_get(db, hash, false)?,
            });
        }
        Some(backups)
    }

    /// Stream a backup of `db` into the cache under `hash`.
    ///
    /// Failures are warnings, never deploy failures: a partial file is
    /// removed and the hit table is left alone, so the next GC and the
    /// next `try_get` both see a consistent store.
    pub fn add(&self, runner: &dyn SqlRunner, conn: &str, db: &str, hash: &StateHash) {
        let path = self.entry_path(db, hash);
        if path.is_file() {
            return;
        }

        if self.auto_gc
            && let Err(e) = self.garbage_collect(true)
        {
            tracing::warn!("pre-add garbage collection failed: {e}");
        }

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!("cannot create cache directory {}: {e}", parent.display());
            return;
        }

        tracing::debug!("caching {db} at {hash}");
        if let Err(e) = runner.backup_database(conn, db, &path, self.compress) {
            tracing::warn!("cache backup of {db} failed: {e}");
            let _ = std::fs::remove_file(&path);
            return;
        }

        if let Err(e) = self.update_hits(&[(db.to_string(), *hash)]) {
            tracing::warn!("failed to record cache hit for {db}: {e}");
        }
    }

    /// Touch `(db, hash)` entries so GC treats them as hot.
    pub fn update_hits(&self, keys: &[(String, StateHash)]) -> Result<()> {
        let now = now_ticks();
        self.with_hit_table(|table| {
            for (db, hash) in keys {
                table
                    .entry(db.clone())
                    .or_default()
                    .insert(hash.to_hex(), now);
            }
            Ok(())
        })
    }

    /// Reconcile files against the hit table and enforce the size bound.
    pub fn garbage_collect(&self, silent: bool) -> Result<GcStats> {
        self.with_hit_table(|table| {
            let mut stats = GcStats::default();
            let files = self.scan_files(&mut stats, silent)?;

            // Orphans: files the table does not know about
            let mut live: Vec<CacheFile> = Vec::new();
            for file in files {
                let known = table
                    .get(&file.db)
                    .is_some_and(|hits| hits.contains_key(&file.hex));
                if known {
                    live.push(file);
                } else {
                    if !silent {
                        tracing::info!("deleting orphan cache file {}", file.path.display());
                    }
                    std::fs::remove_file(&file.path).map_err(|e| Error::io(&file.path, e))?;
                    stats.orphan_files += 1;
                }
            }

            // Forgotten: entries whose file is gone
            for (db, hits) in table.iter_mut() {
                hits.retain(|hex, _| {
                    let present = live.iter().any(|f| &f.db == db && &f.hex == hex);
                    if !present {
                        stats.forgotten_entries += 1;
                        if !silent {
                            tracing::info!("forgetting missing cache entry {db}/{hex}");
                        }
                    }
                    present
                });
            }
            table.retain(|_, hits| !hits.is_empty());

            // Size bound: evict coldest-first until under the limit
            let mut total: u64 = live.iter().map(|f| f.size).sum();
            if self.max_cache_size >= 0 {
                let limit = self.max_cache_size as u64;
                live.sort_by_key(|f| {
                    table
                        .get(&f.db)
                        .and_then(|hits| hits.get(&f.hex))
                        .copied()
                        .unwrap_or(i64::MIN)
                });
                let mut evict_iter = live.iter();
                while total > limit {
                    let Some(file) = evict_iter.next() else {
                        break;
                    };
                    if !silent {
                        tracing::info!("evicting cache entry {}/{}", file.db, file.hex);
                    }
                    std::fs::remove_file(&file.path).map_err(|e| Error::io(&file.path, e))?;
                    if let Some(hits) = table.get_mut(&file.db) {
                        hits.remove(&file.hex);
                    }
                    total -= file.size;
                    stats.evicted += 1;
                }
                table.retain(|_, hits| !hits.is_empty());
            }

            stats.live_entries = table.values().map(BTreeMap::len).sum();
            stats.live_bytes = total;
            Ok(stats)
        })
    }

    /// Enumerate cache files, deleting any whose name is not a valid
    /// hex hash.
    fn scan_files(&self, stats: &mut GcStats, silent: bool) -> Result<Vec<CacheFile>> {
        let caches = self.caches_dir();
        if !caches.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for db_entry in std::fs::read_dir(&caches).map_err(|e| Error::io(&caches, e))? {
            let db_entry = db_entry.map_err(|e| Error::io(&caches, e))?;
            if !db_entry.path().is_dir() {
                continue;
            }
            let db = db_entry.file_name().to_string_lossy().to_string();

            let db_dir = db_entry.path();
            for file_entry in std::fs::read_dir(&db_dir).map_err(|e| Error::io(&db_dir, e))? {
                let file_entry = file_entry.map_err(|e| Error::io(&db_dir, e))?;
                let path = file_entry.path();
                if !path.is_file() {
                    continue;
                }

                let name = file_entry.file_name().to_string_lossy().to_string();
                if StateHash::parse_hex(&name).is_err() {
                    if !silent {
                        tracing::info!("deleting invalid cache file {}", path.display());
                    }
                    std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                    stats.invalid_files += 1;
                    continue;
                }

                let meta = file_entry.metadata().map_err(|e| Error::io(&path, e))?;
                files.push(CacheFile {
                    db: db.clone(),
                    hex: name,
                    size: meta.len(),
                    path,
                });
            }
        }
        Ok(files)
    }

    /// Read-modify-write the hit table under an exclusive lock, then
    /// rewrite it whole.
    fn with_hit_table<T>(&self, mutate: impl FnOnce(&mut HitTable) -> Result<T>) -> Result<T> {
        std::fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let path = self.root.join(HIT_FILE_NAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.lock_exclusive().map_err(|e| Error::io(&path, e))?;

        let outcome = (|| {
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|e| Error::io(&path, e))?;

            let mut table: HitTable = if content.trim().is_empty() {
                HitTable::new()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| Error::config_in(format!("hit table corrupt: {e}"), &path))?
            };

            let result = mutate(&mut table)?;

            let serialized = serde_json::to_string_pretty(&table)
                .map_err(|e| Error::config_in(e.to_string(), &path))?;
            file.set_len(0).map_err(|e| Error::io(&path, e))?;
            file.rewind().map_err(|e| Error::io(&path, e))?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| Error::io(&path, e))?;
            file.write_all(b"\n").map_err(|e| Error::io(&path, e))?;
            Ok(result)
        })();

        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!("failed to unlock {}: {e}", path.display());
        }
        outcome
    }
}

struct CacheFile {
    db: String,
    hex: String,
    size: u64,
    path: PathBuf,
}

/// 100 ns intervals since the Unix epoch. Only the ordering matters.
fn now_ticks() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp() * 10_000_000 + i64::from(now.timestamp_subsec_nanos() / 100)
}

/// Read the hit table without mutating it (used by tests and `cache gc`
/// reporting). Takes the same exclusive lock.
pub fn read_hit_table(root: &Path) -> Result<BTreeMap<String, BTreeMap<String, i64>>> {
    let path = root.join(HIT_FILE_NAME);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let file = OpenOptions::new()
        .read(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;
    file.lock_exclusive().map_err(|e| Error::io(&path, e))?;

    let mut content = String::new();
    let outcome = (&file)
        .read_to_string(&mut content)
        .map_err(|e| Error::io(&path, e))
        .and_then(|_| {
            if content.trim().is_empty() {
                Ok(BTreeMap::new())
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| Error::config_in(format!("hit table corrupt: {e}"), &path))
            }
        });

    if let Err(e) = FileExt::unlock(&file) {
        tracing::warn!("failed to unlock {}: {e}", path.display());
    }
    outcome
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
