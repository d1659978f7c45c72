#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;

use super::*;
use crate::config::CacheConfig;
use tempfile::{TempDir, tempdir};

/// Runner whose "backup" writes a marker file of a chosen size.
struct FakeBackup {
    size: usize,
    fail: bool,
}

impl FakeBackup {
    fn small() -> Self {
        Self {
            size: 16,
            fail: false,
        }
    }
}

impl SqlRunner for FakeBackup {
    fn restore_database(&self, _: &str, _: &str, _: &Path) -> Result<()> {
        panic!("cache add must not restore");
    }

    fn backup_database(&self, _: &str, _: &str, out: &Path, _: bool) -> Result<()> {
        // A failed backup still leaves a partial file behind
        std::fs::write(out, vec![0u8; self.size]).map_err(|e| Error::io(out, e))?;
        if self.fail {
            return Err(Error::Sql("backup interrupted".to_string()));
        }
        Ok(())
    }

    fn exec_script(&self, _: &str, _: &str) -> Result<()> {
        panic!("cache add must not execute scripts");
    }
}

fn manager(dir: &TempDir, max_cache_size: i64, auto_gc: bool) -> CacheManager {
    CacheManager::new(
        dir.path().to_path_buf(),
        &CacheConfig {
            root_path: String::new(),
            max_cache_size,
            auto_gc,
            min_deploy_time: 0,
            compress: false,
        },
    )
}

fn hash(n: u8) -> StateHash {
    StateHash::parse_hex(&format!("{n:02x}").repeat(32)).unwrap()
}

/// Seed a cache file plus (optionally) its hit entry dated `ticks`.
fn seed_entry(root: &Path, db: &str, hash: &StateHash, size: usize, ticks: Option<i64>) {
    let dir = root.join("caches").join(db);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(hash.to_hex()), vec![0u8; size]).unwrap();

    if let Some(ticks) = ticks {
        let mut table = read_hit_table(root).unwrap();
        table
            .entry(db.to_string())
            .or_default()
            .insert(hash.to_hex(), ticks);
        std::fs::write(
            root.join(HIT_FILE_NAME),
            serde_json::to_string_pretty(&table).unwrap(),
        )
        .unwrap();
    }
}

#[test]
fn try_get_misses_on_empty_cache() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);
    assert!(cache.try_get("app", &hash(1), false).is_none());
}

#[test]
fn add_then_try_get_round_trips() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    cache.add(&FakeBackup::small(), "db1", "app", &hash(1));

    let path = cache.try_get("app", &hash(1), false).unwrap();
    assert!(path.ends_with(Path::new("caches/app").join(hash(1).to_hex())));
    assert!(path.is_file());

    // The hit table knows the entry
    let table = read_hit_table(dir.path()).unwrap();
    assert!(table["app"].contains_key(&hash(1).to_hex()));
}

#[test]
fn failed_add_removes_partial_file_and_records_nothing() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    cache.add(
        &FakeBackup {
            size: 16,
            fail: true,
        },
        "db1",
        "app",
        &hash(1),
    );

    assert!(cache.try_get("app", &hash(1), false).is_none());
    let table = read_hit_table(dir.path()).unwrap();
    assert!(table.get("app").is_none());
}

#[test]
fn add_is_a_no_op_when_entry_exists() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);
    seed_entry(dir.path(), "app", &hash(1), 4, Some(100));

    // A runner that would fail; add must not even call it
    cache.add(
        &FakeBackup {
            size: 1,
            fail: true,
        },
        "db1",
        "app",
        &hash(1),
    );

    let path = cache.try_get("app", &hash(1), false).unwrap();
    assert_eq!(std::fs::metadata(path).unwrap().len(), 4);
}

#[test]
fn try_get_with_update_hit_touches_the_table() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);
    seed_entry(dir.path(), "app", &hash(1), 4, Some(100));

    cache.try_get("app", &hash(1), true).unwrap();

    let table = read_hit_table(dir.path()).unwrap();
    assert!(table["app"][&hash(1).to_hex()] > 100);
}

#[test]
fn update_hits_covers_every_key() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    cache
        .update_hits(&[
            ("app".to_string(), hash(1)),
            ("audit".to_string(), hash(1)),
        ])
        .unwrap();

    let table = read_hit_table(dir.path()).unwrap();
    assert!(table["app"].contains_key(&hash(1).to_hex()));
    assert!(table["audit"].contains_key(&hash(1).to_hex()));
}

#[test]
fn gc_deletes_orphans_and_forgets_missing_files() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    // Orphan: file with no hit entry
    seed_entry(dir.path(), "db1", &hash(0xde), 8, None);
    // Forgotten: hit entry with no file
    cache
        .update_hits(&[("db1".to_string(), hash(0xca))])
        .unwrap();

    let stats = cache.garbage_collect(true).unwrap();
    assert_eq!(stats.orphan_files, 1);
    assert_eq!(stats.forgotten_entries, 1);
    assert_eq!(stats.live_entries, 0);

    assert!(cache.try_get("db1", &hash(0xde), false).is_none());
    let table = read_hit_table(dir.path()).unwrap();
    assert!(table.is_empty());
}

#[test]
fn gc_deletes_files_with_invalid_names() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    let db_dir = dir.path().join("caches/db1");
    std::fs::create_dir_all(&db_dir).unwrap();
    std::fs::write(db_dir.join("not-a-hash.tmp"), "partial").unwrap();

    let stats = cache.garbage_collect(true).unwrap();
    assert_eq!(stats.invalid_files, 1);
    assert!(!db_dir.join("not-a-hash.tmp").exists());
}

#[test]
fn gc_evicts_coldest_entries_until_under_the_bound() {
    const MIB: usize = 1024 * 1024;
    let dir = tempdir().unwrap();
    let cache = manager(&dir, (5 * MIB) as i64, false);

    // Ten 1 MiB entries across two databases, hit at ticks 1..=10
    for i in 0..10u8 {
        let db = if i % 2 == 0 { "db1" } else { "db2" };
        seed_entry(dir.path(), db, &hash(i + 1), MIB, Some(i64::from(i) + 1));
    }

    let stats = cache.garbage_collect(true).unwrap();
    assert_eq!(stats.evicted, 5);
    assert_eq!(stats.live_entries, 5);
    assert!(stats.live_bytes <= (5 * MIB) as u64);

    // The five oldest (ticks 1..=5) are gone, the newest survive
    let table = read_hit_table(dir.path()).unwrap();
    let surviving: Vec<i64> = table.values().flat_map(|h| h.values().copied()).collect();
    assert_eq!(surviving.len(), 5);
    assert!(surviving.iter().all(|t| *t >= 6));
}

#[test]
fn negative_bound_means_unbounded() {
    const MIB: usize = 1024 * 1024;
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    for i in 0..4u8 {
        seed_entry(dir.path(), "db1", &hash(i + 1), MIB, Some(i64::from(i)));
    }

    let stats = cache.garbage_collect(true).unwrap();
    assert_eq!(stats.evicted, 0);
    assert_eq!(stats.live_entries, 4);
}

#[test]
fn auto_gc_runs_before_add() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, true);

    // An orphan that only a pre-add GC would remove
    seed_entry(dir.path(), "db1", &hash(0xde), 8, None);

    cache.add(&FakeBackup::small(), "db1", "app", &hash(1));

    assert!(cache.try_get("db1", &hash(0xde), false).is_none());
    assert!(cache.try_get("app", &hash(1), false).is_some());
}

#[test]
fn cached_backups_requires_every_database() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);
    let dbs = vec!["app".to_string(), "audit".to_string()];

    seed_entry(dir.path(), "app", &hash(1), 4, Some(1));
    assert!(cache.cached_backups(&dbs, &hash(1)).is_none());

    seed_entry(dir.path(), "audit", &hash(1), 4, Some(1));
    let backups = cache.cached_backups(&dbs, &hash(1)).unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[0].database, "app");
    assert_eq!(backups[1].database, "audit");
}

#[test]
fn concurrent_hit_updates_do_not_lose_writes() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);

    // Each thread read-modify-writes the table under the file lock; a
    // lost update would drop one of the eight distinct entries.
    std::thread::scope(|scope| {
        for i in 0..8u8 {
            let cache = &cache;
            scope.spawn(move || {
                cache
                    .update_hits(&[(format!("db{i}"), hash(i + 1))])
                    .unwrap();
            });
        }
    });

    let table = read_hit_table(dir.path()).unwrap();
    let total: usize = table.values().map(|hits| hits.len()).sum();
    assert_eq!(total, 8);
}

#[test]
fn corrupt_hit_table_is_surfaced_not_wiped() {
    let dir = tempdir().unwrap();
    let cache = manager(&dir, -1, false);
    std::fs::write(dir.path().join(HIT_FILE_NAME), "{ not json").unwrap();

    let err = cache.garbage_collect(true).unwrap_err();
    assert!(err.to_string().contains("hit table corrupt"));
}
