#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::RefCell;
use std::path::Path;

use super::*;
use crate::sql::SqlRunner;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingRunner {
    restored: RefCell<Vec<String>>,
}

impl SqlRunner for RecordingRunner {
    fn restore_database(&self, _: &str, db: &str, backup: &Path) -> Result<()> {
        self.restored
            .borrow_mut()
            .push(format!("{db}<{}", backup.display()));
        Ok(())
    }

    fn backup_database(&self, _: &str, _: &str, _: &Path, _: bool) -> Result<()> {
        panic!("restore must not back up");
    }

    fn exec_script(&self, _: &str, _: &str) -> Result<()> {
        panic!("restore must not execute scripts");
    }
}

fn backups(dir: &Path) -> Vec<DatabaseBackup> {
    let app = dir.join("r0-app.bak");
    let audit = dir.join("r0-audit.bak");
    std::fs::write(&app, "app backup").unwrap();
    std::fs::write(&audit, "audit backup").unwrap();
    vec![
        DatabaseBackup {
            database: "app".to_string(),
            backup: app,
        },
        DatabaseBackup {
            database: "audit".to_string(),
            backup: audit,
        },
    ]
}

#[test]
fn baseline_hash_depends_on_database_order() {
    let dir = tempdir().unwrap();
    let mut entries = backups(dir.path());

    let forward = RestoreDatabasesTransform::baseline(entries.clone())
        .calculate(&StateHash::empty())
        .unwrap();
    entries.reverse();
    let reversed = RestoreDatabasesTransform::baseline(entries)
        .calculate(&StateHash::empty())
        .unwrap();

    assert_ne!(forward, reversed);
}

#[test]
fn baseline_hash_tracks_backup_content_size() {
    let dir = tempdir().unwrap();
    let entries = backups(dir.path());
    let t = RestoreDatabasesTransform::baseline(entries.clone());
    let before = t.calculate(&StateHash::empty()).unwrap();

    std::fs::write(&entries[0].backup, "app backup grew larger").unwrap();
    let after = t.calculate(&StateHash::empty()).unwrap();
    assert_ne!(before, after);
}

#[test]
fn cache_restore_returns_the_fixed_hash() {
    let dir = tempdir().unwrap();
    let entries = backups(dir.path());
    let fixed = StateHash::parse_hex(&"ab".repeat(32)).unwrap();

    let t = RestoreDatabasesTransform::from_cache(entries, fixed);
    assert_eq!(t.calculate(&StateHash::empty()).unwrap(), fixed);

    // The threaded input does not disturb the fixed result
    let other_input = StateHash::parse_hex(&"cd".repeat(32)).unwrap();
    assert_eq!(t.calculate(&other_input).unwrap(), fixed);
}

#[test]
fn run_restores_in_declared_order() {
    let dir = tempdir().unwrap();
    let entries = backups(dir.path());
    let runner = RecordingRunner::default();

    let t = RestoreDatabasesTransform::baseline(entries);
    let hash = t
        .run(
            &StateHash::empty(),
            &RunEnv {
                runner: &runner,
                connection: "db1",
                dry_run: false,
            },
            &mut Console::plain(),
        )
        .unwrap();

    assert_eq!(hash, t.calculate(&StateHash::empty()).unwrap());
    let restored = runner.restored.borrow();
    assert_eq!(restored.len(), 2);
    assert!(restored[0].starts_with("app<"));
    assert!(restored[1].starts_with("audit<"));
}

#[test]
fn dry_run_restores_nothing() {
    let dir = tempdir().unwrap();
    let entries = backups(dir.path());
    let runner = RecordingRunner::default();

    RestoreDatabasesTransform::baseline(entries)
        .run(
            &StateHash::empty(),
            &RunEnv {
                runner: &runner,
                connection: "",
                dry_run: true,
            },
            &mut Console::plain(),
        )
        .unwrap();

    assert!(runner.restored.borrow().is_empty());
}

#[test]
fn missing_backup_fails_requirements() {
    let dir = tempdir().unwrap();
    let t = RestoreDatabasesTransform::baseline(vec![DatabaseBackup {
        database: "app".to_string(),
        backup: dir.path().join("gone.bak"),
    }]);

    let mut sink = RequirementSink::new();
    t.requirements(&mut sink);
    assert!(sink.finish());
}
