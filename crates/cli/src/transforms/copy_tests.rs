#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::*;
use crate::sql::SqlRunner;
use tempfile::tempdir;

/// Runner that fails the test if any SQL is attempted.
struct NoSql;

impl SqlRunner for NoSql {
    fn restore_database(&self, _: &str, _: &str, _: &Path) -> Result<()> {
        panic!("copy task must not touch SQL");
    }

    fn backup_database(&self, _: &str, _: &str, _: &Path, _: bool) -> Result<()> {
        panic!("copy task must not touch SQL");
    }

    fn exec_script(&self, _: &str, _: &str) -> Result<()> {
        panic!("copy task must not touch SQL");
    }
}

fn env(dry_run: bool) -> RunEnv<'static> {
    RunEnv {
        runner: &NoSql,
        connection: "",
        dry_run,
    }
}

fn transform(from: &Path, to: &Path, pattern: &str) -> CopyTransform {
    CopyTransform::new(
        from.to_path_buf(),
        to.to_path_buf(),
        Regex::new(pattern).unwrap(),
    )
}

#[test]
fn run_agrees_with_calculate() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    std::fs::create_dir_all(from.join("sub")).unwrap();
    std::fs::write(from.join("a.txt"), "alpha").unwrap();
    std::fs::write(from.join("sub/b.txt"), "beta").unwrap();

    let t = transform(&from, &dir.path().join("out"), r"\.txt$");
    let input = StateHash::empty();

    let calculated = t.calculate(&input).unwrap();
    let dry = t.run(&input, &env(true), &mut Console::plain()).unwrap();
    let wet = t.run(&input, &env(false), &mut Console::plain()).unwrap();

    assert_eq!(calculated, dry);
    assert_eq!(calculated, wet);
}

#[test]
fn copies_matching_files_preserving_layout() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    let to = dir.path().join("out");
    std::fs::create_dir_all(from.join("reports")).unwrap();
    std::fs::write(from.join("a.rpt"), "a").unwrap();
    std::fs::write(from.join("reports/b.rpt"), "b").unwrap();
    std::fs::write(from.join("skip.log"), "log").unwrap();

    let t = transform(&from, &to, r"\.rpt$");
    t.run(&StateHash::empty(), &env(false), &mut Console::plain())
        .unwrap();

    assert_eq!(std::fs::read_to_string(to.join("a.rpt")).unwrap(), "a");
    assert_eq!(
        std::fs::read_to_string(to.join("reports/b.rpt")).unwrap(),
        "b"
    );
    assert!(!to.join("skip.log").exists());
}

#[test]
fn dry_run_copies_nothing() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    let to = dir.path().join("out");
    std::fs::create_dir_all(&from).unwrap();
    std::fs::write(from.join("a.txt"), "a").unwrap();

    let t = transform(&from, &to, r".*");
    t.run(&StateHash::empty(), &env(true), &mut Console::plain())
        .unwrap();

    assert!(!to.exists());
}

#[test]
fn same_mtime_destination_is_skipped_and_stale_overwritten() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    let to = dir.path().join("out");
    std::fs::create_dir_all(&from).unwrap();
    std::fs::write(from.join("a.txt"), "v1").unwrap();

    let t = transform(&from, &to, r".*");
    t.run(&StateHash::empty(), &env(false), &mut Console::plain())
        .unwrap();

    // After the first copy, source and destination mtimes agree
    let src_mtime = std::fs::metadata(from.join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();
    let dest_mtime = std::fs::metadata(to.join("a.txt"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(src_mtime, dest_mtime);

    // Editing the source changes its mtime; the copy must overwrite
    std::fs::write(from.join("a.txt"), "v2").unwrap();
    t.run(&StateHash::empty(), &env(false), &mut Console::plain())
        .unwrap();
    assert_eq!(std::fs::read_to_string(to.join("a.txt")).unwrap(), "v2");
}

#[test]
fn hash_covers_content_changes() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    std::fs::create_dir_all(&from).unwrap();
    std::fs::write(from.join("a.txt"), "v1").unwrap();

    let t = transform(&from, &dir.path().join("out"), r".*");
    let before = t.calculate(&StateHash::empty()).unwrap();

    std::fs::write(from.join("a.txt"), "v2").unwrap();
    let after = t.calculate(&StateHash::empty()).unwrap();

    assert_ne!(before, after);
}

#[test]
fn hash_ignores_non_matching_files() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("files");
    std::fs::create_dir_all(&from).unwrap();
    std::fs::write(from.join("a.rpt"), "a").unwrap();

    let t = transform(&from, &dir.path().join("out"), r"\.rpt$");
    let before = t.calculate(&StateHash::empty()).unwrap();

    std::fs::write(from.join("noise.log"), "noise").unwrap();
    let after = t.calculate(&StateHash::empty()).unwrap();

    assert_eq!(before, after);
}

#[test]
fn missing_source_fails_requirements() {
    let dir = tempdir().unwrap();
    let t = transform(&dir.path().join("gone"), &dir.path().join("out"), r".*");

    let mut sink = RequirementSink::new();
    t.requirements(&mut sink);
    assert!(sink.finish());
    assert!(sink.unmet()[0].contains("gone"));
}
