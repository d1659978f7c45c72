//! Test helpers for behavioral specifications.
//!
//! These specs are black-box: they invoke the dbbm binary and verify
//! stdout, stderr, and exit codes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub use assert_cmd::prelude::*;
pub use predicates;
pub use predicates::prelude::PredicateBooleanExt;
use std::process::Command;

/// Returns a Command configured to run the dbbm binary
pub fn dbbm_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dbbm"))
}

/// Get path to a test fixture directory
pub fn fixture(name: &str) -> std::path::PathBuf {
    let manifest_dir =
        std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR should be set");
    std::path::PathBuf::from(manifest_dir)
        .parent()
        .expect("parent should exist")
        .parent()
        .expect("grandparent should exist")
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Creates a temp directory holding a minimal deployable project:
/// one database, releases r0 <- r1, environment-agnostic r0 backup.
pub fn temp_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("dbbm.json"),
        r#"{ "databases": ["app"], "activeRelease": "r1" }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("releases.json"),
        r#"[
            { "name": "r0" },
            { "name": "r1", "baseline": "r0", "features": [] }
        ]"#,
    )
    .unwrap();
    std::fs::create_dir(dir.path().join("backups")).unwrap();
    std::fs::write(dir.path().join("backups/r0-app.bak"), "backup").unwrap();
    dir
}
