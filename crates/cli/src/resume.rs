// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Resume file I/O.
//!
//! After every executed leaf the engine records that leaf's output hash
//! in `<projectRoot>/.dbbm.resume`. A later `--resume` run skips ahead
//! to that state. The file is deleted after a full success and left
//! intact on any failure.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hash::StateHash;

/// Resume file name inside the project root.
pub const RESUME_FILE_NAME: &str = ".dbbm.resume";

pub fn resume_path(project_root: &Path) -> PathBuf {
    project_root.join(RESUME_FILE_NAME)
}

/// Load the recorded hash. `ResumeMissing` when the file is absent,
/// `ResumeInvalid` when its content does not parse.
pub fn load(path: &Path) -> Result<StateHash> {
    if !path.is_file() {
        return Err(Error::ResumeMissing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    StateHash::parse_hex(&content).map_err(|_| Error::ResumeInvalid(content.trim().to_string()))
}

/// Overwrite the resume file with `hash`, one hex line.
pub fn save(path: &Path, hash: &StateHash) -> Result<()> {
    std::fs::write(path, format!("{}\n", hash.to_hex())).map_err(|e| Error::io(path, e))
}

/// Remove the resume file if present.
pub fn clear(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
#[path = "resume_tests.rs"]
mod tests;
