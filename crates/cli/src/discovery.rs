//! Project file discovery.
//!
//! Walks from the working directory up to the filesystem root looking
//! for `dbbm.json`.

use std::path::{Path, PathBuf};

use crate::config::PROJECT_FILE_NAME;
use crate::error::{Error, Result};

/// Find `dbbm.json` starting from `start_dir` and walking up.
pub fn find_project(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let candidate = current.join(PROJECT_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(Error::NoProject {
                    start: start_dir.to_path_buf(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
