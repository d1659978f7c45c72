// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The `copy` task: mirror matching files into a destination tree.

use std::path::{Path, PathBuf};

use regex::Regex;

use super::{RequirementSink, RunEnv, StateTransform, matching_files};
use crate::console::Console;
use crate::error::{Error, Result};
use crate::hash::{HashTransformer, StateHash};

/// Copies files under `from` whose base name matches `regex` into `to`,
/// preserving relative paths. Destinations with the source's mtime are
/// skipped; everything else is overwritten (read-only flags cleared).
pub struct CopyTransform {
    from: PathBuf,
    to: PathBuf,
    regex: Regex,
}

impl CopyTransform {
    pub fn new(from: PathBuf, to: PathBuf, regex: Regex) -> Self {
        Self { from, to, regex }
    }

    fn fold(&self, input: &StateHash, files: &[(String, PathBuf)]) -> Result<StateHash> {
        let mut transformer = HashTransformer::new(input);
        for (relative, path) in files {
            transformer.update_file(relative, path)?;
        }
        Ok(transformer.finish())
    }

    fn copy_one(&self, relative: &str, source: &Path) -> Result<()> {
        let dest = self.to.join(relative);

        if let Ok(dest_meta) = std::fs::metadata(&dest) {
            // Same mtime as the source means the copy is already there
            let source_meta = std::fs::metadata(source).map_err(|e| Error::io(source, e))?;
            if let (Ok(src_time), Ok(dest_time)) = (source_meta.modified(), dest_meta.modified())
                && src_time == dest_time
            {
                return Ok(());
            }

            let mut permissions = dest_meta.permissions();
            if permissions.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                std::fs::set_permissions(&dest, permissions).map_err(|e| Error::io(&dest, e))?;
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::copy(source, &dest).map_err(|e| Error::io(&dest, e))?;

        // Carry the source mtime over so the next run can skip this file
        let modified = std::fs::metadata(source)
            .and_then(|m| m.modified())
            .map_err(|e| Error::io(source, e))?;
        let dest_file = std::fs::OpenOptions::new()
            .write(true)
            .open(&dest)
            .map_err(|e| Error::io(&dest, e))?;
        dest_file
            .set_modified(modified)
            .map_err(|e| Error::io(&dest, e))?;
        Ok(())
    }
}

impl StateTransform for CopyTransform {
    fn describe(&self) -> String {
        format!("copy {} -> {}", self.from.display(), self.to.display())
    }

    fn calculate(&self, input: &StateHash) -> Result<StateHash> {
        let files = matching_files(&self.from, &self.regex)?;
        self.fold(input, &files)
    }

    fn requirements(&self, sink: &mut RequirementSink) {
        sink.require_path(&self.from, "copy task source");
    }

    fn run(&self, input: &StateHash, env: &RunEnv<'_>, console: &mut Console)
    -> Result<StateHash> {
        let files = matching_files(&self.from, &self.regex)?;
        let hash = self.fold(input, &files)?;

        if env.dry_run {
            console.note(&format!(
                "would copy {} file(s) to {}",
                files.len(),
                self.to.display()
            ));
            return Ok(hash);
        }

        std::fs::create_dir_all(&self.to).map_err(|e| Error::io(&self.to, e))?;
        for (relative, source) in &files {
            self.copy_one(relative, source)?;
        }
        console.line(&format!("copied {} file(s)", files.len()));
        Ok(hash)
    }
}

#[cfg(test)]
#[path = "copy_tests.rs"]
mod tests;
