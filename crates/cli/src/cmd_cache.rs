// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The cache command: manual maintenance for `autoGC = false` setups.

use crate::cache::CacheManager;
use crate::cli::{CacheAction, CacheArgs};
use crate::config::Project;
use crate::discovery;
use crate::error::{Error, Result};

pub fn run_cache(args: &CacheArgs) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| Error::io(std::path::Path::new("."), e))?;
    let project_file = discovery::find_project(&cwd)?;
    let project = Project::load(&project_file)?;

    match args.action {
        CacheAction::Gc => {
            let cache = CacheManager::new(
                project.root.join(&project.user.cache.root_path),
                &project.user.cache,
            );
            let stats = cache.garbage_collect(false)?;
            println!(
                "cache gc: {} orphan(s), {} invalid file(s), {} forgotten entr(ies), \
                 {} evicted; {} live entr(ies), {} byte(s)",
                stats.orphan_files,
                stats.invalid_files,
                stats.forgotten_entries,
                stats.evicted,
                stats.live_entries,
                stats.live_bytes,
            );
            Ok(())
        }
    }
}
