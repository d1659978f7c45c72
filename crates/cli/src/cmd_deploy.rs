// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The deploy command: plan, fingerprint, short-circuit, execute.

use std::time::Duration;

use termcolor::ColorChoice;

use crate::beep::Beeper;
use crate::cache::CacheManager;
use crate::cli::DeployArgs;
use crate::config::Project;
use crate::console::Console;
use crate::discovery;
use crate::error::{Error, Result};
use crate::hash::StateHash;
use crate::plan;
use crate::resume;
use crate::sql::SqlCmdRunner;
use crate::task::TaskBuilder;
use crate::transforms::{RequirementSink, RestoreDatabasesTransform, RunEnv};
use crate::tree::{CalcContext, ExecutionNode, RunContext};

/// Entry point for `dbbm deploy`.
pub fn run_deploy(args: &DeployArgs) -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| Error::io(std::path::Path::new("."), e))?;
    let project_file = discovery::find_project(&cwd)?;
    tracing::debug!("project file: {}", project_file.display());
    let project = Project::load(&project_file)?;

    let beeper = Beeper::new(project.user.beeps.clone(), !args.no_beeps);
    beeper.start();

    match deploy(&project, args) {
        Ok(()) => {
            beeper.success();
            Ok(())
        }
        Err(inner) => {
            beeper.error();
            Err(Error::Blocking(Box::new(inner)))
        }
    }
}

fn deploy(project: &Project, args: &DeployArgs) -> Result<()> {
    let environment = args.env.as_deref().unwrap_or(&project.user.environment);
    let active = project.active_release(args.release.as_deref())?.clone();
    tracing::debug!("deploying release '{}' for env '{environment}'", active.name);

    let plan = plan::build_plan(project, &active, environment)?;
    tracing::debug!(
        "baseline covers {} database(s), {} release(s) to replay",
        plan.databases.len(),
        plan.releases.len()
    );

    // Root: restore the baseline, then one group per stacked release
    let builder = TaskBuilder::new(project, environment);
    let mut children = vec![ExecutionNode::group(
        Some("Restore databases".to_string()),
        None,
        vec![ExecutionNode::transform(
            RestoreDatabasesTransform::baseline(plan.databases.clone()),
        )],
    )];
    for release in &plan.releases {
        children.push(builder.release_group(release)?);
    }
    let root = ExecutionNode::group(None, None, children);

    let resume_file = resume::resume_path(&project.root);
    let starting = if args.resume {
        let hash = resume::load(&resume_file)?;
        tracing::debug!("resuming from {hash}");
        Some(hash)
    } else {
        None
    };

    let cache = if args.no_cache {
        None
    } else {
        Some(CacheManager::new(
            project.root.join(&project.user.cache.root_path),
            &project.user.cache,
        ))
    };

    let calc_ctx = CalcContext {
        databases: &project.config.databases,
    };
    let outcome = root.calculate(
        &calc_ctx,
        &StateHash::empty(),
        starting.as_ref(),
        cache.as_ref(),
    )?;

    // Keep the entries we would have restored from hot for GC
    if outcome.changed
        && let Some(cache_hash) = outcome.cache_hash
        && let Some(cache) = &cache
    {
        let keys: Vec<(String, StateHash)> = project
            .config
            .databases
            .iter()
            .map(|db| (db.clone(), cache_hash))
            .collect();
        if let Err(e) = cache.update_hits(&keys) {
            tracing::warn!("failed to update hit table: {e}");
        }
    }

    let mut console = Console::new(ColorChoice::Auto);

    let Some(node) = outcome.node else {
        console.line("Nothing to do: the target state is already deployed.");
        if !args.dry_run {
            resume::clear(&resume_file)?;
        }
        return Ok(());
    };

    // Every precondition is checked before the first side effect
    let mut sink = RequirementSink::new();
    node.requirements(&mut sink);
    if sink.finish() {
        for unmet in sink.unmet() {
            eprintln!("dbbm: {unmet}");
        }
        return Err(Error::UnmetRequirements);
    }

    let runner = SqlCmdRunner;
    let run_ctx = RunContext {
        env: RunEnv {
            runner: &runner,
            connection: &project.user.connection,
            dry_run: args.dry_run,
        },
        databases: &project.config.databases,
        resume_path: &resume_file,
        min_deploy_time: Duration::from_secs(project.user.cache.min_deploy_time),
    };

    let inbound = starting.unwrap_or_else(StateHash::empty);
    let final_hash = node.run(&run_ctx, &mut console, cache.as_ref(), &inbound, true, true)?;
    tracing::debug!("final state {final_hash}");

    if !args.dry_run {
        resume::clear(&resume_file)?;
    }
    console.line("Deployment complete.");
    Ok(())
}
