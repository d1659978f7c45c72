// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The `sql` task: aggregate matching scripts into one rendered script,
//! optionally write it out, optionally execute it.

use std::path::{Path, PathBuf};

use regex::Regex;

use super::{RequirementSink, RunEnv, StateTransform, matching_files};
use crate::console::Console;
use crate::error::{Error, Result};
use crate::hash::{HashTransformer, StateHash};
use crate::vars::{self, VarContext};

/// Script templates wrapped around the matched files.
///
/// `item` is re-evaluated per script with `$(file)` bound to the
/// script's relative name; `pre` and `post` are emitted verbatim.
#[derive(Debug, Clone, Default)]
pub struct SqlTemplates {
    pub pre: String,
    pub item: String,
    pub post: String,
}

/// Renders matching scripts through the templates. A script whose name
/// captures an `env` group is only included when that environment is
/// the active one; scripts without the capture are environment-agnostic.
pub struct SqlTransform {
    path: PathBuf,
    regex: Regex,
    environment: String,
    templates: SqlTemplates,
    execute: bool,
    output: Option<PathBuf>,
}

impl SqlTransform {
    pub fn new(
        path: PathBuf,
        regex: Regex,
        environment: String,
        templates: SqlTemplates,
        execute: bool,
        output: Option<PathBuf>,
    ) -> Self {
        Self {
            path,
            regex,
            environment,
            templates,
            execute,
            output,
        }
    }

    /// Matching scripts that pass the environment filter, sorted.
    fn included_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let has_env_group = self
            .regex
            .capture_names()
            .flatten()
            .any(|name| name == "env");

        let mut included = Vec::new();
        for (relative, path) in matching_files(&self.path, &self.regex)? {
            if has_env_group {
                let base_name = relative.rsplit('/').next().unwrap_or(&relative);
                let captured_env = self
                    .regex
                    .captures(base_name)
                    .and_then(|c| c.name("env"))
                    .map(|m| m.as_str().to_string());
                if let Some(env) = captured_env
                    && !env.eq_ignore_ascii_case(&self.environment)
                {
                    continue;
                }
            }
            included.push((relative, path));
        }
        Ok(included)
    }

    fn render(&self, files: &[(String, PathBuf)]) -> Result<String> {
        let mut lines = Vec::new();
        if !self.templates.pre.is_empty() {
            lines.push(self.templates.pre.clone());
        }
        for (relative, _) in files {
            let ctx = VarContext::single("file", relative);
            lines.push(vars::substitute(&self.templates.item, &ctx)?);
        }
        if !self.templates.post.is_empty() {
            lines.push(self.templates.post.clone());
        }
        Ok(lines.join("\n"))
    }

    fn fold(
        &self,
        input: &StateHash,
        files: &[(String, PathBuf)],
        rendered: &str,
    ) -> Result<StateHash> {
        let mut transformer = HashTransformer::new(input);
        for (relative, path) in files {
            transformer.update_file(relative, path)?;
        }
        transformer.update(rendered.as_bytes());
        Ok(transformer.finish())
    }
}

impl StateTransform for SqlTransform {
    fn describe(&self) -> String {
        format!("sql {}", self.path.display())
    }

    fn calculate(&self, input: &StateHash) -> Result<StateHash> {
        let files = self.included_files()?;
        let rendered = self.render(&files)?;
        self.fold(input, &files, &rendered)
    }

    fn requirements(&self, sink: &mut RequirementSink) {
        sink.require_path(&self.path, "sql task script directory");
    }

    fn run(&self, input: &StateHash, env: &RunEnv<'_>, console: &mut Console)
    -> Result<StateHash> {
        let files = self.included_files()?;
        let rendered = self.render(&files)?;
        let hash = self.fold(input, &files, &rendered)?;

        if env.dry_run {
            if let Some(output) = &self.output {
                console.note(&format!("would write script to {}", output.display()));
            }
            if self.execute {
                console.note(&format!("would execute {} script(s)", files.len()));
            }
            return Ok(hash);
        }

        if let Some(output) = &self.output {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            std::fs::write(output, &rendered).map_err(|e| Error::io(output, e))?;
            console.line(&format!("wrote {}", output.display()));
        }
        if self.execute {
            env.runner.exec_script(env.connection, &rendered)?;
            console.line(&format!("executed {} script(s)", files.len()));
        }
        Ok(hash)
    }
}

#[cfg(test)]
#[path = "sql_tests.rs"]
mod tests;
