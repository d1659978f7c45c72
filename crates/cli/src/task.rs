// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Task registry: turns recipe entries into execution-tree nodes.
//!
//! `copy` and `sql` are the built-in kinds. Any other kind names a
//! task definition, which expands (recursively) into further recipe
//! entries under the `deploy` command, with its `define` map providing
//! default context variables and its `requires` list contributing
//! precondition paths.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::Regex;

use crate::config::{Feature, Project, RecipeEntry, ReleaseConfig};
use crate::error::{Error, Result};
use crate::transforms::{CopyTransform, SqlTransform, sql::SqlTemplates};
use crate::tree::{ExecutionNode, GroupNode};
use crate::vars::{self, VarContext};

/// Builds execution nodes for features of the active project.
pub struct TaskBuilder<'a> {
    project: &'a Project,
    environment: &'a str,
}

impl<'a> TaskBuilder<'a> {
    pub fn new(project: &'a Project, environment: &'a str) -> Self {
        Self {
            project,
            environment,
        }
    }

    /// One group per release, one subgroup per feature, one node per task.
    pub fn release_group(&self, release: &ReleaseConfig) -> Result<ExecutionNode> {
        let mut children = Vec::with_capacity(release.features.len());
        for name in &release.features {
            let feature = self
                .project
                .features
                .get(name)
                .ok_or_else(|| Error::UnknownFeature(name.clone()))?;
            children.push(ExecutionNode::group(
                Some(format!("Feature {name}")),
                None,
                self.feature_nodes(feature)?,
            ));
        }
        Ok(ExecutionNode::group(
            Some(format!("Release {}", release.name)),
            None,
            children,
        ))
    }

    /// Expand a feature's recipe into nodes.
    pub fn feature_nodes(&self, feature: &Feature) -> Result<Vec<ExecutionNode>> {
        let mut stack = Vec::new();
        self.expand(feature, &feature.recipe, &BTreeMap::new(), &mut stack)
    }

    fn expand(
        &self,
        feature: &Feature,
        entries: &[RecipeEntry],
        variables: &BTreeMap<String, String>,
        stack: &mut Vec<String>,
    ) -> Result<Vec<ExecutionNode>> {
        let mut nodes = Vec::new();
        for entry in entries {
            let (kind, params) = entry.kind_and_params()?;
            match kind {
                "copy" => nodes.push(self.build_copy(feature, params, variables)?),
                "sql" => nodes.push(self.build_sql(feature, params, variables)?),
                name => nodes.push(self.expand_defined(feature, name, params, variables, stack)?),
            }
        }
        Ok(nodes)
    }

    fn expand_defined(
        &self,
        feature: &Feature,
        name: &str,
        params: &serde_json::Map<String, serde_json::Value>,
        variables: &BTreeMap<String, String>,
        stack: &mut Vec<String>,
    ) -> Result<ExecutionNode> {
        let definition = self
            .project
            .tasks
            .get(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;

        if stack.iter().any(|seen| seen.as_str() == name) {
            return Err(Error::config(format!(
                "task '{name}' expands into itself (via {})",
                stack.join(" -> "),
            )));
        }
        stack.push(name.to_string());

        // Definition defaults, overridden by the recipe entry's parameters
        let ctx = VarContext::new(variables.clone(), feature.attributes.clone());
        let mut merged = definition.define.clone();
        for (key, value) in params {
            merged.insert(key.clone(), vars::substitute_param(value, &ctx)?);
        }

        let command = definition
            .commands
            .get("deploy")
            .cloned()
            .unwrap_or_default();
        let children = self.expand(feature, &command, &merged, stack)?;

        let requires_ctx = VarContext::new(merged, feature.attributes.clone());
        let mut required_paths = Vec::with_capacity(definition.requires.len());
        for requirement in &definition.requires {
            let path = vars::substitute(requirement, &requires_ctx)?;
            required_paths.push(feature.base_dir.join(path));
        }

        stack.pop();
        Ok(ExecutionNode::Group(GroupNode {
            pre: None,
            post: None,
            required_paths,
            children,
        }))
    }

    fn build_copy(
        &self,
        feature: &Feature,
        params: &serde_json::Map<String, serde_json::Value>,
        variables: &BTreeMap<String, String>,
    ) -> Result<ExecutionNode> {
        let ctx = VarContext::new(variables.clone(), feature.attributes.clone());

        let from = feature
            .base_dir
            .join(required_param(params, "copy", "from", &ctx)?);
        let to = feature
            .base_dir
            .join(required_param(params, "copy", "to", &ctx)?);
        let regex = compile_regex(params, "copy", ".*", &ctx)?;

        Ok(ExecutionNode::transform(CopyTransform::new(
            from, to, regex,
        )))
    }

    fn build_sql(
        &self,
        feature: &Feature,
        params: &serde_json::Map<String, serde_json::Value>,
        variables: &BTreeMap<String, String>,
    ) -> Result<ExecutionNode> {
        let ctx = VarContext::new(variables.clone(), feature.attributes.clone());

        let path = feature
            .base_dir
            .join(required_param(params, "sql", "path", &ctx)?);
        let regex = compile_regex(params, "sql", r"\.sql$", &ctx)?;

        let execute = match params.get("execute") {
            None => true,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(value) => {
                let text = vars::substitute_param(value, &ctx)?;
                text.parse::<bool>().map_err(|_| {
                    Error::config(format!("sql 'execute' must be a boolean, found '{text}'"))
                })?
            }
        };

        let output = params
            .get("output")
            .map(|value| vars::substitute_param(value, &ctx))
            .transpose()?
            .map(|path| feature.base_dir.join(path));

        let templates = match params.get("templates") {
            None => default_templates(),
            Some(value) => {
                let object = value.as_object().ok_or_else(|| {
                    Error::config("sql 'templates' must be an object")
                })?;
                let mut templates = default_templates();
                if let Some(pre) = object.get("pre") {
                    templates.pre = vars::substitute_param(pre, &ctx)?;
                }
                if let Some(item) = object.get("item") {
                    templates.item = vars::substitute_param(item, &ctx)?;
                }
                if let Some(post) = object.get("post") {
                    templates.post = vars::substitute_param(post, &ctx)?;
                }
                templates
            }
        };

        Ok(ExecutionNode::transform(SqlTransform::new(
            path,
            regex,
            self.environment.to_string(),
            templates,
            execute,
            output,
        )))
    }
}

/// Templates used when the task config does not provide any: include
/// each script by relative name, sqlcmd-style.
fn default_templates() -> SqlTemplates {
    SqlTemplates {
        pre: String::new(),
        item: ":r $(file)".to_string(),
        post: String::new(),
    }
}

fn required_param(
    params: &serde_json::Map<String, serde_json::Value>,
    kind: &str,
    name: &str,
    ctx: &VarContext,
) -> Result<PathBuf> {
    let value = params.get(name).ok_or_else(|| {
        Error::config(format!("task '{kind}' requires parameter '{name}'"))
    })?;
    Ok(PathBuf::from(vars::substitute_param(value, ctx)?))
}

fn compile_regex(
    params: &serde_json::Map<String, serde_json::Value>,
    kind: &str,
    default: &str,
    ctx: &VarContext,
) -> Result<Regex> {
    let pattern = match params.get("regex") {
        Some(value) => vars::substitute_param(value, ctx)?,
        None => default.to_string(),
    };
    Regex::new(&pattern)
        .map_err(|e| Error::config(format!("task '{kind}' has an invalid regex: {e}")))
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
