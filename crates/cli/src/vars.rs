// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Variable substitution in task parameter strings.
//!
//! `$(name)` resolves a context variable, `$(e:name)` a process
//! environment variable, `$(f:name)` a feature attribute. `$$(name)` is
//! a single-level escape: it renders to the literal `$(name)` so the
//! task can evaluate it at execution time. Parameter values that are
//! lists of strings join with `\n` before substitution.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Resolution context for one substitution pass.
#[derive(Debug, Default)]
pub struct VarContext {
    /// `$(name)` variables: task defines, recipe parameters, execution-time
    /// bindings such as `file`.
    pub variables: BTreeMap<String, String>,

    /// `$(f:name)` feature attributes.
    pub attributes: BTreeMap<String, String>,
}

impl VarContext {
    pub fn new(variables: BTreeMap<String, String>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            variables,
            attributes,
        }
    }

    /// Context holding a single variable, for execution-time bindings.
    pub fn single(name: &str, value: &str) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert(name.to_string(), value.to_string());
        Self {
            variables,
            attributes: BTreeMap::new(),
        }
    }
}

/// Substitute every marker in `input`.
pub fn substitute(input: &str, ctx: &VarContext) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(body) = rest.strip_prefix("$$(") {
            // Escape: emit the marker itself, unevaluated
            let close = find_close(body, input)?;
            out.push_str("$(");
            out.push_str(&body[..=close]);
            rest = &body[close + 1..];
        } else if let Some(body) = rest.strip_prefix("$(") {
            let close = find_close(body, input)?;
            out.push_str(&resolve(&body[..close], ctx)?);
            rest = &body[close + 1..];
        } else {
            // Lone dollar sign
            out.push('$');
            rest = &rest[1..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Render a JSON parameter value to a string and substitute it.
/// Strings pass through; lists of strings join with `\n`.
pub fn substitute_param(value: &serde_json::Value, ctx: &VarContext) -> Result<String> {
    match value {
        serde_json::Value::String(s) => substitute(s, ctx),
        serde_json::Value::Array(items) => {
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                let line = item.as_str().ok_or_else(|| {
                    Error::config("list parameters must contain only strings")
                })?;
                lines.push(line);
            }
            substitute(&lines.join("\n"), ctx)
        }
        other => Err(Error::config(format!(
            "parameter must be a string or list of strings, found {other}"
        ))),
    }
}

fn find_close(body: &str, input: &str) -> Result<usize> {
    body.find(')')
        .ok_or_else(|| Error::config(format!("unterminated variable marker in '{input}'")))
}

fn resolve(name: &str, ctx: &VarContext) -> Result<String> {
    if let Some(var) = name.strip_prefix("e:") {
        return std::env::var(var)
            .map_err(|_| Error::config(format!("undefined environment variable: {var}")));
    }
    if let Some(attr) = name.strip_prefix("f:") {
        return ctx
            .attributes
            .get(attr)
            .cloned()
            .ok_or_else(|| Error::config(format!("undefined feature attribute: {attr}")));
    }
    ctx.variables
        .get(name)
        .cloned()
        .ok_or_else(|| Error::config(format!("undefined variable: {name}")))
}

#[cfg(test)]
#[path = "vars_tests.rs"]
mod tests;
