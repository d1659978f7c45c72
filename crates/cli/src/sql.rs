// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQL Server subprocess adapters.
//!
//! The engine talks to the server exclusively through [`SqlRunner`];
//! the production implementation shells out to `sqlcmd`. Tests install
//! recording fakes instead.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Everything the engine asks of a SQL Server instance.
pub trait SqlRunner {
    /// Restore `db` from a native backup file.
    fn restore_database(&self, conn: &str, db: &str, backup: &Path) -> Result<()>;

    /// Stream a native backup of `db` to `out`.
    fn backup_database(&self, conn: &str, db: &str, out: &Path, allow_compression: bool)
    -> Result<()>;

    /// Execute a script text against the server.
    fn exec_script(&self, conn: &str, script: &str) -> Result<()>;
}

/// Production runner backed by the `sqlcmd` CLI.
#[derive(Debug, Default)]
pub struct SqlCmdRunner;

impl SqlRunner for SqlCmdRunner {
    fn restore_database(&self, conn: &str, db: &str, backup: &Path) -> Result<()> {
        run_query(conn, &restore_statement(db, backup))
    }

    fn backup_database(
        &self,
        conn: &str,
        db: &str,
        out: &Path,
        allow_compression: bool,
    ) -> Result<()> {
        run_query(conn, &backup_statement(db, out, allow_compression))
    }

    fn exec_script(&self, conn: &str, script: &str) -> Result<()> {
        let mut child = sqlcmd(conn)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Sql(format!("failed to run sqlcmd: {e}")))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| Error::Sql(format!("failed to feed script to sqlcmd: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Sql(format!("failed to wait for sqlcmd: {e}")))?;
        check_exit(&output)
    }
}

fn sqlcmd(conn: &str) -> Command {
    let mut cmd = Command::new("sqlcmd");
    // -b: batch abort, turns script errors into a non-zero exit
    cmd.arg("-b");
    if !conn.is_empty() {
        cmd.args(["-S", conn]);
    }
    cmd
}

fn run_query(conn: &str, statement: &str) -> Result<()> {
    let output = sqlcmd(conn)
        .args(["-Q", statement])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Sql(format!("failed to run sqlcmd: {e}")))?;
    check_exit(&output)
}

fn check_exit(output: &std::process::Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::Sql(format!(
        "sqlcmd exited with {}: {}",
        output.status,
        stderr.trim()
    )))
}

pub(crate) fn restore_statement(db: &str, backup: &Path) -> String {
    format!(
        "RESTORE DATABASE {} FROM DISK = N'{}' WITH REPLACE",
        quote_ident(db),
        quote_str(&backup.display().to_string()),
    )
}

pub(crate) fn backup_statement(db: &str, out: &Path, allow_compression: bool) -> String {
    let compression = if allow_compression { ", COMPRESSION" } else { "" };
    format!(
        "BACKUP DATABASE {} TO DISK = N'{}' WITH INIT, COPY_ONLY{}",
        quote_ident(db),
        quote_str(&out.display().to_string()),
        compression,
    )
}

/// Bracket-quote a SQL Server identifier.
fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Double single quotes inside a string literal body.
fn quote_str(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
#[path = "sql_tests.rs"]
mod tests;
