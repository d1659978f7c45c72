// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Indented deploy progress output.
//!
//! Group nodes frame their children with pre/post lines; every level of
//! nesting indents by two spaces. This is user-facing progress, distinct
//! from `tracing` diagnostics which go to stderr.

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Indented stdout writer used by the run pass.
///
/// Stdout failures are swallowed: losing a progress line must not abort
/// a half-applied deployment.
pub struct Console {
    stdout: StandardStream,
    indent: usize,
}

impl Console {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(color_choice),
            indent: 0,
        }
    }

    /// A console that never emits color, for tests and dry runs piped to files.
    pub fn plain() -> Self {
        Self::new(ColorChoice::Never)
    }

    /// Write one line at the current indent.
    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{:indent$}{text}", "", indent = self.indent * 2);
    }

    /// Write a framing line (group pre-logs) in bold.
    pub fn heading(&mut self, text: &str) {
        let _ = self
            .stdout
            .set_color(ColorSpec::new().set_bold(true));
        self.line(text);
        let _ = self.stdout.reset();
    }

    /// Write a de-emphasized note (dry-run intents).
    pub fn note(&mut self, text: &str) {
        let _ = self
            .stdout
            .set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
        self.line(text);
        let _ = self.stdout.reset();
    }

    pub fn push(&mut self) {
        self.indent += 1;
    }

    pub fn pop(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }
}
