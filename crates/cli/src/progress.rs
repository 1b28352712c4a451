// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-facing progress on stderr.
//!
//! stdout is reserved for command payloads, so everything here draws on
//! stderr. A silent `Progress` prints nothing at all.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;

#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
    silent: bool,
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Progress {
    /// A spinner on stderr, or a hidden one when `silent` or stderr is not a
    /// terminal.
    pub fn new(silent: bool) -> Self {
        let bar = if silent || !std::io::stderr().is_terminal() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar
        };
        Self { bar, silent, captured: None }
    }

    /// Hidden progress that records every printed line.
    pub fn capture() -> Self {
        Self { bar: ProgressBar::hidden(), silent: false, captured: Some(Arc::default()) }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Lines printed so far by a [`Progress::capture`] instance.
    pub fn lines(&self) -> Vec<String> {
        self.captured.as_ref().map(|c| c.lock().clone()).unwrap_or_default()
    }

    /// Start spinning with `message`.
    pub fn wait(&self, message: impl Into<String>) {
        if self.silent {
            return;
        }
        self.bar.set_message(message.into());
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if let Some(ref captured) = self.captured {
            captured.lock().push(line.to_owned());
            return;
        }
        if self.silent {
            return;
        }
        if self.bar.is_hidden() {
            eprintln!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Frame `lines` in a box for the browser instruction.
pub fn boxed(lines: &[&str]) -> String {
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let rule = "─".repeat(width + 2);
    let mut out = format!("┌{rule}┐\n");
    for line in lines {
        let pad = width - line.chars().count();
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{rule}┘"));
    out
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
