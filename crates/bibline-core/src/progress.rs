//! Terminal progress for the pipeline phases
//!
//! On a TTY each phase gets a spinner line and extraction adds a counted bar
//! for cursor pages or year slices. Off a TTY every bar is hidden and the log
//! lines carry the progress.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}";
const COUNT_TEMPLATE: &str =
    "{prefix:<12.dim} {bar:30.green/dim} {pos:>6}/{len:6} {eta:>4} {wide_msg:.dim}";
const PREFIX_WIDTH: usize = 12;

pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Draw only when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Never draws (tests, piped output).
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    fn add(&self, len: u64, template: &str, prefix: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(len));
        if let Ok(style) = ProgressStyle::with_template(template) {
            pb.set_style(style.progress_chars("--"));
        }
        let prefix: String = prefix.chars().take(PREFIX_WIDTH).collect();
        pb.set_prefix(prefix);
        pb
    }

    /// Spinner line for one phase; update with `set_message`, end with
    /// `finish_and_clear`.
    pub fn stage_line(&self, phase: &str) -> ProgressBar {
        let pb = self.add(0, SPINNER_TEMPLATE, phase);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Counted bar over `total` units (records on a cursor, years when slicing).
    pub fn count_bar(&self, label: &str, total: u64) -> ProgressBar {
        self.add(total, COUNT_TEMPLATE, label)
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For the log bridge, so log lines print above the bars.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// `1234567` → `1,234,567`
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
