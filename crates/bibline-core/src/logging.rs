//! Logging with indicatif integration and a per-phase log file
//!
//! Console output goes through `MultiProgress::suspend` on a TTY so log lines
//! never tear progress bars. Once a phase knows its run id it calls
//! [`attach_log_file`], after which every line is mirrored to
//! `logs/<phase>_<run_id>.log` with a UTC timestamp.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use indicatif::MultiProgress;

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Logger that filters with env_logger rules and writes to stderr (through
/// indicatif on a TTY) plus the attached phase log file.
pub struct PhaseLogger {
    filter: env_logger::Logger,
    multi: Option<MultiProgress>,
}

impl PhaseLogger {
    pub fn new(filter: env_logger::Logger, multi: Option<MultiProgress>) -> Self {
        Self { filter, multi }
    }
}

impl log::Log for PhaseLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        log::Log::enabled(&self.filter, metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.filter.matches(record) {
            return;
        }

        match &self.multi {
            Some(multi) => {
                let (pre, label, post) = level_style(record.level(), true);
                let line = format!("[{pre}{label}{post}] {}", record.args());
                multi.suspend(|| eprintln!("{line}"));
            }
            None => {
                let (_, label, _) = level_style(record.level(), false);
                eprintln!("[{label}] {}", record.args());
            }
        }

        if let Some(file) = LOG_FILE.get() {
            if let Ok(mut file) = file.lock() {
                let (_, label, _) = level_style(record.level(), false);
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
                let _ = writeln!(file, "{ts} {label} {}", record.args());
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = LOG_FILE.get() {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Initialize logging.
///
/// `quiet` lowers the default level to warn (progress bars show activity on
/// a TTY); `debug` raises it. `RUST_LOG` overrides both.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let filter =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .build();
    let max_level = filter.filter();

    // A second init (e.g. from tests) keeps the first logger.
    if log::set_boxed_logger(Box::new(PhaseLogger::new(filter, multi.cloned()))).is_ok() {
        log::set_max_level(max_level);
    }
}

/// Mirror all subsequent log lines to `path` (appending). First call wins.
pub fn attach_log_file(path: &Path) -> std::io::Result<()> {
    if LOG_FILE.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = LOG_FILE.set(Mutex::new(file));
    log::debug!("Logging to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_padded() {
        for level in [
            log::Level::Error,
            log::Level::Warn,
            log::Level::Info,
            log::Level::Debug,
            log::Level::Trace,
        ] {
            let (_, label, _) = level_style(level, false);
            assert_eq!(label.len(), 5);
        }
    }

    #[test]
    fn no_color_has_no_escape() {
        let (pre, _, post) = level_style(log::Level::Warn, false);
        assert!(pre.is_empty());
        assert!(post.is_empty());
        let (pre, _, post) = level_style(log::Level::Warn, true);
        assert!(pre.starts_with("\x1b["));
        assert_eq!(post, "\x1b[0m");
    }
}
