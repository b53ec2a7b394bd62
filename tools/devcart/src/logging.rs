//! Console logger for the command-line tools.
//!
//! Diagnostics go to stderr with a local timestamp and a colored level tag, so
//! that stdout stays reserved for what the cartridge prints.

use std::io::Write;

use chrono::Local;
use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Environment variable holding the default level (`error` .. `trace`).
pub const LOG_ENV: &str = "DEVCART_LOG";

pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    fn tag(level: Level) -> ColoredString {
        match level {
            Level::Error => "ERROR".bright_red().bold(),
            Level::Warn => "WARN ".bright_yellow(),
            Level::Info => "INFO ".bright_green(),
            Level::Debug => "DEBUG".bright_blue(),
            Level::Trace => "TRACE".dimmed(),
        }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stamp = Local::now().format("%H:%M:%S%.3f").to_string();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{} {} {}",
            stamp.dimmed(),
            Self::tag(record.level()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Picks the level from the `-v` count, falling back to [`LOG_ENV`] and then
/// to `info`.
pub fn level_from(verbosity: u8, env: Option<&str>) -> LevelFilter {
    match verbosity {
        0 => env
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the console logger as the global `log` backend. Fails if a
/// backend is already installed.
pub fn init(verbosity: u8) -> Result<(), SetLoggerError> {
    let env = std::env::var(LOG_ENV).ok();
    let level = level_from(verbosity, env.as_deref());
    let logger: &'static ConsoleLogger = Box::leak(Box::new(ConsoleLogger::new(level)));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}
