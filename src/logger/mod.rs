//! Structured logging for feedcache
//!
//! Provides a small logging API with:
//! - Standard log levels (Error/Warning/Info/Debug)
//! - Per-module debug control via --debug-<module> flags
//! - Dual output: colored console + file persistence
//!
//! ## Usage
//!
//! ```rust
//! use feedcache::logger::{self, LogTag};
//!
//! logger::error(LogTag::Provider, "Connection failed");
//! logger::warning(LogTag::Budget, "Hourly spend at 85%");
//! logger::info(LogTag::Cache, "Tiered cache initialized");
//! logger::debug(LogTag::Router, "Scoring 3 candidate providers"); // only with --debug-router
//! ```
//!
//! Call `logger::init()` once at startup, before any logging occurs.

mod format;
mod levels;
mod tags;

pub use levels::LogLevel;
pub use tags::LogTag;

use crate::arguments;
use once_cell::sync::OnceCell;

struct LoggerConfig {
    min_level: LogLevel,
    debug_all: bool,
    debug_tags: Vec<String>,
}

static LOGGER_CONFIG: OnceCell<LoggerConfig> = OnceCell::new();

/// Initialize the logger from command-line arguments.
///
/// Scans for `--quiet`, `--debug` and `--debug-<module>` flags and
/// fixes the filtering rules for the lifetime of the process.
pub fn init() {
    let args = arguments::get_cmd_args();

    let debug_tags: Vec<String> = args
        .iter()
        .filter_map(|a| a.strip_prefix("--debug-").map(|s| s.to_string()))
        .collect();

    let min_level = if arguments::has_arg("--quiet") {
        LogLevel::Warning
    } else {
        LogLevel::Info
    };

    let _ = LOGGER_CONFIG.set(LoggerConfig {
        min_level,
        debug_all: arguments::has_arg("--debug"),
        debug_tags,
    });
}

fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    // Errors always log
    if level == LogLevel::Error {
        return true;
    }

    let config = LOGGER_CONFIG.get_or_init(|| LoggerConfig {
        min_level: LogLevel::Info,
        debug_all: false,
        debug_tags: Vec::new(),
    });

    if level == LogLevel::Debug {
        return config.debug_all || config.debug_tags.iter().any(|t| t == tag.to_debug_key());
    }

    level <= config.min_level
}

fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }
    format::format_and_log(tag, level, message);
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, gated by --debug or --debug-<module>
pub fn debug(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Debug, message);
}

/// Force flush all pending log writes. Call during shutdown.
pub fn flush() {
    format::flush();
}
