/// Formatting and output for log messages
///
/// Writes colored lines to the console and plain lines to the log file.
/// File output is best-effort: a write failure never panics the caller.

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Utc;
use colored::Colorize;
use once_cell::sync::Lazy;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

const LOG_FILE_PATH: &str = "data/feedcache.log";

static LOG_FILE: Lazy<Mutex<Option<std::fs::File>>> = Lazy::new(|| {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE_PATH)
        .ok();
    Mutex::new(file)
});

pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();

    let level_colored = match level {
        LogLevel::Error => level.as_str().red().bold(),
        LogLevel::Warning => level.as_str().yellow(),
        LogLevel::Info => level.as_str().green(),
        LogLevel::Debug => level.as_str().cyan(),
    };

    println!(
        "{} [{}] {} {}",
        timestamp.as_str().dimmed(),
        tag.as_str().blue(),
        level_colored,
        message
    );

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(
                file,
                "{} [{}] {} {}",
                timestamp,
                tag.as_str(),
                level.as_str(),
                message
            );
        }
    }
}

/// Flush pending file writes. Called during shutdown.
pub fn flush() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = file.flush();
        }
    }
}
