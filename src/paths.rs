//! Path handling for runtime data
//!
//! Everything the daemon writes (config, shared cache database, logs)
//! lives under a single `data/` directory next to the working
//! directory, so multiple deployments can run side by side.

use std::path::PathBuf;

pub const DATA_DIR: &str = "data";

pub fn data_dir() -> PathBuf {
    PathBuf::from(DATA_DIR)
}

/// Create the data directory if it does not exist.
/// Call before logger initialization so the log file can be created.
pub fn ensure_data_dir() -> Result<(), String> {
    std::fs::create_dir_all(data_dir())
        .map_err(|e| format!("Failed to create data directory: {}", e))
}
