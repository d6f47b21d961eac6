/// Centralized command-line argument handling
///
/// Stores the process arguments in a thread-safe singleton so flag
/// checks work from any module, and lets tests override the argument
/// list without touching the environment.
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Sets the global command-line arguments
/// Used by tests to override the default env::args() collection
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Gets a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Checks if a specific argument is present in the command line
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Gets the value of a command-line argument that follows a flag
/// Returns None if the flag is not found or has no value
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag {
            return args.get(i + 1).cloned();
        }
    }
    None
}

/// Path to the configuration file, from `--config <path>` or the default
pub fn get_config_path() -> String {
    get_arg_value("--config").unwrap_or_else(|| crate::config::CONFIG_FILE_PATH.to_string())
}

/// Checks if help output was requested
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

/// Print usage information for the daemon
pub fn print_help() {
    println!("feedcache - cost-budgeted multi-tier cache for metered data providers");
    println!();
    println!("USAGE:");
    println!("    feedcache [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --config <path>      Configuration file (default: data/config.toml)");
    println!("    --quiet              Only warnings and errors on the console");
    println!("    --debug              Enable debug output for all modules");
    println!("    --debug-<module>     Enable debug output for one module");
    println!("                         (cache, store, router, ratelimit, budget,");
    println!("                          provider, service, monitor, events)");
    println!("    --help, -h           Print this help text");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_value_lookup() {
        set_cmd_args(vec![
            "feedcache".to_string(),
            "--config".to_string(),
            "/tmp/custom.toml".to_string(),
        ]);

        assert!(has_arg("--config"));
        assert_eq!(get_arg_value("--config"), Some("/tmp/custom.toml".to_string()));
        assert_eq!(get_arg_value("--missing"), None);
    }
}
