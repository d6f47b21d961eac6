use feedcache::{arguments, logger, paths, run};
use feedcache::logger::LogTag;

#[tokio::main]
async fn main() {
    // data directory must exist before the logger opens its file
    if let Err(e) = paths::ensure_data_dir() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    logger::init();

    if arguments::is_help_requested() {
        arguments::print_help();
        return;
    }

    logger::info(LogTag::System, "feedcache starting up");

    if let Err(e) = run::run_daemon().await {
        logger::error(LogTag::System, &format!("Fatal: {}", e));
        logger::flush();
        std::process::exit(1);
    }

    logger::info(LogTag::System, "feedcache stopped");
}
