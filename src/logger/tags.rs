/// Log tags identify the subsystem a message originates from.
///
/// Tags drive per-module debug gating: `--debug-cache` enables Debug
/// level output for `LogTag::Cache` only, while `--debug` enables it
/// for every tag.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Cache,
    Store,
    Router,
    RateLimit,
    Budget,
    Provider,
    Service,
    Monitor,
    Events,
}

impl LogTag {
    /// Short uppercase label used in formatted output
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Cache => "CACHE",
            LogTag::Store => "STORE",
            LogTag::Router => "ROUTER",
            LogTag::RateLimit => "RATELIMIT",
            LogTag::Budget => "BUDGET",
            LogTag::Provider => "PROVIDER",
            LogTag::Service => "SERVICE",
            LogTag::Monitor => "MONITOR",
            LogTag::Events => "EVENTS",
        }
    }

    /// Key used for `--debug-<key>` command-line flags
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Cache => "cache",
            LogTag::Store => "store",
            LogTag::Router => "router",
            LogTag::RateLimit => "ratelimit",
            LogTag::Budget => "budget",
            LogTag::Provider => "provider",
            LogTag::Service => "service",
            LogTag::Monitor => "monitor",
            LogTag::Events => "events",
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
