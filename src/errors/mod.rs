use thiserror::Error;

/// Error taxonomy for the cache and routing pipeline.
///
/// Callers distinguish "temporarily too expensive" (`BudgetExceeded`)
/// from "structurally unservable" (`RoutingExhausted`), and local
/// degradations (`CacheUnavailable`, `SizeLimitExceeded`) are never
/// surfaced as request failures.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shared cache tier unavailable: {0}")]
    CacheUnavailable(String),

    #[error("No provider satisfies the request: {0}")]
    RoutingExhausted(String),

    #[error("Budget exceeded: {window} spend {spent:.4} would pass limit {limit:.4}")]
    BudgetExceeded {
        window: String,
        spent: f64,
        limit: f64,
    },

    #[error("Provider {provider} failed: {reason}")]
    ProviderFailure { provider: String, reason: String },

    #[error("Rate limit exhausted for provider: {provider}")]
    RateLimited { provider: String },

    #[error("Entry too large to cache: {size} bytes (limit {limit})")]
    SizeLimitExceeded { size: usize, limit: usize },

    #[error("Timeout: no result within the {waited_ms} ms deadline")]
    Timeout { waited_ms: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Whether retrying the same request later can plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            FeedError::CacheUnavailable(_) => true,
            FeedError::BudgetExceeded { .. } => true,
            FeedError::ProviderFailure { .. } => true,
            FeedError::RateLimited { .. } => true,
            FeedError::Timeout { .. } => true,
            FeedError::Http(_) => true,
            _ => false,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, FeedError::Config(_) | FeedError::Database(_))
    }

    /// Suggested wait before retrying, where one makes sense
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            FeedError::RateLimited { .. } => Some(60),
            FeedError::BudgetExceeded { .. } => Some(300),
            FeedError::ProviderFailure { .. } => Some(10),
            FeedError::Http(_) => Some(5),
            FeedError::Timeout { .. } => Some(5),
            _ => None,
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
