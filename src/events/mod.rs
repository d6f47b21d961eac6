//! Best-effort event stream for dashboards and downstream consumers
//!
//! Events are broadcast on a bounded channel; emitters never block and
//! never fail. A consumer that falls behind loses the oldest events
//! (broadcast lag), which is acceptable for observability data.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 2048;

static EVENTS_TX: OnceCell<broadcast::Sender<FeedEvent>> = OnceCell::new();

/// Everything observable about the request path and the budget state
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    CacheHit {
        key: String,
        tier: CacheTier,
        cost_saved: f64,
    },
    CacheMiss {
        key: String,
    },
    RequestCompleted {
        key: String,
        provider: String,
        cost: f64,
        latency_ms: u64,
    },
    DataError {
        key: String,
        reason: String,
    },
    CostWarning {
        window: String,
        spent: f64,
        limit: f64,
    },
    BudgetExceeded {
        window: String,
        spent: f64,
        limit: f64,
    },
    Alert {
        id: String,
        kind: String,
        severity: String,
        message: String,
        at: DateTime<Utc>,
    },
    ConfigurationOptimized {
        recommendations: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    L1,
    L2,
}

fn get_broadcaster() -> &'static broadcast::Sender<FeedEvent> {
    EVENTS_TX.get_or_init(|| {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tx
    })
}

/// Fire-and-forget emit. A send error only means nobody is listening.
pub fn emit(event: FeedEvent) {
    let _ = get_broadcaster().send(event);
}

/// Subscribe to the event stream
pub fn subscribe() -> broadcast::Receiver<FeedEvent> {
    get_broadcaster().subscribe()
}
