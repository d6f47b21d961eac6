/// Per-key request coalescing
///
/// The first caller to miss on a key becomes the leader and performs
/// the origin fetch; callers arriving while that fetch is in flight
/// become followers and await the leader's result instead of issuing
/// duplicate, budget-consuming calls.
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Result shared with followers: None means the fetch failed
pub type FlightResult = Option<Value>;

pub enum FlightRole {
    /// This caller fetches and must call `complete` exactly once
    Leader,
    /// This caller awaits the leader's broadcast
    Follower(broadcast::Receiver<FlightResult>),
}

#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, broadcast::Sender<FlightResult>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for a key: first in becomes the leader
    pub fn join(&self, key: &str) -> FlightRole {
        let mut inflight = self.inflight.lock();
        if let Some(tx) = inflight.get(key) {
            FlightRole::Follower(tx.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            inflight.insert(key.to_string(), tx);
            FlightRole::Leader
        }
    }

    /// Publish the leader's result and close the flight.
    /// Followers that already gave up simply miss the broadcast.
    pub fn complete(&self, key: &str, result: FlightResult) {
        let tx = self.inflight.lock().remove(key);
        if let Some(tx) = tx {
            let _ = tx.send(result);
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_joiner_leads_rest_follow() {
        let flights = SingleFlight::new();

        assert!(matches!(flights.join("k"), FlightRole::Leader));
        assert!(matches!(flights.join("k"), FlightRole::Follower(_)));
        assert!(matches!(flights.join("other"), FlightRole::Leader));
    }

    #[tokio::test]
    async fn test_followers_receive_leader_result() {
        let flights = Arc::new(SingleFlight::new());

        assert!(matches!(flights.join("k"), FlightRole::Leader));

        let mut followers = Vec::new();
        for _ in 0..3 {
            match flights.join("k") {
                FlightRole::Follower(rx) => followers.push(rx),
                FlightRole::Leader => panic!("flight already has a leader"),
            }
        }

        flights.complete("k", Some(json!({"price": 42})));

        for mut rx in followers {
            let result = rx.recv().await.expect("broadcast received");
            assert_eq!(result.unwrap()["price"], 42);
        }

        // the flight is closed; the next joiner leads a new one
        assert_eq!(flights.inflight_count(), 0);
        assert!(matches!(flights.join("k"), FlightRole::Leader));
    }

    #[tokio::test]
    async fn test_failed_fetch_broadcasts_none() {
        let flights = SingleFlight::new();

        assert!(matches!(flights.join("k"), FlightRole::Leader));
        let FlightRole::Follower(mut rx) = flights.join("k") else {
            panic!("expected follower");
        };

        flights.complete("k", None);
        assert!(rx.recv().await.expect("broadcast received").is_none());
    }
}
