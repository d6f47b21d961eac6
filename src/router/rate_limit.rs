/// Sliding-window rate limiter, one per provider
///
/// Tracks the timestamps of recorded requests and enforces all three
/// windows (minute, hour, day) at once. Checking and recording happen
/// under one lock so concurrent callers cannot both claim the last
/// slot.
///
/// Waiting is not a fixed-interval poll: `next_free_in` computes when
/// the earliest-expiring timestamp leaves its saturated window and the
/// waiter sleeps until then.
use crate::constants::{RATE_WAIT_MAX_MS, RATE_WAIT_POLL_MS};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

const WINDOWS: [(Duration, fn(&RateLimits) -> u32); 3] = [
    (Duration::from_secs(60), |l| l.per_minute),
    (Duration::from_secs(3_600), |l| l.per_hour),
    (Duration::from_secs(86_400), |l| l.per_day),
];

pub struct RateLimiter {
    limits: RateLimits,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Read-only capacity check (used by the router's candidate filter)
    pub fn has_capacity(&self) -> bool {
        self.has_capacity_at(Instant::now())
    }

    pub fn has_capacity_at(&self, now: Instant) -> bool {
        let mut timestamps = self.timestamps.lock();
        Self::prune(&mut timestamps, now);
        self.window_counts(&timestamps, now)
            .iter()
            .zip(WINDOWS.iter())
            .all(|(count, (_, limit))| *count < limit(&self.limits) as usize)
    }

    /// Atomically check capacity and record the request.
    /// Returns false without recording when any window is full.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut timestamps = self.timestamps.lock();
        Self::prune(&mut timestamps, now);

        let full = self
            .window_counts(&timestamps, now)
            .iter()
            .zip(WINDOWS.iter())
            .any(|(count, (_, limit))| *count >= limit(&self.limits) as usize);

        if full {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Fraction of the most-constrained window currently used, 0..=1
    pub fn utilization(&self) -> f64 {
        self.utilization_at(Instant::now())
    }

    pub fn utilization_at(&self, now: Instant) -> f64 {
        let mut timestamps = self.timestamps.lock();
        Self::prune(&mut timestamps, now);
        self.window_counts(&timestamps, now)
            .iter()
            .zip(WINDOWS.iter())
            .map(|(count, (_, limit))| {
                let limit = limit(&self.limits).max(1) as f64;
                (*count as f64 / limit).min(1.0)
            })
            .fold(0.0, f64::max)
    }

    /// How long until a saturated window frees one slot.
    /// None means there is capacity right now.
    pub fn next_free_in(&self) -> Option<Duration> {
        self.next_free_in_at(Instant::now())
    }

    pub fn next_free_in_at(&self, now: Instant) -> Option<Duration> {
        let mut timestamps = self.timestamps.lock();
        Self::prune(&mut timestamps, now);

        let mut wait: Option<Duration> = None;
        for (window, limit) in WINDOWS.iter() {
            let limit = limit(&self.limits) as usize;
            let in_window: Vec<Instant> = timestamps
                .iter()
                .copied()
                .filter(|t| now.duration_since(*t) < *window)
                .collect();

            if in_window.len() >= limit && limit > 0 {
                // the request that must age out before a slot frees
                let blocking = in_window[in_window.len() - limit];
                let free_at = blocking + *window;
                let window_wait = free_at.saturating_duration_since(now);
                wait = Some(wait.map_or(window_wait, |w: Duration| w.max(window_wait)));
            }
        }
        wait
    }

    /// Wait until a slot can be acquired, up to `max_wait`.
    /// Returns true once acquired, false if the wait budget ran out.
    pub async fn acquire_within(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait.min(Duration::from_millis(RATE_WAIT_MAX_MS));

        loop {
            if self.try_acquire() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let sleep_for = self
                .next_free_in()
                .unwrap_or(Duration::from_millis(RATE_WAIT_POLL_MS))
                .min(deadline - now)
                // a floor avoids a hot spin when the wake lands a hair early
                .max(Duration::from_millis(10));
            tokio::time::sleep(sleep_for).await;
        }
    }

    fn window_counts(&self, timestamps: &VecDeque<Instant>, now: Instant) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for (i, (window, _)) in WINDOWS.iter().enumerate() {
            counts[i] = timestamps
                .iter()
                .filter(|t| now.duration_since(**t) < *window)
                .count();
        }
        counts
    }

    /// Drop timestamps older than the widest window
    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant) {
        let day = Duration::from_secs(86_400);
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= day {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(per_minute: u32) -> RateLimits {
        RateLimits {
            per_minute,
            per_hour: 10_000,
            per_day: 100_000,
        }
    }

    #[test]
    fn test_sixty_first_call_in_a_minute_is_refused() {
        let limiter = RateLimiter::new(limits(60));
        let t0 = Instant::now();

        for _ in 0..60 {
            assert!(limiter.try_acquire_at(t0));
        }
        // call 61 inside the same minute never goes through immediately
        assert!(!limiter.try_acquire_at(t0));
        assert!(!limiter.try_acquire_at(t0 + Duration::from_secs(59)));
        // after the window slides, capacity returns
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_hour_window_binds_even_with_minute_capacity() {
        let limiter = RateLimiter::new(RateLimits {
            per_minute: 100,
            per_hour: 3,
            per_day: 100_000,
        });
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(limiter.try_acquire_at(t0 + Duration::from_secs(i * 120)));
        }
        // minute window is empty at t0+10m but the hour window is full
        assert!(!limiter.try_acquire_at(t0 + Duration::from_secs(600)));
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(3_601)));
    }

    #[test]
    fn test_utilization_tracks_most_constrained_window() {
        let limiter = RateLimiter::new(limits(10));
        let t0 = Instant::now();

        for _ in 0..5 {
            limiter.try_acquire_at(t0);
        }
        let utilization = limiter.utilization_at(t0);
        assert!((utilization - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_next_free_in_points_at_earliest_expiring_slot() {
        let limiter = RateLimiter::new(limits(2));
        let t0 = Instant::now();

        assert!(limiter.try_acquire_at(t0));
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(10)));

        // saturated; the oldest slot frees at t0 + 60
        let wait = limiter
            .next_free_in_at(t0 + Duration::from_secs(20))
            .expect("window saturated");
        assert_eq!(wait, Duration::from_secs(40));

        assert!(limiter.next_free_in_at(t0 + Duration::from_secs(61)).is_none());
    }

    #[tokio::test]
    async fn test_acquire_within_gives_up_past_budget() {
        let limiter = RateLimiter::new(limits(1));
        assert!(limiter.try_acquire());
        // window stays full for 60s; a 50ms budget must fail fast
        assert!(!limiter.acquire_within(Duration::from_millis(50)).await);
    }
}
