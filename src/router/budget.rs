/// Spend tracking against hourly, daily, and monthly budgets
///
/// Counters only grow within a window and reset exactly at the
/// wall-clock boundary (top of hour, midnight UTC, first of month).
/// Checking and charging happen atomically under one lock, so two
/// concurrent calls cannot both squeeze past the limit.
///
/// Which windows hard-block is configuration; by default only the
/// hourly window blocks since it bounds worst-case burn rate, while
/// daily and monthly alert without blocking.
use crate::config::BudgetSettings;
use crate::errors::{FeedError, FeedResult};
use crate::events::{self, FeedEvent};
use crate::logger::{self, LogTag};
use chrono::{DateTime, Datelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Hourly,
    Daily,
    Monthly,
}

impl Window {
    fn as_str(&self) -> &'static str {
        match self {
            Window::Hourly => "hourly",
            Window::Daily => "daily",
            Window::Monthly => "monthly",
        }
    }

    /// Key identifying the current period; a key change means rollover
    fn period_key(&self, now: DateTime<Utc>) -> i64 {
        match self {
            Window::Hourly => now.timestamp() / 3_600,
            Window::Daily => now.num_days_from_ce() as i64,
            Window::Monthly => now.year() as i64 * 12 + now.month() as i64,
        }
    }
}

struct WindowState {
    period_key: i64,
    spent: f64,
    warned: bool,
}

struct BudgetState {
    hourly: WindowState,
    daily: WindowState,
    monthly: WindowState,
}

/// Point-in-time view for monitoring and health checks
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    pub hourly_spent: f64,
    pub hourly_limit: f64,
    pub daily_spent: f64,
    pub daily_limit: f64,
    pub monthly_spent: f64,
    pub monthly_limit: f64,
}

impl BudgetSnapshot {
    /// Spend-to-budget ratio for the hourly window, 0..=1
    pub fn hourly_ratio(&self) -> f64 {
        if self.hourly_limit <= 0.0 {
            0.0
        } else {
            (self.hourly_spent / self.hourly_limit).min(1.0)
        }
    }

    pub fn daily_ratio(&self) -> f64 {
        if self.daily_limit <= 0.0 {
            0.0
        } else {
            (self.daily_spent / self.daily_limit).min(1.0)
        }
    }
}

pub struct BudgetTracker {
    settings: BudgetSettings,
    state: Mutex<BudgetState>,
}

impl BudgetTracker {
    pub fn new(settings: BudgetSettings) -> Self {
        let now = Utc::now();
        Self {
            state: Mutex::new(BudgetState {
                hourly: WindowState {
                    period_key: Window::Hourly.period_key(now),
                    spent: 0.0,
                    warned: false,
                },
                daily: WindowState {
                    period_key: Window::Daily.period_key(now),
                    spent: 0.0,
                    warned: false,
                },
                monthly: WindowState {
                    period_key: Window::Monthly.period_key(now),
                    spent: 0.0,
                    warned: false,
                },
            }),
            settings,
        }
    }

    /// Atomically approve and charge `cost`.
    ///
    /// A refusal charges nothing, in any window. Non-blocking windows
    /// passing their limit log and emit events but never refuse.
    pub fn try_charge(&self, cost: f64) -> FeedResult<()> {
        self.try_charge_at(Utc::now(), cost)
    }

    pub fn try_charge_at(&self, now: DateTime<Utc>, cost: f64) -> FeedResult<()> {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);

        let checks = [
            (
                Window::Hourly,
                state.hourly.spent,
                self.settings.hourly_limit,
                self.settings.block_hourly,
            ),
            (
                Window::Daily,
                state.daily.spent,
                self.settings.daily_limit,
                self.settings.block_daily,
            ),
            (
                Window::Monthly,
                state.monthly.spent,
                self.settings.monthly_limit,
                self.settings.block_monthly,
            ),
        ];

        for (window, spent, limit, blocks) in checks {
            if spent + cost > limit {
                if blocks {
                    events::emit(FeedEvent::BudgetExceeded {
                        window: window.as_str().to_string(),
                        spent,
                        limit,
                    });
                    return Err(FeedError::BudgetExceeded {
                        window: window.as_str().to_string(),
                        spent,
                        limit,
                    });
                }
                logger::warning(
                    LogTag::Budget,
                    &format!(
                        "{} budget passed (spent {:.4} + {:.4} > {:.4}), window does not block",
                        window.as_str(),
                        spent,
                        cost,
                        limit
                    ),
                );
            }
        }

        state.hourly.spent += cost;
        state.daily.spent += cost;
        state.monthly.spent += cost;

        self.emit_threshold_warnings(&mut state);
        Ok(())
    }

    /// Whether a call of `cost` would currently be approved
    pub fn can_afford(&self, cost: f64) -> bool {
        self.can_afford_at(Utc::now(), cost)
    }

    pub fn can_afford_at(&self, now: DateTime<Utc>, cost: f64) -> bool {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);

        let blocked = (self.settings.block_hourly
            && state.hourly.spent + cost > self.settings.hourly_limit)
            || (self.settings.block_daily
                && state.daily.spent + cost > self.settings.daily_limit)
            || (self.settings.block_monthly
                && state.monthly.spent + cost > self.settings.monthly_limit);
        !blocked
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> BudgetSnapshot {
        let mut state = self.state.lock();
        Self::roll(&mut state, now);
        BudgetSnapshot {
            hourly_spent: state.hourly.spent,
            hourly_limit: self.settings.hourly_limit,
            daily_spent: state.daily.spent,
            daily_limit: self.settings.daily_limit,
            monthly_spent: state.monthly.spent,
            monthly_limit: self.settings.monthly_limit,
        }
    }

    fn roll(state: &mut BudgetState, now: DateTime<Utc>) {
        for (window, ws) in [
            (Window::Hourly, &mut state.hourly),
            (Window::Daily, &mut state.daily),
            (Window::Monthly, &mut state.monthly),
        ] {
            let key = window.period_key(now);
            if ws.period_key != key {
                ws.period_key = key;
                ws.spent = 0.0;
                ws.warned = false;
            }
        }
    }

    /// One cost warning per window per period, at the configured pct
    fn emit_threshold_warnings(&self, state: &mut BudgetState) {
        let threshold = self.settings.warning_threshold_pct / 100.0;
        let windows = [
            (Window::Hourly, self.settings.hourly_limit, &mut state.hourly),
            (Window::Daily, self.settings.daily_limit, &mut state.daily),
            (
                Window::Monthly,
                self.settings.monthly_limit,
                &mut state.monthly,
            ),
        ];

        for (window, limit, ws) in windows {
            if !ws.warned && limit > 0.0 && ws.spent / limit >= threshold {
                ws.warned = true;
                logger::warning(
                    LogTag::Budget,
                    &format!(
                        "{} spend at {:.0}% of budget ({:.4} / {:.4})",
                        window.as_str(),
                        ws.spent / limit * 100.0,
                        ws.spent,
                        limit
                    ),
                );
                events::emit(FeedEvent::CostWarning {
                    window: window.as_str().to_string(),
                    spent: ws.spent,
                    limit,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> BudgetSettings {
        BudgetSettings {
            hourly_limit: 1.0,
            daily_limit: 10.0,
            monthly_limit: 100.0,
            warning_threshold_pct: 80.0,
            block_hourly: true,
            block_daily: false,
            block_monthly: false,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_hourly_limit_rejects_without_charging() {
        let tracker = BudgetTracker::new(settings());
        let now = at(9, 0);

        for _ in 0..10 {
            tracker.try_charge_at(now, 0.1).unwrap();
        }

        // the next dime would pass 1.0: refused, not charged
        let err = tracker.try_charge_at(now, 0.1).unwrap_err();
        assert!(matches!(err, FeedError::BudgetExceeded { .. }));

        let snapshot = tracker.snapshot_at(now);
        assert!((snapshot.hourly_spent - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_spend_never_exceeds_hourly_budget() {
        let tracker = BudgetTracker::new(settings());
        let now = at(9, 0);

        for _ in 0..50 {
            let _ = tracker.try_charge_at(now, 0.07);
        }

        let snapshot = tracker.snapshot_at(now);
        assert!(snapshot.hourly_spent <= 1.0 + 1e-9);
    }

    #[test]
    fn test_hourly_window_resets_at_boundary() {
        let tracker = BudgetTracker::new(settings());

        tracker.try_charge_at(at(9, 30), 0.9).unwrap();
        assert!(!tracker.can_afford_at(at(9, 59), 0.2));

        // top of the hour: counter resets exactly at the boundary
        assert!(tracker.can_afford_at(at(10, 0), 0.2));
        tracker.try_charge_at(at(10, 0), 0.2).unwrap();

        let snapshot = tracker.snapshot_at(at(10, 0));
        assert!((snapshot.hourly_spent - 0.2).abs() < 1e-9);
        // daily window did not reset
        assert!((snapshot.daily_spent - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_daily_window_warns_but_does_not_block() {
        let mut s = settings();
        s.hourly_limit = 1_000.0; // keep hourly out of the way
        let tracker = BudgetTracker::new(s);

        // blow through the daily limit of 10.0 across hours
        for hour in 0..12 {
            tracker.try_charge_at(at(hour, 0), 2.0).unwrap();
        }

        let snapshot = tracker.snapshot_at(at(11, 30));
        assert!(snapshot.daily_spent > 10.0);
    }

    #[test]
    fn test_rejected_call_is_never_charged() {
        let tracker = BudgetTracker::new(settings());
        let now = at(14, 0);

        tracker.try_charge_at(now, 0.95).unwrap();
        assert!(tracker.try_charge_at(now, 0.2).is_err());
        assert!(tracker.try_charge_at(now, 0.2).is_err());

        let snapshot = tracker.snapshot_at(now);
        assert!((snapshot.hourly_spent - 0.95).abs() < 1e-9);
        assert!((snapshot.daily_spent - 0.95).abs() < 1e-9);
    }
}
