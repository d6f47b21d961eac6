/// TTL policy per data type and priority
///
/// Base TTLs are tuned to how fast each feed actually moves. Priority
/// then adjusts: Critical caps the TTL (freshness trumps cost),
/// Low stretches it (staleness tolerated to save spend).
use crate::constants::{CRITICAL_TTL_CAP_SECS, LOW_PRIORITY_TTL_FACTOR};
use crate::types::{DataType, Priority};

/// Base TTL in seconds before priority adjustment
pub fn base_ttl_seconds(data_type: DataType) -> u64 {
    match data_type {
        DataType::Live => 15,
        DataType::Market => 30,
        DataType::Odds => 60,
        DataType::Stats => 3_600,
        DataType::Historical => 86_400,
    }
}

/// Effective TTL after the priority adjustment
pub fn ttl_seconds(data_type: DataType, priority: Priority) -> u64 {
    let base = base_ttl_seconds(data_type);
    match priority {
        Priority::Critical => base.min(CRITICAL_TTL_CAP_SECS),
        Priority::Low => base * LOW_PRIORITY_TTL_FACTOR,
        Priority::Medium | Priority::High => base,
    }
}
