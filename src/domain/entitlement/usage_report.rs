//! Usage reports for limited features.
//!
//! Reports never fail on entitlement: a missing feature is reported as
//! "at limit with max 0", an unlimited one as "never at limit".

use serde::{Deserialize, Serialize};

use super::FeatureEntitlement;

/// Bytes per megabyte; plan storage limits are stored in MB.
pub const BYTES_PER_MB: i64 = 1_048_576;

/// Current consumption of one feature against its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitUsage {
    pub current: i64,

    /// `None` when unlimited.
    pub max: Option<i64>,

    /// `min(100, round(current / max * 100))`; absent when unlimited or
    /// not entitled.
    pub percent_used: Option<u32>,
    pub at_limit: bool,
}

impl LimitUsage {
    /// Builds a report from the resolved feature and the counter value.
    pub fn compute(current: i64, feature: Option<&FeatureEntitlement>) -> Self {
        match feature {
            Some(f) if f.enabled => match f.limit {
                None => Self {
                    current,
                    max: None,
                    percent_used: None,
                    at_limit: false,
                },
                Some(max) => Self {
                    current,
                    max: Some(max),
                    percent_used: Some(percent_of(current, max)),
                    at_limit: current >= max,
                },
            },
            _ => Self::not_entitled(current),
        }
    }

    pub fn not_entitled(current: i64) -> Self {
        Self {
            current,
            max: Some(0),
            percent_used: None,
            at_limit: true,
        }
    }
}

fn percent_of(current: i64, max: i64) -> u32 {
    if max <= 0 {
        return 100;
    }
    let pct = (current as f64 / max as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u32
}

/// Storage usage in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub current_bytes: i64,
    pub max_bytes: Option<i64>,
    pub percent_used: Option<u32>,
    pub at_limit: bool,
}

impl StorageUsage {
    /// Converts the MB-denominated plan limit to bytes before comparing.
    pub fn compute(current_bytes: i64, feature: Option<&FeatureEntitlement>) -> Self {
        let in_bytes = feature.map(|f| FeatureEntitlement {
            enabled: f.enabled,
            limit: f.limit.map(|mb| mb.saturating_mul(BYTES_PER_MB)),
        });
        let usage = LimitUsage::compute(current_bytes, in_bytes.as_ref());
        Self {
            current_bytes: usage.current,
            max_bytes: usage.max,
            percent_used: usage.percent_used,
            at_limit: usage.at_limit,
        }
    }
}

/// Seat (tenant member) usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatUsage {
    pub current_seats: i64,
    pub max_seats: Option<i64>,
    pub percent_used: Option<u32>,
    pub at_limit: bool,
}

impl From<LimitUsage> for SeatUsage {
    fn from(usage: LimitUsage) -> Self {
        Self {
            current_seats: usage.current,
            max_seats: usage.max,
            percent_used: usage.percent_used,
            at_limit: usage.at_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(limit: i64) -> FeatureEntitlement {
        FeatureEntitlement {
            enabled: true,
            limit: Some(limit),
        }
    }

    #[test]
    fn not_entitled_reports_max_zero_at_limit() {
        let usage = LimitUsage::compute(2, None);
        assert_eq!(usage.max, Some(0));
        assert!(usage.at_limit);

        let disabled = FeatureEntitlement {
            enabled: false,
            limit: Some(10),
        };
        assert!(LimitUsage::compute(0, Some(&disabled)).at_limit);
    }

    #[test]
    fn unlimited_is_never_at_limit() {
        let usage = LimitUsage::compute(1_000_000, Some(&FeatureEntitlement::unlimited()));
        assert_eq!(usage.max, None);
        assert!(!usage.at_limit);
        assert_eq!(usage.percent_used, None);
    }

    #[test]
    fn percent_rounds_and_caps_at_100() {
        assert_eq!(LimitUsage::compute(1, Some(&limited(3))).percent_used, Some(33));
        assert_eq!(LimitUsage::compute(2, Some(&limited(3))).percent_used, Some(67));
        assert_eq!(LimitUsage::compute(50, Some(&limited(10))).percent_used, Some(100));
    }

    #[test]
    fn at_limit_when_current_reaches_max() {
        assert!(!LimitUsage::compute(4, Some(&limited(5))).at_limit);
        assert!(LimitUsage::compute(5, Some(&limited(5))).at_limit);
    }

    #[test]
    fn storage_limit_is_converted_from_megabytes() {
        let usage = StorageUsage::compute(50 * BYTES_PER_MB, Some(&limited(100)));
        assert_eq!(usage.max_bytes, Some(100 * BYTES_PER_MB));
        assert_eq!(usage.percent_used, Some(50));
    }

    #[test]
    fn seat_usage_for_no_subscription_matches_contract() {
        let seats: SeatUsage = LimitUsage::compute(2, None).into();
        assert_eq!(seats.current_seats, 2);
        assert_eq!(seats.max_seats, Some(0));
        assert!(seats.at_limit);
    }
}
