//! Usage limits supplied by callers.

use serde::{Deserialize, Serialize};

/// Sentinel used on the wire for "no limit".
pub const UNLIMITED_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLimit {
    Unlimited,
    Limited(i64),
}

impl UsageLimit {
    /// Negative values (the `-1` sentinel) mean unlimited.
    pub fn from_raw(limit: i64) -> Self {
        if limit < 0 {
            UsageLimit::Unlimited
        } else {
            UsageLimit::Limited(limit)
        }
    }

    /// Infinite, NaN and negative values mean unlimited; finite values are
    /// truncated toward zero.
    pub fn from_f64(limit: f64) -> Self {
        if !limit.is_finite() || limit < 0.0 {
            UsageLimit::Unlimited
        } else {
            UsageLimit::Limited(limit as i64)
        }
    }

    /// Wire form, `-1` for unlimited.
    pub fn as_raw(&self) -> i64 {
        match self {
            UsageLimit::Unlimited => UNLIMITED_SENTINEL,
            UsageLimit::Limited(limit) => *limit,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, UsageLimit::Unlimited)
    }

    /// Share of the limit consumed, `0` when unlimited.
    pub fn percent_used(&self, current: i64) -> u32 {
        match self {
            UsageLimit::Unlimited => 0,
            UsageLimit::Limited(limit) if *limit <= 0 => 100,
            UsageLimit::Limited(limit) => {
                let pct = (current as f64 / *limit as f64 * 100.0).round();
                pct.clamp(0.0, 100.0) as u32
            }
        }
    }
}

impl From<Option<i64>> for UsageLimit {
    fn from(limit: Option<i64>) -> Self {
        limit.map_or(UsageLimit::Unlimited, UsageLimit::from_raw)
    }
}
