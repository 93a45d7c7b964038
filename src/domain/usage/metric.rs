//! Usage metric catalog entries and aggregation strategies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a new delta combines with the value already recorded for a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    /// Running total, clamped at zero.
    #[default]
    Sum,
    /// High-water mark.
    Max,
    /// Latest reported value wins.
    Last,
}

impl AggregationType {
    /// Combines `delta` with the current period value. Results are never
    /// negative.
    pub fn apply(&self, current: i64, delta: i64) -> i64 {
        let value = match self {
            AggregationType::Sum => current.saturating_add(delta),
            AggregationType::Max => current.max(delta),
            AggregationType::Last => delta,
        };
        value.max(0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Max => "max",
            AggregationType::Last => "last",
        }
    }

    /// Unrecognised strings fall back to sum.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "max" => AggregationType::Max,
            "last" => AggregationType::Last,
            _ => AggregationType::Sum,
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetric {
    pub key: String,
    pub display_name: String,
    pub unit: String,
    #[serde(default)]
    pub aggregation: AggregationType,
}

impl UsageMetric {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        unit: impl Into<String>,
        aggregation: AggregationType,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            unit: unit.into(),
            aggregation,
        }
    }
}
