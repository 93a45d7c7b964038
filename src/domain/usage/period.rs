//! Metering periods.
//!
//! The current period is the calendar month in UTC, independent of any
//! subscription's billing anchor date. Callers may pass explicit bounds.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

/// Half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl UsagePeriod {
    /// # Errors
    ///
    /// `InvalidFormat` when `end` is not after `start`.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::invalid_format(
                "period_end",
                "period end must be after period start",
            ));
        }
        Ok(Self { start, end })
    }

    /// Calendar month containing `at`.
    pub fn month_containing(at: Timestamp) -> Self {
        Self {
            start: at.start_of_month(),
            end: at.start_of_next_month(),
        }
    }

    /// Calendar month containing now.
    pub fn current_month() -> Self {
        Self::month_containing(Timestamp::now())
    }

    /// Uses whichever bounds are given; the missing ones default to the
    /// current calendar month.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` when the resulting window is empty.
    pub fn resolve(
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let month = Self::month_containing(now);
        Self::new(start.unwrap_or(month.start), end.unwrap_or(month.end))
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }
}
