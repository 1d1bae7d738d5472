//! Billing period for per-night pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portbill_core::{DomainError, DomainResult};

/// Inclusive start / end of a stay, as entered on the line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Rejects a range whose end falls on a calendar day before its start.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if end.date_naive() < start.date_naive() {
            return Err(DomainError::validation(format!(
                "date range ends ({}) before it starts ({})",
                end.date_naive(),
                start.date_naive()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whole nights between the two calendar dates (times of day are ignored).
    pub fn nights(&self) -> i64 {
        (self.end.date_naive() - self.start.date_naive()).num_days()
    }
}
