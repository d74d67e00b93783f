//! Observation and return rows: the two record shapes the store persists.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV observation for one symbol, as delivered by a provider.
///
/// Every numeric field is nullable: providers routinely omit single values
/// (e.g. a missing volume print) without dropping the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub adj_close: Option<f64>,
}

impl Observation {
    /// True when the provider reported nothing at all for this session.
    pub fn is_empty(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
            && self.adj_close.is_none()
    }
}

/// Trailing returns derived from adjusted close.
///
/// Values are fractions: `0.01` is a one percent gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRow {
    pub date: NaiveDate,
    pub return_1d: Option<f64>,
    pub return_5d: Option<f64>,
    pub return_21d: Option<f64>,
}
