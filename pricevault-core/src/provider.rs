//! Price provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over data sources (Yahoo Finance, local
//! CSV files) so the pipeline can swap implementations and tests can stub them.

use crate::domain::Observation;
use chrono::NaiveDate;
use thiserror::Error;

/// Everything that can go wrong while asking a provider for history.
///
/// None of these cross the pipeline's fetch boundary: the pipeline collapses
/// them into an absent outcome and moves on to the next ticker.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no data for {symbol} in the requested range")]
    NoData { symbol: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

/// Trait for daily OHLCV sources.
///
/// `fetch` covers the half-open range `[start, end)`: the session dated `end`
/// is never part of the answer. Implementations may return rows out of order;
/// the pipeline sorts and trims before anything is stored.
pub trait PriceProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily observations for a symbol.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, ProviderError>;

    /// Whether the provider currently accepts requests (not rate-limited, not blocked).
    fn is_available(&self) -> bool {
        true
    }
}
