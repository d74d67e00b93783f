//! Acquisition pipeline: walks the catalog, fetches each ticker, and writes
//! prices plus derived returns.
//!
//! Failure policy: nothing that goes wrong for one ticker stops the walk.
//! Provider faults become [`FetchOutcome::Absent`] at the fetch boundary and
//! store failures become [`TickerStatus::WriteFailed`]. The only error `run`
//! itself returns is an invalid date range, detected before any I/O.

use crate::catalog::Catalog;
use crate::domain::{Instrument, Observation};
use crate::provider::{PriceProvider, ProviderError};
use crate::returns::compute_returns;
use crate::store::{Store, StoreError};
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("invalid date range: end {end} must be after start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Why a fetch produced nothing to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    /// The provider has no sessions in the range.
    NoData,
    /// The provider does not recognise the ticker.
    UnknownSymbol,
    /// Any other provider failure (network, timeout, format, breaker).
    Fault(String),
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("no data in range"),
            Self::UnknownSymbol => f.write_str("unknown symbol"),
            Self::Fault(msg) => write!(f, "provider fault: {msg}"),
        }
    }
}

/// Result of asking the provider for one ticker's history.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Date-ordered observations inside `[start, end)`, one per date.
    Observations(Vec<Observation>),
    Absent(AbsentReason),
}

/// How one catalog entry ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerStatus {
    Stored { price_rows: usize, return_rows: usize },
    Skipped(AbsentReason),
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerOutcome {
    pub instrument: Instrument,
    pub status: TickerStatus,
}

/// Summary of a full run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<TickerOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.stored == self.total
    }

    fn record(&mut self, instrument: Instrument, status: TickerStatus) {
        self.total += 1;
        match status {
            TickerStatus::Stored { .. } => self.stored += 1,
            TickerStatus::Skipped(_) => self.skipped += 1,
            TickerStatus::WriteFailed(_) => self.failed += 1,
        }
        self.outcomes.push(TickerOutcome { instrument, status });
    }
}

/// `end` must be strictly after `start`.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), PipelineError> {
    if end <= start {
        return Err(PipelineError::InvalidRange { start, end });
    }
    Ok(())
}

/// Fetch `[start, end)` for one symbol, collapsing every provider failure
/// into [`FetchOutcome::Absent`].
///
/// The range is checked before the provider is called. Returned
/// observations are sorted by date, trimmed to the range, and hold at most
/// one entry per date (the last one the provider sent).
pub fn fetch_history(
    provider: &dyn PriceProvider,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<FetchOutcome, PipelineError> {
    validate_range(start, end)?;

    if !provider.is_available() {
        warn!(%symbol, provider = provider.name(), "provider not accepting requests");
        return Ok(FetchOutcome::Absent(AbsentReason::Fault(
            "provider unavailable".into(),
        )));
    }

    let raw = match provider.fetch(symbol, start, end) {
        Ok(raw) => raw,
        Err(ProviderError::NoData { .. }) => {
            warn!(%symbol, provider = provider.name(), "no data in range");
            return Ok(FetchOutcome::Absent(AbsentReason::NoData));
        }
        Err(ProviderError::SymbolNotFound { .. }) => {
            warn!(%symbol, provider = provider.name(), "symbol not recognised by provider");
            return Ok(FetchOutcome::Absent(AbsentReason::UnknownSymbol));
        }
        Err(e) => {
            error!(%symbol, provider = provider.name(), error = %e, "fetch failed");
            return Ok(FetchOutcome::Absent(AbsentReason::Fault(e.to_string())));
        }
    };

    let observations = normalize(raw, start, end);
    if observations.is_empty() {
        warn!(%symbol, provider = provider.name(), "no data in range");
        return Ok(FetchOutcome::Absent(AbsentReason::NoData));
    }
    Ok(FetchOutcome::Observations(observations))
}

fn normalize(mut raw: Vec<Observation>, start: NaiveDate, end: NaiveDate) -> Vec<Observation> {
    raw.retain(|o| o.date >= start && o.date < end);
    raw.sort_by_key(|o| o.date);

    let mut out: Vec<Observation> = Vec::with_capacity(raw.len());
    for obs in raw {
        match out.last_mut() {
            Some(last) if last.date == obs.date => *last = obs,
            _ => out.push(obs),
        }
    }
    out
}

/// Catalog walker owning the provider and the store.
pub struct Pipeline {
    catalog: Catalog,
    provider: Box<dyn PriceProvider>,
    store: Store,
}

impl Pipeline {
    pub fn new(catalog: Catalog, provider: Box<dyn PriceProvider>, store: Store) -> Self {
        Self {
            catalog,
            provider,
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, PipelineError> {
        fetch_history(&*self.provider, symbol, start, end)
    }

    /// Fetch and store every catalog entry, in catalog order.
    pub fn run(&mut self, start: NaiveDate, end: NaiveDate) -> Result<RunSummary, PipelineError> {
        validate_range(start, end)?;

        let instruments: Vec<Instrument> = self.catalog.instruments().collect();
        info!(
            tickers = instruments.len(),
            provider = self.provider.name(),
            %start,
            %end,
            "starting run"
        );

        let mut summary = RunSummary::default();
        for instrument in instruments {
            let status = match self.fetch_history(&instrument.symbol, start, end)? {
                FetchOutcome::Absent(reason) => TickerStatus::Skipped(reason),
                FetchOutcome::Observations(observations) => {
                    match self.persist(&instrument, &observations) {
                        Ok((price_rows, return_rows)) => {
                            info!(
                                symbol = %instrument.symbol,
                                asset_class = %instrument.asset_class,
                                price_rows,
                                return_rows,
                                "stored"
                            );
                            TickerStatus::Stored {
                                price_rows,
                                return_rows,
                            }
                        }
                        Err(e) => {
                            error!(symbol = %instrument.symbol, error = %e, "write failed");
                            TickerStatus::WriteFailed(e.to_string())
                        }
                    }
                }
            };
            summary.record(instrument, status);
        }

        info!(
            total = summary.total,
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    fn persist(
        &mut self,
        instrument: &Instrument,
        observations: &[Observation],
    ) -> Result<(usize, usize), StoreError> {
        let price_rows =
            self.store
                .upsert_prices(&instrument.symbol, instrument.asset_class, observations)?;
        let returns = compute_returns(observations);
        let return_rows =
            self.store
                .upsert_returns(&instrument.symbol, instrument.asset_class, &returns)?;
        Ok((price_rows, return_rows))
    }
}
