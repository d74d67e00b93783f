//! PriceVault Core: daily price acquisition into a local SQLite store.
//!
//! This crate contains:
//! - Domain types (asset classes, instruments, observations, return rows)
//! - The asset catalog, loadable from TOML
//! - Provider trait with Yahoo Finance and CSV implementations
//! - Trailing 1/5/21-observation returns over adjusted close
//! - The SQLite store with idempotent upserts
//! - The pipeline that walks the catalog and isolates per-ticker failures

pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod csv_source;
pub mod domain;
pub mod pipeline;
pub mod provider;
pub mod returns;
pub mod store;
pub mod yahoo;

pub use catalog::{AssetGroup, Catalog, CatalogError};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use config::{ConfigError, PipelineConfig, ProviderConfig};
pub use csv_source::CsvProvider;
pub use domain::{AssetClass, Instrument, Observation, ReturnRow};
pub use pipeline::{
    fetch_history, validate_range, AbsentReason, FetchOutcome, Pipeline, PipelineError,
    RunSummary, TickerOutcome, TickerStatus,
};
pub use provider::{PriceProvider, ProviderError};
pub use returns::{compute_returns, pct_change, RETURN_HORIZONS};
pub use store::{PriceRecord, ReturnRecord, RowCounts, Store, StoreError, TickerSummary};
pub use yahoo::YahooProvider;

// The CLI hands the pipeline a boxed provider, and the store and breaker
// may move to another thread.
const _: () = {
    const fn boxes_as_provider<P: PriceProvider + 'static>() {}
    const fn is_send<T: Send>() {}

    boxes_as_provider::<CsvProvider>();
    boxes_as_provider::<YahooProvider>();
    is_send::<Store>();
    is_send::<CircuitBreaker>();
    is_send::<Catalog>();
    is_send::<RunSummary>();
    let _: Option<&dyn PriceProvider> = None;
};
