//! End-to-end pipeline runs against stub providers and real SQLite stores.

use chrono::NaiveDate;
use pricevault_core::{
    AbsentReason, AssetClass, AssetGroup, Catalog, CsvProvider, Observation, Pipeline,
    PipelineError, PriceProvider, ProviderError, Store, TickerStatus,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn temp_db(label: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "pricevault_e2e_{label}_{}_{id}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir.join("prices.db")
}

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/csv")
}

/// 30 daily observations from 2024-01-01, adjusted close 100..=129.
fn linear_series() -> Vec<Observation> {
    (0..30)
        .map(|i| {
            let px = 100.0 + i as f64;
            Observation {
                date: date(2024, 1, 1) + chrono::Duration::days(i),
                open: Some(px - 0.5),
                high: Some(px + 1.0),
                low: Some(px - 1.0),
                close: Some(px + 0.25),
                volume: Some(1_000_000),
                adj_close: Some(px),
            }
        })
        .collect()
}

/// Serves fixed series per symbol; anything else is an unknown symbol.
struct StubProvider {
    series: HashMap<String, Vec<Observation>>,
}

impl StubProvider {
    fn with(symbol: &str, rows: Vec<Observation>) -> Self {
        let mut series = HashMap::new();
        series.insert(symbol.to_string(), rows);
        Self { series }
    }
}

impl PriceProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, ProviderError> {
        let rows = self
            .series
            .get(symbol)
            .ok_or_else(|| ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        Ok(rows
            .iter()
            .filter(|o| o.date >= start && o.date < end)
            .cloned()
            .collect())
    }
}

#[test]
fn linear_series_stores_prices_and_returns() {
    let catalog = Catalog::single(AssetClass::Equities, ["AAA"]);
    let provider = StubProvider::with("AAA", linear_series());
    let mut pipeline = Pipeline::new(catalog, Box::new(provider), Store::open_in_memory().unwrap());

    let summary = pipeline.run(date(2024, 1, 1), date(2024, 2, 1)).unwrap();
    assert!(summary.all_succeeded());

    let store = pipeline.store();
    let prices = store.prices_for("AAA").unwrap();
    let returns = store.returns_for("AAA").unwrap();
    assert_eq!(prices.len(), 30);
    assert_eq!(returns.len(), 30);
    assert!(prices
        .iter()
        .all(|p| p.asset_class.as_deref() == Some("equities")));

    for (i, row) in returns.iter().enumerate() {
        assert_eq!(row.return_1d.is_some(), i >= 1, "return_1d at {i}");
        assert_eq!(row.return_5d.is_some(), i >= 5, "return_5d at {i}");
        assert_eq!(row.return_21d.is_some(), i >= 21, "return_21d at {i}");
    }

    let r1 = returns[1].return_1d.unwrap();
    assert!((r1 - 0.01).abs() < 1e-12, "return_1d[1] = {r1}");

    let r21 = returns[29].return_21d.unwrap();
    assert!((r21 - (129.0 - 108.0) / 108.0).abs() < 1e-12);
}

#[test]
fn unknown_symbol_is_skipped_without_rows() {
    let catalog = Catalog {
        groups: vec![
            AssetGroup {
                asset_class: AssetClass::Equities,
                tickers: vec!["ZZZ".into(), "AAA".into()],
            },
        ],
    };
    let provider = StubProvider::with("AAA", linear_series());
    let mut pipeline = Pipeline::new(catalog, Box::new(provider), Store::open_in_memory().unwrap());

    let summary = pipeline.run(date(2024, 1, 1), date(2024, 2, 1)).unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.stored, 1);
    assert_eq!(
        summary.outcomes[0].status,
        TickerStatus::Skipped(AbsentReason::UnknownSymbol)
    );

    let counts = pipeline.store().row_counts("ZZZ").unwrap();
    assert_eq!(counts.prices, 0);
    assert_eq!(counts.returns, 0);
    assert_eq!(pipeline.store().row_counts("AAA").unwrap().prices, 30);
}

#[test]
fn running_twice_matches_running_once() {
    let path = temp_db("twice");
    let start = date(2024, 1, 1);
    let end = date(2024, 2, 1);

    let run = |path: &PathBuf| {
        let store = Store::initialize(path).unwrap();
        let mut pipeline = Pipeline::new(
            Catalog::single(AssetClass::Equities, ["AAA"]),
            Box::new(StubProvider::with("AAA", linear_series())),
            store,
        );
        pipeline.run(start, end).unwrap();
        let mut store = pipeline.into_store();
        let snapshot = (
            store.prices_for("AAA").unwrap(),
            store.returns_for("AAA").unwrap(),
        );
        store.close().unwrap();
        snapshot
    };

    let first = run(&path);
    let second = run(&path);
    assert_eq!(first, second);
    assert_eq!(second.0.len(), 30);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn shorter_window_rewrites_returns_with_more_nulls() {
    let mut pipeline = Pipeline::new(
        Catalog::single(AssetClass::Equities, ["AAA"]),
        Box::new(StubProvider::with("AAA", linear_series())),
        Store::open_in_memory().unwrap(),
    );

    pipeline.run(date(2024, 1, 1), date(2024, 2, 1)).unwrap();
    let full = pipeline.store().returns_for("AAA").unwrap();
    assert!(full[25].return_5d.is_some());

    // Re-fetch only the last five days: the overlapping rows lose their history.
    pipeline.run(date(2024, 1, 26), date(2024, 2, 1)).unwrap();
    let partial = pipeline.store().returns_for("AAA").unwrap();
    assert_eq!(partial.len(), 30);
    assert_eq!(partial[25].date, date(2024, 1, 26));
    assert!(partial[25].return_1d.is_none());
    assert!(partial[25].return_5d.is_none());
    assert!(partial[29].return_5d.is_none());
    assert_eq!(partial[10], full[10]);
}

#[test]
fn end_date_session_is_excluded() {
    let mut pipeline = Pipeline::new(
        Catalog::single(AssetClass::Equities, ["AAA"]),
        Box::new(StubProvider::with("AAA", linear_series())),
        Store::open_in_memory().unwrap(),
    );
    pipeline.run(date(2024, 1, 1), date(2024, 1, 11)).unwrap();

    let prices = pipeline.store().prices_for("AAA").unwrap();
    assert_eq!(prices.len(), 10);
    assert_eq!(prices.last().unwrap().date, date(2024, 1, 10));
}

#[test]
fn invalid_range_fails_before_any_write() {
    let mut pipeline = Pipeline::new(
        Catalog::single(AssetClass::Equities, ["AAA"]),
        Box::new(StubProvider::with("AAA", linear_series())),
        Store::open_in_memory().unwrap(),
    );

    let err = pipeline
        .run(date(2024, 2, 1), date(2024, 1, 1))
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::InvalidRange {
            start: date(2024, 2, 1),
            end: date(2024, 1, 1)
        }
    );
    assert!(pipeline.store().summary().unwrap().is_empty());
}

#[test]
fn csv_fixture_runs_through_file_store() {
    let path = temp_db("csv");
    let catalog = Catalog {
        groups: vec![
            AssetGroup {
                asset_class: AssetClass::EquityEtfs,
                tickers: vec!["AAA".into()],
            },
            AssetGroup {
                asset_class: AssetClass::Bonds,
                tickers: vec!["MISSING".into()],
            },
        ],
    };
    let mut pipeline = Pipeline::new(
        catalog,
        Box::new(CsvProvider::new(fixture_dir())),
        Store::initialize(&path).unwrap(),
    );

    let summary = pipeline.run(date(2024, 1, 1), date(2024, 2, 1)).unwrap();
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.skipped, 1);

    let mut store = pipeline.into_store();
    let summary_rows = store.summary().unwrap();
    assert_eq!(summary_rows.len(), 1);
    assert_eq!(summary_rows[0].ticker, "AAA");
    assert_eq!(summary_rows[0].asset_class.as_deref(), Some("equity_etfs"));
    assert_eq!(summary_rows[0].price_rows, 30);
    assert_eq!(summary_rows[0].return_rows, 30);
    assert_eq!(summary_rows[0].first_date, Some(date(2024, 1, 1)));
    assert_eq!(summary_rows[0].last_date, Some(date(2024, 1, 30)));

    // Raw close in the fixture sits 0.25 above adjusted close; returns must
    // follow the adjusted column.
    let returns = store.returns_for("AAA").unwrap();
    assert!((returns[1].return_1d.unwrap() - 0.01).abs() < 1e-12);

    store.close().unwrap();
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
