//! SQLite price store.
//!
//! Two tables keyed by `(ticker, date)`: `price_data` holds the raw
//! observations, `returns_data` the derived trailing returns. Writes are
//! `INSERT OR REPLACE`, so re-running a range replaces rows in place.
//!
//! One connection is held for the lifetime of the store. It is not meant
//! for concurrent callers.

use crate::domain::{AssetClass, Observation, ReturnRow};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Transaction};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_data (
    ticker TEXT NOT NULL,
    date DATE NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume INTEGER,
    adjusted_close REAL,
    asset_class TEXT,
    PRIMARY KEY (ticker, date)
);

CREATE TABLE IF NOT EXISTS returns_data (
    ticker TEXT NOT NULL,
    date DATE NOT NULL,
    return_1d REAL,
    return_5d REAL,
    return_21d REAL,
    asset_class TEXT,
    PRIMARY KEY (ticker, date)
);
"#;

const PRICE_COLUMNS: &[&str] = &[
    "ticker",
    "date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "adjusted_close",
    "asset_class",
];

const RETURN_COLUMNS: &[&str] = &[
    "ticker",
    "date",
    "return_1d",
    "return_5d",
    "return_21d",
    "asset_class",
];

const UPSERT_PRICE_SQL: &str = r#"
INSERT OR REPLACE INTO price_data
    (ticker, date, open, high, low, close, volume, adjusted_close, asset_class)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#;

const UPSERT_RETURN_SQL: &str = r#"
INSERT OR REPLACE INTO returns_data
    (ticker, date, return_1d, return_5d, return_21d, asset_class)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened, created, or brought to the schema.
    #[error("cannot initialise store at {path}: {reason}")]
    Init { path: String, reason: String },

    /// A row was rejected before anything in its batch was written.
    #[error("malformed row for '{ticker}': {reason}")]
    MalformedRow { ticker: String, reason: String },

    /// The batch was rolled back.
    #[error("write failed for '{ticker}': {source}")]
    Write {
        ticker: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store is closed")]
    Closed,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// A `price_data` row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
    pub adjusted_close: Option<f64>,
    pub asset_class: Option<String>,
}

/// A `returns_data` row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub return_1d: Option<f64>,
    pub return_5d: Option<f64>,
    pub return_21d: Option<f64>,
    pub asset_class: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub prices: usize,
    pub returns: usize,
}

/// Per-ticker overview for `status` output.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSummary {
    pub ticker: String,
    pub asset_class: Option<String>,
    pub price_rows: usize,
    pub return_rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub struct Store {
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the database at `path` and ensure both tables exist.
    ///
    /// Safe to call on a file left by a previous run. Fails if the file is
    /// not a SQLite database or its tables lack expected columns.
    pub fn initialize(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let init_err = |reason: String| StoreError::Init {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| init_err(format!("create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).map_err(|e| init_err(e.to_string()))?;
        ensure_schema(&conn).map_err(init_err)?;

        info!(path = %path.display(), "price store initialised");
        Ok(Self {
            conn: Some(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let init_err = |reason: String| StoreError::Init {
            path: ":memory:".into(),
            reason,
        };
        let conn = Connection::open_in_memory().map_err(|e| init_err(e.to_string()))?;
        ensure_schema(&conn).map_err(init_err)?;
        Ok(Self {
            conn: Some(conn),
            path: None,
        })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Insert or replace one price row per observation, all in one transaction.
    pub fn upsert_prices(
        &mut self,
        ticker: &str,
        asset_class: AssetClass,
        rows: &[Observation],
    ) -> Result<usize, StoreError> {
        check_ticker(ticker)?;
        let volumes = rows
            .iter()
            .map(|row| validate_price_row(ticker, row))
            .collect::<Result<Vec<_>, _>>()?;

        let written = self.in_transaction(ticker, |tx| {
            let mut stmt = tx.prepare_cached(UPSERT_PRICE_SQL)?;
            for (row, volume) in rows.iter().zip(&volumes) {
                stmt.execute(params![
                    ticker,
                    row.date,
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    volume,
                    row.adj_close,
                    asset_class.as_str(),
                ])?;
            }
            Ok(rows.len())
        })?;

        debug!(%ticker, rows = written, "upserted prices");
        Ok(written)
    }

    /// Insert or replace one returns row per entry, all in one transaction.
    pub fn upsert_returns(
        &mut self,
        ticker: &str,
        asset_class: AssetClass,
        rows: &[ReturnRow],
    ) -> Result<usize, StoreError> {
        check_ticker(ticker)?;
        for row in rows {
            check_finite(ticker, row.date, "return_1d", row.return_1d)?;
            check_finite(ticker, row.date, "return_5d", row.return_5d)?;
            check_finite(ticker, row.date, "return_21d", row.return_21d)?;
        }

        let written = self.in_transaction(ticker, |tx| {
            let mut stmt = tx.prepare_cached(UPSERT_RETURN_SQL)?;
            for row in rows {
                stmt.execute(params![
                    ticker,
                    row.date,
                    row.return_1d,
                    row.return_5d,
                    row.return_21d,
                    asset_class.as_str(),
                ])?;
            }
            Ok(rows.len())
        })?;

        debug!(%ticker, rows = written, "upserted returns");
        Ok(written)
    }

    /// Run `body` in a transaction; dropping it uncommitted rolls back.
    fn in_transaction<T>(
        &mut self,
        ticker: &str,
        body: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;
        let write_err = |source| StoreError::Write {
            ticker: ticker.to_string(),
            source,
        };

        let tx = conn.transaction().map_err(write_err)?;
        let value = body(&tx).map_err(write_err)?;
        tx.commit().map_err(write_err)?;
        Ok(value)
    }

    /// Stored prices for a ticker, ordered by date.
    pub fn prices_for(&self, ticker: &str) -> Result<Vec<PriceRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ticker, date, open, high, low, close, volume, adjusted_close, asset_class
             FROM price_data WHERE ticker = ?1 ORDER BY date",
        )?;
        let rows = stmt.query_map([ticker], |row| {
            Ok(PriceRecord {
                ticker: row.get(0)?,
                date: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
                adjusted_close: row.get(7)?,
                asset_class: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Stored returns for a ticker, ordered by date.
    pub fn returns_for(&self, ticker: &str) -> Result<Vec<ReturnRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ticker, date, return_1d, return_5d, return_21d, asset_class
             FROM returns_data WHERE ticker = ?1 ORDER BY date",
        )?;
        let rows = stmt.query_map([ticker], |row| {
            Ok(ReturnRecord {
                ticker: row.get(0)?,
                date: row.get(1)?,
                return_1d: row.get(2)?,
                return_5d: row.get(3)?,
                return_21d: row.get(4)?,
                asset_class: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn row_counts(&self, ticker: &str) -> Result<RowCounts, StoreError> {
        let conn = self.conn()?;
        let count = |table: &str| -> rusqlite::Result<usize> {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE ticker = ?1");
            conn.query_row(&sql, [ticker], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        };
        Ok(RowCounts {
            prices: count("price_data")?,
            returns: count("returns_data")?,
        })
    }

    /// One entry per ticker present in `price_data`, ordered by ticker.
    pub fn summary(&self) -> Result<Vec<TickerSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.ticker, MAX(p.asset_class), COUNT(*), MIN(p.date), MAX(p.date),
                    (SELECT COUNT(*) FROM returns_data r WHERE r.ticker = p.ticker)
             FROM price_data p
             GROUP BY p.ticker
             ORDER BY p.ticker",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TickerSummary {
                ticker: row.get(0)?,
                asset_class: row.get(1)?,
                price_rows: row.get::<_, i64>(2)? as usize,
                first_date: row.get(3)?,
                last_date: row.get(4)?,
                return_rows: row.get::<_, i64>(5)? as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            info!("price store closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(SCHEMA_SQL).map_err(|e| e.to_string())?;
    check_columns(conn, "price_data", PRICE_COLUMNS)?;
    check_columns(conn, "returns_data", RETURN_COLUMNS)?;
    Ok(())
}

/// Tables created by some other tool may share a name but not a shape.
fn check_columns(conn: &Connection, table: &str, expected: &[&str]) -> Result<(), String> {
    let columns: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .and_then(|mut stmt| {
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>();
            names
        })
        .map_err(|e| e.to_string())?;

    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|name| !columns.iter().any(|c| c == name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "table {table} is missing columns: {}",
            missing.join(", ")
        ))
    }
}

fn check_ticker(ticker: &str) -> Result<(), StoreError> {
    if ticker.trim().is_empty() {
        return Err(StoreError::MalformedRow {
            ticker: ticker.to_string(),
            reason: "ticker is empty".into(),
        });
    }
    Ok(())
}

fn check_finite(
    ticker: &str,
    date: NaiveDate,
    field: &str,
    value: Option<f64>,
) -> Result<(), StoreError> {
    match value {
        Some(v) if !v.is_finite() => Err(StoreError::MalformedRow {
            ticker: ticker.to_string(),
            reason: format!("{field} on {date} is not a finite number ({v})"),
        }),
        _ => Ok(()),
    }
}

/// Validates the numeric fields and returns the volume as a SQLite integer.
fn validate_price_row(ticker: &str, row: &Observation) -> Result<Option<i64>, StoreError> {
    check_finite(ticker, row.date, "open", row.open)?;
    check_finite(ticker, row.date, "high", row.high)?;
    check_finite(ticker, row.date, "low", row.low)?;
    check_finite(ticker, row.date, "close", row.close)?;
    check_finite(ticker, row.date, "adjusted_close", row.adj_close)?;

    row.volume
        .map(i64::try_from)
        .transpose()
        .map_err(|_| StoreError::MalformedRow {
            ticker: ticker.to_string(),
            reason: format!("volume on {} exceeds the integer column range", row.date),
        })
}
