//! Offline provider backed by one CSV file per symbol.
//!
//! Layout: `{dir}/{SYMBOL}.csv` with header
//! `date,open,high,low,close,volume,adj_close`. Empty cells are nulls.

use crate::domain::Observation;
use crate::provider::{PriceProvider, ProviderError};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<u64>,
    adj_close: Option<f64>,
}

impl From<CsvRow> for Observation {
    fn from(row: CsvRow) -> Self {
        Self {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            adj_close: row.adj_close,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

impl PriceProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, ProviderError> {
        let path = self.symbol_path(symbol);
        if !path.is_file() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| ProviderError::Other(format!("open {}: {e}", path.display())))?;

        let mut observations = Vec::new();
        for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record.map_err(|e| {
                ProviderError::ResponseFormatChanged(format!(
                    "{} row {}: {e}",
                    path.display(),
                    line + 1
                ))
            })?;
            if row.date >= start && row.date < end {
                observations.push(Observation::from(row));
            }
        }

        if observations.is_empty() {
            return Err(ProviderError::NoData {
                symbol: symbol.to_string(),
            });
        }

        Ok(observations)
    }
}
