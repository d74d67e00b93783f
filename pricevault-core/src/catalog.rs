//! Asset catalog: the ordered list of tickers a run walks.
//!
//! The catalog is stored as a TOML file of `[[groups]]`, one per asset
//! class. Group order and ticker order are preserved: they define the order
//! in which the pipeline fetches and writes.

use crate::domain::{AssetClass, Instrument};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// One asset class and its member tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    pub asset_class: AssetClass,
    pub tickers: Vec<String>,
}

/// The complete catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub groups: Vec<AssetGroup>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("read catalog file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize catalog: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("empty ticker in asset class '{asset_class}'")]
    EmptyTicker { asset_class: AssetClass },

    #[error("ticker '{symbol}' is listed more than once")]
    DuplicateTicker { symbol: String },
}

impl Catalog {
    /// Load a catalog from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a catalog from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Serialize the catalog to TOML.
    pub fn to_toml(&self) -> Result<String, CatalogError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A catalog holding a single asset class.
    pub fn single<S: Into<String>>(
        asset_class: AssetClass,
        tickers: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            groups: vec![AssetGroup {
                asset_class,
                tickers: tickers.into_iter().map(Into::into).collect(),
            }],
        }
    }

    /// Reject blank tickers and tickers listed twice.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            for ticker in &group.tickers {
                if ticker.trim().is_empty() {
                    return Err(CatalogError::EmptyTicker {
                        asset_class: group.asset_class,
                    });
                }
                if !seen.insert(ticker.as_str()) {
                    return Err(CatalogError::DuplicateTicker {
                        symbol: ticker.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every instrument, in processing order.
    pub fn instruments(&self) -> impl Iterator<Item = Instrument> + '_ {
        self.groups.iter().flat_map(|group| {
            group
                .tickers
                .iter()
                .map(move |ticker| Instrument::new(ticker.clone(), group.asset_class))
        })
    }

    /// Asset classes in catalog order.
    pub fn asset_classes(&self) -> Vec<AssetClass> {
        self.groups.iter().map(|g| g.asset_class).collect()
    }

    /// Total number of tickers.
    pub fn ticker_count(&self) -> usize {
        self.groups.iter().map(|g| g.tickers.len()).sum()
    }

    /// The fixed multi-asset list the tool ships with.
    pub fn default_catalog() -> Self {
        let group = |asset_class, tickers: &[&str]| AssetGroup {
            asset_class,
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        };

        Self {
            groups: vec![
                group(AssetClass::Equities, &["AAPL", "MSFT", "GOOGL"]),
                group(AssetClass::Bonds, &["TIP", "IGLT", "SDEU", "JGB1X"]),
                group(AssetClass::Commodities, &["GLD", "SLV", "USO"]),
                group(AssetClass::Currencies, &["UUP", "FXE"]),
                group(AssetClass::Volatility, &["^VIX"]),
            ],
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
