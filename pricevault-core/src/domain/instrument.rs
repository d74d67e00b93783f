use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coarse asset category attached to every persisted row.
///
/// The canonical label (see [`AssetClass::as_str`]) is the exact string
/// written to the `asset_class` column of both tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equities,
    EquityEtfs,
    Bonds,
    Commodities,
    Currencies,
    Volatility,
}

impl AssetClass {
    pub const ALL: [Self; 6] = [
        Self::Equities,
        Self::EquityEtfs,
        Self::Bonds,
        Self::Commodities,
        Self::Currencies,
        Self::Volatility,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equities => "equities",
            Self::EquityEtfs => "equity_etfs",
            Self::Bonds => "bonds",
            Self::Commodities => "commodities",
            Self::Currencies => "currencies",
            Self::Volatility => "volatility",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = UnknownAssetClass;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|class| class.as_str() == normalized)
            .ok_or_else(|| UnknownAssetClass {
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown asset class '{value}', expected one of equities, equity_etfs, bonds, \
     commodities, currencies, volatility"
)]
pub struct UnknownAssetClass {
    pub value: String,
}

/// A ticker together with the asset class it is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub asset_class: AssetClass,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
        }
    }
}
