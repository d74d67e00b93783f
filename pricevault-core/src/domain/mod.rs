//! Domain types shared by every layer.

pub mod instrument;
pub mod observation;

pub use instrument::{AssetClass, Instrument, UnknownAssetClass};
pub use observation::{Observation, ReturnRow};
