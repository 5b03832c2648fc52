//! Historical bar.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar from a historical data response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    /// Bar start, formatted per the request's `formatDate`.
    pub time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wap: Option<Decimal>,
    pub count: i32,
}
