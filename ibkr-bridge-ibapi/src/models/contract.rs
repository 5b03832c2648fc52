//! Contract descriptor.

use serde::{Deserialize, Serialize};

use super::enums::SecType;

/// Instrument descriptor sent with market data, historical data and order
/// requests, and received with position and open-order messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub con_id: i64,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sec_type: Option<SecType>,
    pub last_trade_date_or_contract_month: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// "C" / "P" for options, empty otherwise.
    pub right: String,
    pub multiplier: String,
    pub exchange: String,
    pub primary_exchange: String,
    pub currency: String,
    pub local_symbol: String,
    pub trading_class: String,
    pub include_expired: bool,
}

impl Contract {
    /// Build a plain contract from symbol, security type, exchange and currency.
    pub fn new(symbol: &str, sec_type: SecType, exchange: &str, currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            sec_type: Some(sec_type),
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            ..Self::default()
        }
    }

    /// Security type as its wire string, empty when unset.
    pub fn sec_type_str(&self) -> String {
        self.sec_type
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}
