//! Order descriptor and order state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{Action, OrderType};

/// The order fields the bridge sets when placing an order, or reads back
/// from an open-order message.
///
/// Every other order attribute is sent with its gateway default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: i64,
    pub action: Option<Action>,
    pub total_quantity: Option<Decimal>,
    pub order_type: Option<OrderType>,
    /// `None` is sent as an empty field, which the gateway reads as unset.
    pub lmt_price: Option<f64>,
    pub aux_price: Option<f64>,
    /// Time in force ("DAY", "GTC", ...). Empty means gateway default.
    pub tif: String,
    pub account: String,
    pub outside_rth: bool,
    pub transmit: bool,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            order_id: 0,
            action: None,
            total_quantity: None,
            order_type: None,
            lmt_price: None,
            aux_price: None,
            tif: String::new(),
            account: String::new(),
            outside_rth: false,
            transmit: true,
        }
    }
}
