//! Records the bridge keeps about the account and its orders.
//!
//! All of them serialize camelCase; they are what the tool results embed.

use ibkr_bridge_ibapi::{Bar, Contract, Order};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn decimal_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// ============================================================================
// Account
// ============================================================================

/// One holding from a position snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub account: String,
    pub symbol: String,
    pub sec_type: String,
    pub exchange: String,
    pub position: f64,
    pub avg_cost: f64,
    /// `position * avg_cost`
    pub market_value: f64,
}

impl Position {
    pub fn from_wire(account: &str, contract: &Contract, position: Decimal, avg_cost: f64) -> Self {
        let position = decimal_f64(position);
        Self {
            account: account.to_string(),
            symbol: contract.symbol.clone(),
            sec_type: contract.sec_type_str(),
            exchange: contract.exchange.clone(),
            position,
            avg_cost,
            market_value: position * avg_cost,
        }
    }

    /// Snapshot map key, `SYMBOL-SECTYPE-EXCHANGE`.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.symbol, self.sec_type, self.exchange)
    }
}

/// One account summary tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountField {
    #[serde(skip)]
    pub tag: String,
    pub value: String,
    pub currency: String,
}

impl AccountField {
    /// Numeric value, 0 when the gateway sent text.
    pub fn as_f64(&self) -> f64 {
        self.value.parse().unwrap_or(0.0)
    }
}

// ============================================================================
// Orders
// ============================================================================

/// What the bridge knows about one order, merged from submissions,
/// open-order and order-status events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sec_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_price: Option<f64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fill_price: Option<f64>,
}

impl OrderRecord {
    pub fn new(order_id: i64) -> Self {
        Self {
            order_id,
            symbol: None,
            sec_type: None,
            exchange: None,
            action: None,
            order_type: None,
            total_quantity: None,
            lmt_price: None,
            aux_price: None,
            status: "Unknown".to_string(),
            filled: None,
            remaining: None,
            avg_fill_price: None,
            last_fill_price: None,
        }
    }

    /// Descriptor fields of an order as submitted or as reported open.
    pub fn from_wire(order_id: i64, contract: &Contract, order: &Order) -> Self {
        Self {
            symbol: Some(contract.symbol.clone()),
            sec_type: Some(contract.sec_type_str()),
            exchange: Some(contract.exchange.clone()),
            action: order.action.as_ref().map(|a| a.to_string()),
            order_type: order.order_type.as_ref().map(|t| t.to_string()),
            total_quantity: order.total_quantity.map(decimal_f64),
            lmt_price: order.lmt_price,
            aux_price: order.aux_price,
            ..Self::new(order_id)
        }
    }

    /// Take the descriptor fields of `other`, keeping the status fields
    /// this record already has.
    pub fn merge_descriptor(&mut self, other: OrderRecord) {
        self.symbol = other.symbol.or(self.symbol.take());
        self.sec_type = other.sec_type.or(self.sec_type.take());
        self.exchange = other.exchange.or(self.exchange.take());
        self.action = other.action.or(self.action.take());
        self.order_type = other.order_type.or(self.order_type.take());
        self.total_quantity = other.total_quantity.or(self.total_quantity);
        self.lmt_price = other.lmt_price.or(self.lmt_price);
        self.aux_price = other.aux_price.or(self.aux_price);
    }

    pub fn apply_status(&mut self, update: &OrderStatusUpdate) {
        self.status = update.status.clone();
        self.filled = Some(update.filled);
        self.remaining = Some(update.remaining);
        self.avg_fill_price = Some(update.avg_fill_price);
        self.last_fill_price = Some(update.last_fill_price);
    }
}

/// The parts of an order-status event the bridge records.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusUpdate {
    pub order_id: i64,
    pub status: String,
    pub filled: f64,
    pub remaining: f64,
    pub avg_fill_price: f64,
    pub last_fill_price: f64,
}

impl OrderStatusUpdate {
    pub fn from_wire(
        order_id: i64,
        status: &str,
        filled: Decimal,
        remaining: Decimal,
        avg_fill_price: f64,
        last_fill_price: f64,
    ) -> Self {
        Self {
            order_id,
            status: status.to_string(),
            filled: decimal_f64(filled),
            remaining: decimal_f64(remaining),
            avg_fill_price,
            last_fill_price,
        }
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// Historical bar as returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalBar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<&Bar> for HistoricalBar {
    fn from(bar: &Bar) -> Self {
        Self {
            date: bar.time.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume.map(decimal_f64).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibkr_bridge_ibapi::{Action, OrderType, SecType};

    #[test]
    fn position_key_and_market_value() {
        let contract = Contract::new("AAPL", SecType::Stock, "NASDAQ", "USD");
        let p = Position::from_wire("DU123", &contract, Decimal::from(10), 150.5);
        assert_eq!(p.key(), "AAPL-STK-NASDAQ");
        assert_eq!(p.market_value, 1505.0);

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["secType"], "STK");
        assert_eq!(json["avgCost"], 150.5);
        assert_eq!(json["marketValue"], 1505.0);
    }

    #[test]
    fn status_update_keeps_descriptor() {
        let contract = Contract::new("MSFT", SecType::Stock, "SMART", "USD");
        let order = Order {
            action: Some(Action::Buy),
            order_type: Some(OrderType::Limit),
            total_quantity: Some(Decimal::from(5)),
            lmt_price: Some(300.0),
            ..Order::default()
        };
        let mut record = OrderRecord::from_wire(7, &contract, &order);
        record.apply_status(&OrderStatusUpdate::from_wire(
            7,
            "Filled",
            Decimal::from(5),
            Decimal::ZERO,
            299.5,
            299.5,
        ));

        assert_eq!(record.symbol.as_deref(), Some("MSFT"));
        assert_eq!(record.lmt_price, Some(300.0));
        assert_eq!(record.status, "Filled");
        assert_eq!(record.filled, Some(5.0));
    }

    #[test]
    fn open_order_merge_keeps_status() {
        let mut record = OrderRecord::new(3);
        record.apply_status(&OrderStatusUpdate::from_wire(
            3,
            "Submitted",
            Decimal::ZERO,
            Decimal::from(1),
            0.0,
            0.0,
        ));
        let contract = Contract::new("SPY", SecType::Stock, "SMART", "USD");
        let order = Order {
            action: Some(Action::Sell),
            order_type: Some(OrderType::Market),
            ..Order::default()
        };
        record.merge_descriptor(OrderRecord::from_wire(3, &contract, &order));
        assert_eq!(record.status, "Submitted");
        assert_eq!(record.action.as_deref(), Some("SELL"));
        assert_eq!(record.lmt_price, None);
    }

    #[test]
    fn market_order_record_has_no_limit_price() {
        let json = serde_json::to_value(OrderRecord::new(1)).unwrap();
        assert!(json.get("lmtPrice").is_none());
        assert_eq!(json["status"], "Unknown");
    }
}
