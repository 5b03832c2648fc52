//! The tool operations callers invoke.
//!
//! Every operation returns a JSON object. Failures come back as
//! `{"error": "..."}`, never as a Rust error, so the HTTP layer and any other
//! caller only need one result shape. Results of operations that wait on the
//! gateway carry a `complete` flag that is false when the wait timed out and
//! the payload is partial.

use std::collections::BTreeMap;

use ibkr_bridge_ibapi::{Action, Contract, HistoricalDataRequest, Order, OrderType, SecType};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::config::{BridgeConfig, ToolTimeouts};
use crate::correlator::{Buffer, Collected, OPEN_ORDERS_STREAM, POSITIONS_STREAM};
use crate::errors::{BridgeError, Result};
use crate::models::{AccountField, OrderRecord, Position};
use crate::supervisor::ConnectionSupervisor;

pub const DEFAULT_SUMMARY_TAGS: &str =
    "TotalCashValue,NetLiquidation,GrossPositionValue,AvailableFunds,BuyingPower";
const PORTFOLIO_SUMMARY_TAGS: &str = "TotalCashValue,NetLiquidation,GrossPositionValue,AvailableFunds";
const CURRENCY: &str = "USD";

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

fn error_result(err: &BridgeError) -> Value {
    json!({ "error": err.to_string() })
}

fn flatten(result: Result<Value>) -> Value {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool operation failed");
        error_result(&e)
    })
}

/// Attach gateway errors tagged with the request to `result`, if any.
fn with_gateway_errors(mut result: Value, errors: Vec<String>) -> Value {
    if !errors.is_empty() {
        result["gateway_errors"] = json!(errors);
    }
    result
}

fn summary_json(fields: &BTreeMap<String, AccountField>) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(tag, f)| (tag.clone(), json!({ "value": f.value, "currency": f.currency })))
        .collect();
    Value::Object(map)
}

fn orders_json(orders: &BTreeMap<i64, OrderRecord>) -> Value {
    let map: Map<String, Value> = orders
        .iter()
        .map(|(id, r)| (id.to_string(), json!(r)))
        .collect();
    Value::Object(map)
}

fn contract_for(symbol: &str, exchange: &str, sec_type: &str) -> Contract {
    let sec_type = sec_type.parse::<SecType>().unwrap_or(SecType::Stock);
    Contract::new(&symbol.to_uppercase(), sec_type, exchange, CURRENCY)
}

// ============================================================================
// Parameters
// ============================================================================

fn default_exchange() -> String {
    "SMART".into()
}

fn default_sec_type() -> String {
    "STK".into()
}

fn default_order_type() -> String {
    "MKT".into()
}

fn default_duration() -> String {
    "1 D".into()
}

fn default_bar_size() -> String {
    "1 min".into()
}

fn default_what_to_show() -> String {
    "TRADES".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataParams {
    pub symbol: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_sec_type")]
    pub sec_type: String,
}

impl MarketDataParams {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: default_exchange(),
            sec_type: default_sec_type(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderParams {
    pub symbol: String,
    pub action: String,
    pub quantity: f64,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    pub limit_price: Option<f64>,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_sec_type")]
    pub sec_type: String,
}

impl PlaceOrderParams {
    pub fn market(symbol: &str, action: &str, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: action.to_string(),
            quantity,
            order_type: default_order_type(),
            limit_price: None,
            exchange: default_exchange(),
            sec_type: default_sec_type(),
        }
    }

    pub fn limit(symbol: &str, action: &str, quantity: f64, limit_price: f64) -> Self {
        Self {
            order_type: "LMT".into(),
            limit_price: Some(limit_price),
            ..Self::market(symbol, action, quantity)
        }
    }
}

/// A validated order ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
struct ValidOrder {
    symbol: String,
    action: Action,
    quantity: Decimal,
    order_type: OrderType,
    limit_price: Option<f64>,
    exchange: String,
    sec_type: String,
}

impl PlaceOrderParams {
    fn validate(&self) -> Result<ValidOrder> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(BridgeError::InvalidArgument("symbol is required".into()));
        }
        let action = match self.action.trim().to_uppercase().as_str() {
            "BUY" => Action::Buy,
            "SELL" => Action::Sell,
            other => {
                return Err(BridgeError::InvalidArgument(format!(
                    "action must be BUY or SELL, got '{other}'"
                )))
            }
        };
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(BridgeError::InvalidArgument("quantity must be greater than 0".into()));
        }
        let quantity = Decimal::from_f64(self.quantity)
            .ok_or_else(|| BridgeError::InvalidArgument("quantity is not representable".into()))?;

        let order_type = self
            .order_type
            .trim()
            .to_uppercase()
            .parse::<OrderType>()
            .unwrap_or(OrderType::Market);
        let limit_price = if order_type.requires_limit_price() {
            match self.limit_price {
                Some(p) if p.is_finite() && p > 0.0 => Some(p),
                Some(_) => {
                    return Err(BridgeError::InvalidArgument("limit_price must be greater than 0".into()))
                }
                None => {
                    return Err(BridgeError::InvalidArgument(format!(
                        "limit_price is required for {order_type} orders"
                    )))
                }
            }
        } else {
            None
        };

        Ok(ValidOrder {
            symbol,
            action,
            quantity,
            order_type,
            limit_price,
            exchange: self.exchange.clone(),
            sec_type: self.sec_type.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalParams {
    pub symbol: String,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_bar_size")]
    pub bar_size: String,
    #[serde(default = "default_what_to_show")]
    pub what_to_show: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_sec_type")]
    pub sec_type: String,
}

impl HistoricalParams {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            duration: default_duration(),
            bar_size: default_bar_size(),
            what_to_show: default_what_to_show(),
            exchange: default_exchange(),
            sec_type: default_sec_type(),
        }
    }
}

// ============================================================================
// ToolFacade
// ============================================================================

pub struct ToolFacade {
    supervisor: ConnectionSupervisor,
    timeouts: ToolTimeouts,
    /// Positions carry no request id, so only one snapshot may be in flight.
    positions_gate: Mutex<()>,
    /// Same for the open-order stream.
    open_orders_gate: Mutex<()>,
}

impl ToolFacade {
    pub fn new(config: BridgeConfig) -> Self {
        let timeouts = config.timeouts.clone();
        Self {
            supervisor: ConnectionSupervisor::new(config),
            timeouts,
            positions_gate: Mutex::new(()),
            open_orders_gate: Mutex::new(()),
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    // ========================================================================
    // Connection
    // ========================================================================

    pub async fn connect_to_ibkr(&self) -> Value {
        match self.supervisor.acquire().await {
            Ok(conn) => json!({
                "success": true,
                "connected": conn.is_connected(),
                "endpoint": conn.label(),
                "next_order_id": conn.next_order_id(),
                "managed_accounts": conn.store().managed_accounts(),
                "message": "Successfully connected to IBKR",
            }),
            Err(e) => json!({
                "success": false,
                "error": e.to_string(),
                "message": "Failed to connect to IBKR",
            }),
        }
    }

    /// Never connects.
    pub fn get_connection_status(&self) -> Value {
        match self.supervisor.current() {
            None => json!({
                "connected": false,
                "message": "No connection attempted",
                "recommendation": "Make sure TWS or IB Gateway is running",
            }),
            Some(conn) => json!({
                "connected": conn.is_connected(),
                "endpoint": conn.label(),
                "next_order_id": conn.next_order_id(),
                "positions_count": conn.store().positions().len(),
                "account_info_fields": conn.store().account_info().len(),
                "timestamp": timestamp(),
            }),
        }
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub async fn get_positions(&self) -> Value {
        flatten(self.positions().await.map(|(positions, complete)| {
            json!({
                "positions": positions,
                "total_positions": positions.len(),
                "complete": complete,
                "timestamp": timestamp(),
            })
        }))
    }

    async fn positions(&self) -> Result<(BTreeMap<String, Position>, bool)> {
        let conn = self.supervisor.acquire().await?;
        let _gate = self.positions_gate.lock().await;

        let ticket = conn
            .store()
            .correlator()
            .register(POSITIONS_STREAM, Buffer::positions())?;
        if let Err(e) = conn.client().await?.req_positions().await {
            conn.store().correlator().release(ticket);
            return Err(e.into());
        }
        let collected = conn
            .store()
            .correlator()
            .wait(ticket, self.timeouts.positions)
            .await;

        if let Err(e) = conn.client().await?.cancel_positions().await {
            tracing::debug!(error = %e, "cancel positions failed");
        }

        let positions = collected.data.into_positions();
        conn.store().replace_positions(positions.clone());
        Ok((positions, collected.complete))
    }

    pub async fn get_account_summary(&self, tags: Option<&str>) -> Value {
        let tags = tags.filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_SUMMARY_TAGS);
        flatten(self.account_summary(tags).await.map(|collected| {
            let complete = collected.complete;
            let errors = collected.errors;
            let fields = collected.data.into_account_summary();
            with_gateway_errors(
                json!({
                    "account_summary": summary_json(&fields),
                    "complete": complete,
                    "timestamp": timestamp(),
                }),
                errors,
            )
        }))
    }

    async fn account_summary(&self, tags: &str) -> Result<Collected> {
        let conn = self.supervisor.acquire().await?;
        let correlator = conn.store().correlator();

        let ticket = correlator.register_next(Buffer::account_summary())?;
        let req_id = ticket.req_id();
        if let Err(e) = conn.client().await?.req_account_summary(req_id, "All", tags).await {
            correlator.release(ticket);
            return Err(e.into());
        }
        let collected = correlator.wait(ticket, self.timeouts.account_summary).await;

        if let Err(e) = conn.client().await?.cancel_account_summary(req_id).await {
            tracing::debug!(req_id, error = %e, "cancel account summary failed");
        }

        let fields = match &collected.data {
            Buffer::AccountSummary(fields) => fields.clone(),
            _ => BTreeMap::new(),
        };
        conn.store().replace_account_info(fields);
        Ok(collected)
    }

    pub async fn calculate_portfolio_metrics(&self) -> Value {
        flatten(self.portfolio_metrics().await)
    }

    async fn portfolio_metrics(&self) -> Result<Value> {
        let (positions, positions_complete) = self.positions().await?;
        let summary = self.account_summary(PORTFOLIO_SUMMARY_TAGS).await?;
        let summary_complete = summary.complete;
        let fields = summary.data.into_account_summary();

        let tag_value = |tag: &str| fields.get(tag).map(AccountField::as_f64).unwrap_or(0.0);
        let total_market_value: f64 = positions.values().map(|p| p.market_value).sum();

        Ok(json!({
            "total_positions": positions.len(),
            "total_market_value": total_market_value,
            "cash_balance": tag_value("TotalCashValue"),
            "net_liquidation_value": tag_value("NetLiquidation"),
            "buying_power": tag_value("AvailableFunds"),
            "positions": positions,
            "account_summary": summary_json(&fields),
            "complete": positions_complete && summary_complete,
            "timestamp": timestamp(),
        }))
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    pub async fn get_market_data(&self, params: &MarketDataParams) -> Value {
        flatten(self.market_data(params).await)
    }

    async fn market_data(&self, params: &MarketDataParams) -> Result<Value> {
        if params.symbol.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("symbol is required".into()));
        }
        let conn = self.supervisor.acquire().await?;
        let correlator = conn.store().correlator();
        let contract = contract_for(params.symbol.trim(), &params.exchange, &params.sec_type);

        let ticket = correlator.register_next(Buffer::ticks())?;
        let req_id = ticket.req_id();
        if let Err(e) = conn.client().await?.req_mkt_data(req_id, &contract, "", false).await {
            correlator.release(ticket);
            return Err(e.into());
        }

        tokio::time::sleep(self.timeouts.market_data_dwell).await;

        if let Err(e) = conn.client().await?.cancel_mkt_data(req_id).await {
            tracing::warn!(req_id, error = %e, "cancel market data failed");
        }
        let collected = correlator.collect_now(ticket);
        let ticks = collected.data.into_ticks();

        Ok(with_gateway_errors(
            json!({
                "symbol": params.symbol,
                "market_data": ticks,
                "data_points": ticks.len(),
                "timestamp": timestamp(),
            }),
            collected.errors,
        ))
    }

    pub async fn get_historical_data(&self, params: &HistoricalParams) -> Value {
        flatten(self.historical_data(params).await)
    }

    async fn historical_data(&self, params: &HistoricalParams) -> Result<Value> {
        if params.symbol.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("symbol is required".into()));
        }
        let conn = self.supervisor.acquire().await?;
        let correlator = conn.store().correlator();
        let contract = contract_for(params.symbol.trim(), &params.exchange, &params.sec_type);
        let request = HistoricalDataRequest {
            end_date_time: String::new(),
            duration: params.duration.clone(),
            bar_size: params.bar_size.clone(),
            what_to_show: params.what_to_show.clone(),
            use_rth: true,
            format_date: 1,
        };

        let ticket = correlator.register_next(Buffer::bars())?;
        let req_id = ticket.req_id();
        if let Err(e) = conn
            .client()
            .await?
            .req_historical_data(req_id, &contract, &request)
            .await
        {
            correlator.release(ticket);
            return Err(e.into());
        }
        let collected = correlator.wait(ticket, self.timeouts.historical).await;

        if !collected.complete {
            if let Err(e) = conn.client().await?.cancel_historical_data(req_id).await {
                tracing::debug!(req_id, error = %e, "cancel historical data failed");
            }
        }

        let complete = collected.complete;
        let bars = collected.data.into_bars();
        Ok(with_gateway_errors(
            json!({
                "symbol": params.symbol,
                "duration": params.duration,
                "bar_size": params.bar_size,
                "bars_count": bars.len(),
                "historical_data": bars,
                "complete": complete,
                "timestamp": timestamp(),
            }),
            collected.errors,
        ))
    }

    // ========================================================================
    // Orders
    // ========================================================================

    pub async fn place_order(&self, params: &PlaceOrderParams) -> Value {
        flatten(self.submit_order(params).await)
    }

    async fn submit_order(&self, params: &PlaceOrderParams) -> Result<Value> {
        let valid = params.validate()?;
        let conn = self.supervisor.acquire().await?;
        let order_id = conn.take_order_id()?;

        let contract = contract_for(&valid.symbol, &valid.exchange, &valid.sec_type);
        let order = Order {
            order_id,
            action: Some(valid.action.clone()),
            total_quantity: Some(valid.quantity),
            order_type: Some(valid.order_type.clone()),
            lmt_price: valid.limit_price,
            ..Order::default()
        };

        conn.client().await?.place_order(order_id, &contract, &order).await?;
        conn.store()
            .record_submission(OrderRecord::from_wire(order_id, &contract, &order));
        tracing::info!(
            order_id,
            symbol = %valid.symbol,
            action = %valid.action,
            order_type = %valid.order_type,
            "order submitted"
        );

        tokio::time::sleep(self.timeouts.order_settle).await;

        Ok(json!({
            "order_id": order_id,
            "symbol": valid.symbol,
            "action": valid.action.to_string(),
            "quantity": params.quantity,
            "order_type": valid.order_type.to_string(),
            "limit_price": valid.limit_price,
            "status": "submitted",
            "timestamp": timestamp(),
        }))
    }

    /// Sends the cancel without looking at local order state.
    pub async fn cancel_order(&self, order_id: i64) -> Value {
        flatten(self.request_cancel(order_id).await)
    }

    async fn request_cancel(&self, order_id: i64) -> Result<Value> {
        let conn = self.supervisor.acquire().await?;
        conn.client().await?.cancel_order(order_id).await?;
        Ok(json!({
            "order_id": order_id,
            "status": "cancel_requested",
            "timestamp": timestamp(),
        }))
    }

    pub async fn get_order_status(&self, order_id: i64) -> Value {
        flatten(self.supervisor.acquire().await.map(|conn| {
            let info = conn
                .store()
                .order(order_id)
                .map(|r| json!(r))
                .unwrap_or_else(|| json!({}));
            json!({
                "order_id": order_id,
                "order_info": info,
                "timestamp": timestamp(),
            })
        }))
    }

    pub async fn get_open_orders(&self) -> Value {
        flatten(self.open_orders(false).await.map(|(orders, complete)| {
            json!({
                "open_orders": orders_json(&orders),
                "total_open_orders": orders.len(),
                "complete": complete,
                "timestamp": timestamp(),
            })
        }))
    }

    pub async fn get_all_orders(&self) -> Value {
        flatten(self.open_orders(true).await.map(|(orders, complete)| {
            json!({
                "all_orders": orders_json(&orders),
                "total_orders": orders.len(),
                "complete": complete,
                "timestamp": timestamp(),
            })
        }))
    }

    /// `all` asks for orders from every client id, not just this session's.
    async fn open_orders(&self, all: bool) -> Result<(BTreeMap<i64, OrderRecord>, bool)> {
        let conn = self.supervisor.acquire().await?;
        let _gate = self.open_orders_gate.lock().await;
        let correlator = conn.store().correlator();

        let ticket = correlator.register(OPEN_ORDERS_STREAM, Buffer::open_orders())?;
        let sent = {
            let mut client = conn.client().await?;
            if all {
                client.req_all_open_orders().await
            } else {
                client.req_open_orders().await
            }
        };
        if let Err(e) = sent {
            correlator.release(ticket);
            return Err(e.into());
        }
        let collected = correlator.wait(ticket, self.timeouts.open_orders).await;
        Ok((collected.data.into_open_orders(), collected.complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_validation_normalizes_case() {
        let t = PlaceOrderParams::market("aapl", "buy", 10.0).validate().unwrap();
        assert_eq!(t.symbol, "AAPL");
        assert_eq!(t.action, Action::Buy);
        assert_eq!(t.order_type, OrderType::Market);
        assert_eq!(t.limit_price, None);
    }

    #[test]
    fn limit_order_needs_a_price() {
        let mut p = PlaceOrderParams::limit("AAPL", "BUY", 1.0, 150.0);
        assert_eq!(p.validate().unwrap().limit_price, Some(150.0));

        p.limit_price = None;
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("limit_price is required"), "{err}");
    }

    #[test]
    fn market_order_drops_a_stray_limit_price() {
        let mut p = PlaceOrderParams::market("AAPL", "SELL", 1.0);
        p.limit_price = Some(99.0);
        assert_eq!(p.validate().unwrap().limit_price, None);
    }

    #[test]
    fn bad_orders_are_rejected() {
        assert!(PlaceOrderParams::market("AAPL", "HOLD", 1.0).validate().is_err());
        assert!(PlaceOrderParams::market("AAPL", "BUY", 0.0).validate().is_err());
        assert!(PlaceOrderParams::market("AAPL", "BUY", f64::NAN).validate().is_err());
        assert!(PlaceOrderParams::market(" ", "BUY", 1.0).validate().is_err());
    }

    #[test]
    fn params_take_defaults_from_json() {
        let p: PlaceOrderParams =
            serde_json::from_value(json!({"symbol": "SPY", "action": "BUY", "quantity": 2})).unwrap();
        assert_eq!(p.order_type, "MKT");
        assert_eq!(p.exchange, "SMART");
        assert_eq!(p.sec_type, "STK");

        let h: HistoricalParams = serde_json::from_value(json!({"symbol": "SPY"})).unwrap();
        assert_eq!(h.duration, "1 D");
        assert_eq!(h.bar_size, "1 min");
        assert_eq!(h.what_to_show, "TRADES");
    }

    #[test]
    fn status_before_any_connection() {
        let facade = ToolFacade::new(BridgeConfig::default());
        let status = facade.get_connection_status();
        assert_eq!(status["connected"], false);
        assert_eq!(status["message"], "No connection attempted");
    }

    #[test]
    fn summary_projection() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "NetLiquidation".to_string(),
            AccountField {
                tag: "NetLiquidation".into(),
                value: "1000.5".into(),
                currency: "USD".into(),
            },
        );
        assert_eq!(
            summary_json(&fields),
            json!({"NetLiquidation": {"value": "1000.5", "currency": "USD"}})
        );
    }
}
