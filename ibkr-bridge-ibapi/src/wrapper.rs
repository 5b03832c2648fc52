//! Events decoded from gateway messages.
//!
//! The reader task delivers these through a tokio mpsc channel; consumers
//! match on the variants they care about.

use rust_decimal::Decimal;

use crate::models::bar::Bar;
use crate::models::contract::Contract;
use crate::models::order::Order;

/// One decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum IBEvent {
    // ========================================================================
    // Session
    // ========================================================================
    /// First usable order id for this session.
    NextValidId { order_id: i64 },

    /// Comma-separated account codes the login can see.
    ManagedAccounts { accounts: String },

    /// Error, warning or notice. `req_id` is -1 when not tied to a request.
    Error {
        req_id: i32,
        code: i32,
        message: String,
        advanced_order_reject_json: String,
        error_time: i64,
    },

    /// The socket closed or the read loop failed. Always the last event.
    ConnectionClosed,

    // ========================================================================
    // Market data
    // ========================================================================
    TickPrice {
        req_id: i32,
        tick_type: i32,
        price: f64,
        size: Decimal,
        attr_mask: i32,
    },

    TickSize {
        req_id: i32,
        tick_type: i32,
        size: Decimal,
    },

    // ========================================================================
    // Orders
    // ========================================================================
    OrderStatus {
        order_id: i64,
        status: String,
        filled: Decimal,
        remaining: Decimal,
        avg_fill_price: f64,
        perm_id: i64,
        parent_id: i32,
        last_fill_price: f64,
        client_id: i32,
        why_held: String,
        mkt_cap_price: f64,
    },

    /// Leading contract and order fields of an open order.
    OpenOrder {
        order_id: i64,
        contract: Box<Contract>,
        order: Box<Order>,
    },

    OpenOrderEnd,

    // ========================================================================
    // Account
    // ========================================================================
    Position {
        account: String,
        contract: Box<Contract>,
        position: Decimal,
        avg_cost: f64,
    },

    PositionEnd,

    AccountSummary {
        req_id: i32,
        account: String,
        tag: String,
        value: String,
        currency: String,
    },

    AccountSummaryEnd { req_id: i32 },

    // ========================================================================
    // Historical data
    // ========================================================================
    /// A batch of bars. `end` carries the start/end range when the batch is
    /// also the final message of the request (older servers).
    HistoricalData {
        req_id: i32,
        bars: Vec<Bar>,
        end: Option<(String, String)>,
    },

    HistoricalDataEnd {
        req_id: i32,
        start: String,
        end: String,
    },

    /// A message id this client does not decode, or one that failed to decode.
    Unknown { msg_id: i32, data: Vec<u8> },
}
