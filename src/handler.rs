//! Gateway event handling.
//!
//! [`dispatch`] is the only code that knows both the wire event vocabulary
//! and the bridge's [`EventSink`] vocabulary. It runs on the dispatcher task,
//! one event at a time, so sink methods never run concurrently for the same
//! connection.

use ibkr_bridge_ibapi::{tick_type_name, IBEvent};
use rust_decimal::prelude::ToPrimitive;

use crate::models::{AccountField, HistoricalBar, OrderRecord, OrderStatusUpdate, Position};

/// Error codes that report farm and connection health rather than failures.
pub const INFORMATIONAL_CODES: [i32; 4] = [
    2104,  // market data farm connection is OK
    2106,  // HMDS data farm connection is OK
    2158,  // sec-def data farm connection is OK
    10089, // requested market data requires a subscription, delayed data follows
];

pub fn is_informational(code: i32) -> bool {
    INFORMATIONAL_CODES.contains(&code)
}

/// Receiver of decoded gateway events.
pub trait EventSink: Send + Sync {
    /// The gateway supplied the next valid order id; the session is usable.
    fn on_ready(&self, next_order_id: i64);
    fn on_managed_accounts(&self, accounts: &str);
    fn on_position(&self, position: Position);
    fn on_position_end(&self);
    fn on_account_field(&self, req_id: i32, field: AccountField);
    fn on_account_summary_end(&self, req_id: i32);
    fn on_order_status(&self, update: OrderStatusUpdate);
    fn on_open_order(&self, record: OrderRecord);
    fn on_open_order_end(&self);
    fn on_historical_bar(&self, req_id: i32, bar: HistoricalBar);
    fn on_historical_end(&self, req_id: i32);
    fn on_tick(&self, req_id: i32, name: &str, value: f64);
    /// Only called for codes that are not informational.
    fn on_error(&self, req_id: i32, code: i32, message: &str);
    fn on_closed(&self);
}

fn tick_name(tick_type: i32) -> String {
    tick_type_name(tick_type)
        .map(str::to_string)
        .unwrap_or_else(|| format!("TICK_{tick_type}"))
}

pub fn dispatch(event: IBEvent, sink: &dyn EventSink) {
    match event {
        IBEvent::NextValidId { order_id } => {
            tracing::info!(order_id, "next valid order id");
            sink.on_ready(order_id);
        }

        IBEvent::ManagedAccounts { accounts } => {
            tracing::info!(%accounts, "managed accounts");
            sink.on_managed_accounts(&accounts);
        }

        IBEvent::Error {
            req_id,
            code,
            message,
            ..
        } => {
            if is_informational(code) {
                tracing::info!(req_id, code, %message, "gateway notice");
            } else {
                tracing::warn!(req_id, code, %message, "gateway error");
                sink.on_error(req_id, code, &message);
            }
        }

        IBEvent::ConnectionClosed => {
            tracing::warn!("gateway connection closed");
            sink.on_closed();
        }

        IBEvent::TickPrice {
            req_id,
            tick_type,
            price,
            ..
        } => sink.on_tick(req_id, &tick_name(tick_type), price),

        IBEvent::TickSize {
            req_id,
            tick_type,
            size,
        } => sink.on_tick(req_id, &tick_name(tick_type), size.to_f64().unwrap_or(0.0)),

        IBEvent::OrderStatus {
            order_id,
            status,
            filled,
            remaining,
            avg_fill_price,
            last_fill_price,
            ..
        } => {
            tracing::debug!(order_id, %status, "order status");
            sink.on_order_status(OrderStatusUpdate::from_wire(
                order_id,
                &status,
                filled,
                remaining,
                avg_fill_price,
                last_fill_price,
            ));
        }

        IBEvent::OpenOrder {
            order_id,
            contract,
            order,
        } => sink.on_open_order(OrderRecord::from_wire(order_id, &contract, &order)),

        IBEvent::OpenOrderEnd => sink.on_open_order_end(),

        IBEvent::Position {
            account,
            contract,
            position,
            avg_cost,
        } => sink.on_position(Position::from_wire(&account, &contract, position, avg_cost)),

        IBEvent::PositionEnd => sink.on_position_end(),

        IBEvent::AccountSummary {
            req_id,
            tag,
            value,
            currency,
            ..
        } => sink.on_account_field(
            req_id,
            AccountField {
                tag,
                value,
                currency,
            },
        ),

        IBEvent::AccountSummaryEnd { req_id } => sink.on_account_summary_end(req_id),

        IBEvent::HistoricalData { req_id, bars, end } => {
            for bar in &bars {
                sink.on_historical_bar(req_id, HistoricalBar::from(bar));
            }
            if end.is_some() {
                sink.on_historical_end(req_id);
            }
        }

        IBEvent::HistoricalDataEnd { req_id, .. } => sink.on_historical_end(req_id),

        IBEvent::Unknown { msg_id, data } => {
            tracing::trace!(msg_id, len = data.len(), "unhandled gateway message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibkr_bridge_ibapi::{Bar, Contract, SecType};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, s: String) {
            self.calls.lock().push(s);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl EventSink for Recorder {
        fn on_ready(&self, id: i64) {
            self.push(format!("ready {id}"));
        }
        fn on_managed_accounts(&self, a: &str) {
            self.push(format!("accounts {a}"));
        }
        fn on_position(&self, p: Position) {
            self.push(format!("position {}", p.key()));
        }
        fn on_position_end(&self) {
            self.push("position_end".into());
        }
        fn on_account_field(&self, req_id: i32, f: AccountField) {
            self.push(format!("field {req_id} {}={}", f.tag, f.value));
        }
        fn on_account_summary_end(&self, req_id: i32) {
            self.push(format!("summary_end {req_id}"));
        }
        fn on_order_status(&self, u: OrderStatusUpdate) {
            self.push(format!("status {} {}", u.order_id, u.status));
        }
        fn on_open_order(&self, r: OrderRecord) {
            self.push(format!("open {}", r.order_id));
        }
        fn on_open_order_end(&self) {
            self.push("open_end".into());
        }
        fn on_historical_bar(&self, req_id: i32, b: HistoricalBar) {
            self.push(format!("bar {req_id} {}", b.date));
        }
        fn on_historical_end(&self, req_id: i32) {
            self.push(format!("bars_end {req_id}"));
        }
        fn on_tick(&self, req_id: i32, name: &str, value: f64) {
            self.push(format!("tick {req_id} {name}={value}"));
        }
        fn on_error(&self, req_id: i32, code: i32, _m: &str) {
            self.push(format!("error {req_id} {code}"));
        }
        fn on_closed(&self) {
            self.push("closed".into());
        }
    }

    fn error(code: i32) -> IBEvent {
        IBEvent::Error {
            req_id: -1,
            code,
            message: "notice".into(),
            advanced_order_reject_json: String::new(),
            error_time: 0,
        }
    }

    #[test]
    fn informational_codes_never_reach_the_sink() {
        let sink = Recorder::default();
        for code in INFORMATIONAL_CODES {
            dispatch(error(code), &sink);
        }
        assert!(sink.calls().is_empty());

        dispatch(error(200), &sink);
        assert_eq!(sink.calls(), vec!["error -1 200"]);
    }

    #[test]
    fn ticks_use_canonical_names() {
        let sink = Recorder::default();
        dispatch(
            IBEvent::TickPrice {
                req_id: 10_000,
                tick_type: 1,
                price: 101.5,
                size: Decimal::from(3),
                attr_mask: 0,
            },
            &sink,
        );
        dispatch(
            IBEvent::TickSize {
                req_id: 10_000,
                tick_type: 0,
                size: Decimal::from(300),
            },
            &sink,
        );
        dispatch(
            IBEvent::TickPrice {
                req_id: 10_000,
                tick_type: 9999,
                price: 1.0,
                size: Decimal::ZERO,
                attr_mask: 0,
            },
            &sink,
        );
        assert_eq!(
            sink.calls(),
            vec![
                "tick 10000 BID=101.5",
                "tick 10000 BID_SIZE=300",
                "tick 10000 TICK_9999=1",
            ]
        );
    }

    #[test]
    fn old_style_historical_batch_also_ends_the_request() {
        let sink = Recorder::default();
        let bar = Bar {
            time: "20260102".into(),
            ..Bar::default()
        };
        dispatch(
            IBEvent::HistoricalData {
                req_id: 4,
                bars: vec![bar.clone(), bar],
                end: Some(("a".into(), "b".into())),
            },
            &sink,
        );
        assert_eq!(
            sink.calls(),
            vec!["bar 4 20260102", "bar 4 20260102", "bars_end 4"]
        );
    }

    #[test]
    fn positions_and_session_events() {
        let sink = Recorder::default();
        dispatch(IBEvent::NextValidId { order_id: 12 }, &sink);
        dispatch(
            IBEvent::Position {
                account: "DU1".into(),
                contract: Box::new(Contract::new("AAPL", SecType::Stock, "NASDAQ", "USD")),
                position: Decimal::from(5),
                avg_cost: 10.0,
            },
            &sink,
        );
        dispatch(IBEvent::PositionEnd, &sink);
        dispatch(IBEvent::ConnectionClosed, &sink);
        assert_eq!(
            sink.calls(),
            vec!["ready 12", "position AAPL-STK-NASDAQ", "position_end", "closed"]
        );
    }
}
