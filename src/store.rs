//! Per-connection session state, fed by the dispatcher task.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::correlator::{Buffer, RequestCorrelator, OPEN_ORDERS_STREAM, POSITIONS_STREAM};
use crate::errors::{BridgeError, Result};
use crate::handler::EventSink;
use crate::models::{AccountField, HistoricalBar, OrderRecord, OrderStatusUpdate, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Connected,
            1 => Self::Connecting,
            _ => Self::Disconnected,
        }
    }
}

/// Everything a connection learns from the gateway.
///
/// Written only from the dispatcher task through [`EventSink`]; tool
/// operations read it through the accessors below.
pub struct SessionStore {
    state: AtomicU8,
    next_order_id: Mutex<Option<i64>>,
    managed_accounts: Mutex<Vec<String>>,
    orders: Mutex<BTreeMap<i64, OrderRecord>>,
    /// Last completed position snapshot.
    positions: Mutex<BTreeMap<String, Position>>,
    /// Last completed account summary.
    account_info: Mutex<BTreeMap<String, AccountField>>,
    correlator: RequestCorrelator,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            next_order_id: Mutex::new(None),
            managed_accounts: Mutex::new(Vec::new()),
            orders: Mutex::new(BTreeMap::new()),
            positions: Mutex::new(BTreeMap::new()),
            account_info: Mutex::new(BTreeMap::new()),
            correlator: RequestCorrelator::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn next_order_id(&self) -> Option<i64> {
        *self.next_order_id.lock()
    }

    /// Hand out the current order id and advance the local counter.
    pub fn take_order_id(&self) -> Result<i64> {
        let mut next = self.next_order_id.lock();
        let id = next.ok_or(BridgeError::NoValidOrderId)?;
        *next = Some(id + 1);
        Ok(id)
    }

    pub fn managed_accounts(&self) -> Vec<String> {
        self.managed_accounts.lock().clone()
    }

    pub fn order(&self, order_id: i64) -> Option<OrderRecord> {
        self.orders.lock().get(&order_id).cloned()
    }

    /// Record an order this session just submitted.
    pub fn record_submission(&self, record: OrderRecord) {
        let mut orders = self.orders.lock();
        match orders.get_mut(&record.order_id) {
            Some(existing) => existing.merge_descriptor(record),
            None => {
                orders.insert(record.order_id, record);
            }
        }
    }

    pub fn positions(&self) -> BTreeMap<String, Position> {
        self.positions.lock().clone()
    }

    pub fn replace_positions(&self, snapshot: BTreeMap<String, Position>) {
        *self.positions.lock() = snapshot;
    }

    pub fn account_info(&self) -> BTreeMap<String, AccountField> {
        self.account_info.lock().clone()
    }

    pub fn replace_account_info(&self, snapshot: BTreeMap<String, AccountField>) {
        *self.account_info.lock() = snapshot;
    }
}

impl EventSink for SessionStore {
    fn on_ready(&self, next_order_id: i64) {
        *self.next_order_id.lock() = Some(next_order_id);
        self.set_state(ConnectionState::Connected);
    }

    fn on_managed_accounts(&self, accounts: &str) {
        *self.managed_accounts.lock() = accounts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    fn on_position(&self, position: Position) {
        self.correlator.with_buffer(POSITIONS_STREAM, |buffer| {
            if let Buffer::Positions(map) = buffer {
                map.insert(position.key(), position);
            }
        });
    }

    fn on_position_end(&self) {
        self.correlator.signal_complete(POSITIONS_STREAM);
    }

    fn on_account_field(&self, req_id: i32, field: AccountField) {
        self.correlator.with_buffer(req_id, |buffer| {
            if let Buffer::AccountSummary(map) = buffer {
                map.insert(field.tag.clone(), field);
            }
        });
    }

    fn on_account_summary_end(&self, req_id: i32) {
        self.correlator.signal_complete(req_id);
    }

    fn on_order_status(&self, update: OrderStatusUpdate) {
        let record = {
            let mut orders = self.orders.lock();
            let record = orders
                .entry(update.order_id)
                .or_insert_with(|| OrderRecord::new(update.order_id));
            record.apply_status(&update);
            record.clone()
        };
        self.correlator.with_buffer(OPEN_ORDERS_STREAM, |buffer| {
            if let Buffer::OpenOrders(map) = buffer {
                if let Some(open) = map.get_mut(&update.order_id) {
                    *open = record;
                }
            }
        });
    }

    fn on_open_order(&self, record: OrderRecord) {
        let merged = {
            let mut orders = self.orders.lock();
            let existing = orders
                .entry(record.order_id)
                .or_insert_with(|| OrderRecord::new(record.order_id));
            existing.merge_descriptor(record);
            existing.clone()
        };
        self.correlator.with_buffer(OPEN_ORDERS_STREAM, |buffer| {
            if let Buffer::OpenOrders(map) = buffer {
                map.insert(merged.order_id, merged);
            }
        });
    }

    fn on_open_order_end(&self) {
        self.correlator.signal_complete(OPEN_ORDERS_STREAM);
    }

    fn on_historical_bar(&self, req_id: i32, bar: HistoricalBar) {
        self.correlator.with_buffer(req_id, |buffer| {
            if let Buffer::Bars(bars) = buffer {
                bars.push(bar);
            }
        });
    }

    fn on_historical_end(&self, req_id: i32) {
        self.correlator.signal_complete(req_id);
    }

    fn on_tick(&self, req_id: i32, name: &str, value: f64) {
        self.correlator.with_buffer(req_id, |buffer| {
            if let Buffer::Ticks(ticks) = buffer {
                ticks.insert(name.to_string(), value);
            }
        });
    }

    fn on_error(&self, req_id: i32, code: i32, message: &str) {
        if req_id >= 0 {
            self.correlator.record_error(req_id, format!("{code}: {message}"));
        }
    }

    fn on_closed(&self) {
        self.set_state(ConnectionState::Disconnected);
    }
}
