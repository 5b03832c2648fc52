//! Pairs outgoing requests with the events that answer them.
//!
//! A tool operation registers a [`Buffer`] under a request id, sends its
//! request and then waits on the returned [`Ticket`]. The dispatcher task
//! fills the buffer and fires the completion signal when the terminal event
//! for that id arrives. The wait always hands back whatever accumulated, with
//! a flag saying whether the terminal event was seen.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::errors::{BridgeError, Result};
use crate::models::{AccountField, HistoricalBar, OrderRecord, Position};

/// First id handed out by [`RequestCorrelator::next_request_id`]. Gateway
/// order ids start near 1, so the two ranges do not meet in practice.
pub const FIRST_REQUEST_ID: i32 = 10_000;

/// Key for the position stream, which carries no request id.
pub const POSITIONS_STREAM: i32 = -1;
/// Key for the open-order stream, which carries no request id.
pub const OPEN_ORDERS_STREAM: i32 = -2;

/// Accumulated response data for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Positions(BTreeMap<String, Position>),
    AccountSummary(BTreeMap<String, AccountField>),
    Ticks(BTreeMap<String, f64>),
    Bars(Vec<HistoricalBar>),
    OpenOrders(BTreeMap<i64, OrderRecord>),
}

impl Buffer {
    pub fn positions() -> Self {
        Self::Positions(BTreeMap::new())
    }

    pub fn account_summary() -> Self {
        Self::AccountSummary(BTreeMap::new())
    }

    pub fn ticks() -> Self {
        Self::Ticks(BTreeMap::new())
    }

    pub fn bars() -> Self {
        Self::Bars(Vec::new())
    }

    pub fn open_orders() -> Self {
        Self::OpenOrders(BTreeMap::new())
    }

    /// Empty buffer of the same kind.
    fn emptied(&self) -> Self {
        match self {
            Self::Positions(_) => Self::positions(),
            Self::AccountSummary(_) => Self::account_summary(),
            Self::Ticks(_) => Self::ticks(),
            Self::Bars(_) => Self::bars(),
            Self::OpenOrders(_) => Self::open_orders(),
        }
    }

    pub fn into_positions(self) -> BTreeMap<String, Position> {
        match self {
            Self::Positions(m) => m,
            _ => BTreeMap::new(),
        }
    }

    pub fn into_account_summary(self) -> BTreeMap<String, AccountField> {
        match self {
            Self::AccountSummary(m) => m,
            _ => BTreeMap::new(),
        }
    }

    pub fn into_ticks(self) -> BTreeMap<String, f64> {
        match self {
            Self::Ticks(m) => m,
            _ => BTreeMap::new(),
        }
    }

    pub fn into_bars(self) -> Vec<HistoricalBar> {
        match self {
            Self::Bars(v) => v,
            _ => Vec::new(),
        }
    }

    pub fn into_open_orders(self) -> BTreeMap<i64, OrderRecord> {
        match self {
            Self::OpenOrders(m) => m,
            _ => BTreeMap::new(),
        }
    }
}

/// Handle to a registered request. Consumed by [`RequestCorrelator::wait`].
#[derive(Debug)]
pub struct Ticket {
    req_id: i32,
    done: oneshot::Receiver<()>,
    empty: Buffer,
}

impl Ticket {
    pub fn req_id(&self) -> i32 {
        self.req_id
    }
}

/// Outcome of a wait. `complete` is false when the wait timed out and `data`
/// is whatever arrived before that.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub data: Buffer,
    pub complete: bool,
    /// Non-informational gateway errors tagged with this request id.
    pub errors: Vec<String>,
}

struct Entry {
    buffer: Buffer,
    errors: Vec<String>,
    done: Option<oneshot::Sender<()>>,
}

pub struct RequestCorrelator {
    next_id: AtomicI32,
    entries: Mutex<HashMap<i32, Entry>>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(FIRST_REQUEST_ID),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_request_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `buffer` under `req_id`. Fails if a request on that id is
    /// still outstanding.
    pub fn register(&self, req_id: i32, buffer: Buffer) -> Result<Ticket> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&req_id) {
            return Err(BridgeError::DuplicateRequestId(req_id));
        }
        let (tx, rx) = oneshot::channel();
        let empty = buffer.emptied();
        entries.insert(
            req_id,
            Entry {
                buffer,
                errors: Vec::new(),
                done: Some(tx),
            },
        );
        tracing::trace!(req_id, "request registered");
        Ok(Ticket {
            req_id,
            done: rx,
            empty,
        })
    }

    /// Allocate a fresh id and register `buffer` under it.
    pub fn register_next(&self, buffer: Buffer) -> Result<Ticket> {
        loop {
            let req_id = self.next_request_id();
            match self.register(req_id, buffer.clone()) {
                Err(BridgeError::DuplicateRequestId(_)) => continue,
                other => return other,
            }
        }
    }

    /// Run `f` on the live buffer for `req_id`. Returns `None` when nothing
    /// is registered under it (late or unsolicited events).
    pub fn with_buffer<R>(&self, req_id: i32, f: impl FnOnce(&mut Buffer) -> R) -> Option<R> {
        self.entries
            .lock()
            .get_mut(&req_id)
            .map(|entry| f(&mut entry.buffer))
    }

    pub fn record_error(&self, req_id: i32, message: String) {
        if let Some(entry) = self.entries.lock().get_mut(&req_id) {
            entry.errors.push(message);
        }
    }

    /// Fire the completion signal for `req_id`. Only the first call per
    /// registration has any effect; the return value says whether this was it.
    pub fn signal_complete(&self, req_id: i32) -> bool {
        let sender = self
            .entries
            .lock()
            .get_mut(&req_id)
            .and_then(|entry| entry.done.take());
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Wait up to `timeout` for completion, then remove the entry and return
    /// its contents.
    pub async fn wait(&self, ticket: Ticket, timeout: Duration) -> Collected {
        let Ticket {
            req_id,
            mut done,
            empty,
        } = ticket;

        let complete = matches!(tokio::time::timeout(timeout, &mut done).await, Ok(Ok(())));
        if !complete {
            tracing::debug!(req_id, ?timeout, "request timed out, returning partial data");
        }
        self.take(req_id, empty, complete)
    }

    /// Remove the entry now, without waiting. `complete` reports whether the
    /// terminal event had already arrived.
    pub fn collect_now(&self, ticket: Ticket) -> Collected {
        let Ticket {
            req_id,
            mut done,
            empty,
        } = ticket;
        let complete = done.try_recv().is_ok();
        self.take(req_id, empty, complete)
    }

    /// Drop a registration whose request never went out.
    pub fn release(&self, ticket: Ticket) {
        self.entries.lock().remove(&ticket.req_id);
    }

    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    fn take(&self, req_id: i32, empty: Buffer, complete: bool) -> Collected {
        match self.entries.lock().remove(&req_id) {
            Some(entry) => Collected {
                data: entry.buffer,
                complete,
                errors: entry.errors,
            },
            None => Collected {
                data: empty,
                complete,
                errors: Vec::new(),
            },
        }
    }
}
