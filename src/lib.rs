//! IBKR Bridge: turns the callback stream of a TWS/Gateway session into
//! timeout-bounded request/response tool operations.
//!
//! - [`connection`]: one gateway session and its dispatcher task
//! - [`supervisor`]: endpoint failover, one attempt sequence at a time
//! - [`correlator`]: request ids, response buffers, completion signals
//! - [`handler`]: wire events to [`handler::EventSink`] calls
//! - [`store`]: per-session state, the sink implementation
//! - [`tools`]: the operations callers invoke
//! - [`web`]: HTTP routes over [`tools::ToolFacade`]

pub mod backoff;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod errors;
pub mod handler;
pub mod models;
pub mod store;
pub mod supervisor;
pub mod tools;
pub mod web;

pub use config::{BridgeConfig, Endpoint, ToolTimeouts};
pub use errors::{BridgeError, Result};
pub use tools::ToolFacade;
