//! ibkr-bridge-ibapi: async client for the part of the IB TWS API wire
//! protocol that the bridge speaks.
//!
//! ## Modules
//!
//! - [`protocol`]: message ids, server version gates, tick type names
//! - [`encoder`] / [`decoder`]: field-level wire codec
//! - [`transport`]: framed TCP and the version handshake
//! - [`reader`]: background task turning frames into [`IBEvent`]s
//! - [`client`]: [`IBClient`], the request side of a session
//! - [`models`]: contract, order and bar types

pub mod client;
pub mod decoder;
pub mod encoder;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod reader;
pub mod transport;
pub mod wrapper;

pub use client::{HistoricalDataRequest, IBClient};
pub use errors::IBApiError;
pub use models::bar::Bar;
pub use models::contract::Contract;
pub use models::enums::{Action, OrderType, SecType};
pub use models::order::Order;
pub use protocol::tick_type_name;
pub use wrapper::IBEvent;
