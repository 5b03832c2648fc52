//! Data structures exchanged with the gateway.

pub mod bar;
pub mod contract;
pub mod enums;
pub mod order;
