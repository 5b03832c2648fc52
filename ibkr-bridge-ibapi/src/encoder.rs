//! Outgoing message encoding.
//!
//! A message is a 4-byte big-endian length followed by NUL-terminated ASCII
//! fields. Unset optional numbers travel as empty fields.

use bytes::{BufMut, BytesMut};
use rust_decimal::Decimal;
use std::fmt::Display;

use crate::errors::{IBApiError, Result};
use crate::models::contract::Contract;
use crate::protocol::{API_SIGN, HEADER_LEN, MAX_CLIENT_VER, MAX_MSG_LEN, MIN_CLIENT_VER};

/// Builder for one framed outgoing message.
///
/// The message id is written on construction; fields are appended with the
/// chaining `field*` methods and the frame is closed by [`finish`](Self::finish).
pub struct MessageEncoder {
    buf: BytesMut,
    server_version: i32,
}

impl MessageEncoder {
    pub fn new(server_version: i32, msg_id: i32) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_bytes(0, HEADER_LEN);
        let mut enc = Self {
            buf,
            server_version,
        };
        enc.field(msg_id);
        enc
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    /// Append any value through its `Display` form.
    pub fn field<T: Display>(&mut self, value: T) -> &mut Self {
        let text = value.to_string();
        if text.bytes().any(|b| !(32..127).contains(&b) && b != b'\t') {
            tracing::warn!(field = %text, "non-printable characters in outgoing field");
        }
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// Booleans travel as `1` / `0`.
    pub fn field_bool(&mut self, value: bool) -> &mut Self {
        self.field(u8::from(value))
    }

    pub fn field_empty(&mut self) -> &mut Self {
        self.buf.put_u8(0);
        self
    }

    pub fn field_f64(&mut self, value: f64) -> &mut Self {
        if value.is_infinite() && value.is_sign_positive() {
            self.field("Infinity")
        } else {
            self.field(value)
        }
    }

    pub fn field_max_f64(&mut self, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.field_f64(v),
            None => self.field_empty(),
        }
    }

    pub fn field_max_i32(&mut self, value: Option<i32>) -> &mut Self {
        match value {
            Some(v) => self.field(v),
            None => self.field_empty(),
        }
    }

    pub fn field_max_decimal(&mut self, value: Option<Decimal>) -> &mut Self {
        match value {
            Some(v) => self.field(v.normalize()),
            None => self.field_empty(),
        }
    }

    /// Contract identity fields shared by market data, historical data and
    /// order requests: conId through tradingClass.
    pub fn contract(&mut self, contract: &Contract) -> &mut Self {
        self.field(contract.con_id)
            .field(&contract.symbol)
            .field(contract.sec_type_str())
            .field(&contract.last_trade_date_or_contract_month)
            .field_max_f64(contract.strike)
            .field(&contract.right)
            .field(&contract.multiplier)
            .field(&contract.exchange)
            .field(&contract.primary_exchange)
            .field(&contract.currency)
            .field(&contract.local_symbol)
            .field(&contract.trading_class)
    }

    /// Write the length header and hand back the complete frame.
    pub fn finish(mut self) -> Result<BytesMut> {
        let body_len = self.buf.len() - HEADER_LEN;
        if body_len > MAX_MSG_LEN {
            return Err(IBApiError::Encoding(format!(
                "message body of {body_len} bytes exceeds {MAX_MSG_LEN}"
            )));
        }
        self.buf[..HEADER_LEN].copy_from_slice(&(body_len as u32).to_be_bytes());
        Ok(self.buf)
    }
}

/// Handshake bytes: `API\0`, then a length-prefixed `v<min>..<max>` range.
///
/// The version range is raw text, not a NUL-terminated field.
pub fn build_connect_request() -> BytesMut {
    let range = format!("v{MIN_CLIENT_VER}..{MAX_CLIENT_VER}");
    let mut buf = BytesMut::with_capacity(API_SIGN.len() + HEADER_LEN + range.len());
    buf.extend_from_slice(API_SIGN);
    buf.put_u32(range.len() as u32);
    buf.extend_from_slice(range.as_bytes());
    buf
}
