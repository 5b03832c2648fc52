//! Incoming message decoding.
//!
//! [`MessageDecoder`] walks the NUL-terminated fields of one message body.
//! [`decode_server_msg`] reads the message id and dispatches to the
//! per-message decoders below.

use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::{IBApiError, Result};
use crate::models::bar::Bar;
use crate::models::contract::Contract;
use crate::models::order::Order;
use crate::protocol::{incoming, server_version};
use crate::wrapper::IBEvent;

/// Cursor over the fields of one message body (length header stripped).
pub struct MessageDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    server_version: i32,
}

impl<'a> MessageDecoder<'a> {
    pub fn new(data: &'a [u8], server_version: i32) -> Self {
        Self {
            data,
            pos: 0,
            server_version,
        }
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    fn next_field(&mut self) -> Result<&'a str> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        if rest.is_empty() {
            return Err(IBApiError::Decoding("unexpected end of message".into()));
        }
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| IBApiError::Decoding("field not NUL-terminated".into()))?;
        let text = std::str::from_utf8(&rest[..len])
            .map_err(|e| IBApiError::Decoding(format!("invalid UTF-8: {e}")))?;
        self.pos += len + 1;
        Ok(text)
    }

    fn parse<T>(&mut self, empty: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.next_field()?;
        if text.is_empty() {
            return Ok(empty);
        }
        text.parse()
            .map_err(|e| IBApiError::Decoding(format!("invalid value '{text}': {e}")))
    }

    fn parse_max<T>(&mut self) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.next_field()?;
        if text.is_empty() {
            return Ok(None);
        }
        text.parse()
            .map(Some)
            .map_err(|e| IBApiError::Decoding(format!("invalid value '{text}': {e}")))
    }

    pub fn decode_string(&mut self) -> Result<String> {
        self.next_field().map(str::to_string)
    }

    /// Empty reads as 0.
    pub fn decode_i32(&mut self) -> Result<i32> {
        self.parse(0)
    }

    pub fn decode_i64(&mut self) -> Result<i64> {
        self.parse(0)
    }

    /// Empty reads as 0.0; `Infinity` is accepted.
    pub fn decode_f64(&mut self) -> Result<f64> {
        self.parse(0.0)
    }

    pub fn decode_bool(&mut self) -> Result<bool> {
        self.decode_i32().map(|v| v > 0)
    }

    pub fn decode_decimal(&mut self) -> Result<Decimal> {
        self.parse(Decimal::ZERO)
    }

    /// Empty reads as `None` (the gateway's "unset").
    pub fn decode_f64_max(&mut self) -> Result<Option<f64>> {
        self.parse_max()
    }

    pub fn decode_decimal_max(&mut self) -> Result<Option<Decimal>> {
        self.parse_max()
    }

    pub fn decode_enum_opt<T>(&mut self) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parse_max()
    }

    pub fn skip_fields(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.next_field()?;
        }
        Ok(())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Decode one message body into an event.
///
/// Ids this client does not handle, and messages that fail to decode, come
/// back as [`IBEvent::Unknown`] so the read loop never stops on bad input.
pub fn decode_server_msg(data: &[u8], server_version: i32) -> IBEvent {
    let mut dec = MessageDecoder::new(data, server_version);
    let msg_id = match dec.decode_i32() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable message id");
            return IBEvent::Unknown {
                msg_id: -1,
                data: data.to_vec(),
            };
        }
    };

    let decoded = match msg_id {
        incoming::ERR_MSG => decode_err_msg(&mut dec),
        incoming::NEXT_VALID_ID => decode_next_valid_id(&mut dec),
        incoming::MANAGED_ACCTS => decode_managed_accts(&mut dec),
        incoming::TICK_PRICE => decode_tick_price(&mut dec),
        incoming::TICK_SIZE => decode_tick_size(&mut dec),
        incoming::ORDER_STATUS => decode_order_status(&mut dec),
        incoming::OPEN_ORDER => decode_open_order(&mut dec),
        incoming::OPEN_ORDER_END => Ok(IBEvent::OpenOrderEnd),
        incoming::POSITION_DATA => decode_position_data(&mut dec),
        incoming::POSITION_END => Ok(IBEvent::PositionEnd),
        incoming::ACCOUNT_SUMMARY => decode_account_summary(&mut dec),
        incoming::ACCOUNT_SUMMARY_END => decode_account_summary_end(&mut dec),
        incoming::HISTORICAL_DATA => decode_historical_data(&mut dec),
        incoming::HISTORICAL_DATA_END => decode_historical_data_end(&mut dec),
        _ => {
            tracing::trace!(msg_id, "ignoring undecoded message");
            return IBEvent::Unknown {
                msg_id,
                data: data.to_vec(),
            };
        }
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!(msg_id, error = %e, "failed to decode message");
        IBEvent::Unknown {
            msg_id,
            data: data.to_vec(),
        }
    })
}

fn decode_err_msg(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;
    if version < 2 {
        return Ok(IBEvent::Error {
            req_id: -1,
            code: 0,
            message: dec.decode_string()?,
            advanced_order_reject_json: String::new(),
            error_time: 0,
        });
    }

    let req_id = dec.decode_i32()?;
    let code = dec.decode_i32()?;
    let message = dec.decode_string()?;
    let advanced_order_reject_json = if dec.server_version() >= server_version::ADVANCED_ORDER_REJECT {
        dec.decode_string()?
    } else {
        String::new()
    };
    let error_time = if dec.server_version() >= server_version::ERROR_TIME {
        dec.decode_i64()?
    } else {
        0
    };

    Ok(IBEvent::Error {
        req_id,
        code,
        message,
        advanced_order_reject_json,
        error_time,
    })
}

fn decode_next_valid_id(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::NextValidId {
        order_id: dec.decode_i64()?,
    })
}

fn decode_managed_accts(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::ManagedAccounts {
        accounts: dec.decode_string()?,
    })
}

fn decode_tick_price(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::TickPrice {
        req_id: dec.decode_i32()?,
        tick_type: dec.decode_i32()?,
        price: dec.decode_f64()?,
        size: dec.decode_decimal()?,
        attr_mask: dec.decode_i32()?,
    })
}

fn decode_tick_size(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::TickSize {
        req_id: dec.decode_i32()?,
        tick_type: dec.decode_i32()?,
        size: dec.decode_decimal()?,
    })
}

/// Order and perm ids widened to i64 from `PERM_ID_AS_LONG` on.
fn decode_order_id(dec: &mut MessageDecoder) -> Result<i64> {
    if dec.server_version() >= server_version::PERM_ID_AS_LONG {
        dec.decode_i64()
    } else {
        dec.decode_i32().map(i64::from)
    }
}

fn decode_order_status(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let sv = dec.server_version();
    if sv < server_version::MARKET_CAP_PRICE {
        dec.skip_fields(1)?;
    }
    Ok(IBEvent::OrderStatus {
        order_id: decode_order_id(dec)?,
        status: dec.decode_string()?,
        filled: dec.decode_decimal()?,
        remaining: dec.decode_decimal()?,
        avg_fill_price: dec.decode_f64()?,
        perm_id: decode_order_id(dec)?,
        parent_id: dec.decode_i32()?,
        last_fill_price: dec.decode_f64()?,
        client_id: dec.decode_i32()?,
        why_held: dec.decode_string()?,
        mkt_cap_price: if sv >= server_version::MARKET_CAP_PRICE {
            dec.decode_f64()?
        } else {
            0.0
        },
    })
}

/// Contract block shared by open-order and position messages: conId through
/// localSymbol, without primary exchange.
fn decode_contract_head(dec: &mut MessageDecoder) -> Result<Contract> {
    Ok(Contract {
        con_id: i64::from(dec.decode_i32()?),
        symbol: dec.decode_string()?,
        sec_type: dec.decode_enum_opt()?,
        last_trade_date_or_contract_month: dec.decode_string()?,
        strike: dec.decode_f64_max()?,
        right: dec.decode_string()?,
        multiplier: dec.decode_string()?,
        exchange: dec.decode_string()?,
        currency: dec.decode_string()?,
        local_symbol: dec.decode_string()?,
        ..Contract::default()
    })
}

/// Only the leading contract and order fields are read; the long tail of
/// order attributes is left undecoded.
fn decode_open_order(dec: &mut MessageDecoder) -> Result<IBEvent> {
    if dec.server_version() < server_version::ORDER_CONTAINER {
        dec.skip_fields(1)?;
    }
    let order_id = decode_order_id(dec)?;
    let mut contract = decode_contract_head(dec)?;
    contract.trading_class = dec.decode_string()?;

    let order = Order {
        order_id,
        action: dec.decode_enum_opt()?,
        total_quantity: dec.decode_decimal_max()?,
        order_type: dec.decode_enum_opt()?,
        lmt_price: dec.decode_f64_max()?,
        aux_price: dec.decode_f64_max()?,
        tif: dec.decode_string()?,
        account: {
            dec.skip_fields(1)?; // ocaGroup
            dec.decode_string()?
        },
        ..Order::default()
    };

    Ok(IBEvent::OpenOrder {
        order_id,
        contract: Box::new(contract),
        order: Box::new(order),
    })
}

fn decode_position_data(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;
    let account = dec.decode_string()?;
    let mut contract = decode_contract_head(dec)?;
    if version >= 2 {
        contract.trading_class = dec.decode_string()?;
    }
    let position = dec.decode_decimal()?;
    let avg_cost = if version >= 3 { dec.decode_f64()? } else { 0.0 };
    Ok(IBEvent::Position {
        account,
        contract: Box::new(contract),
        position,
        avg_cost,
    })
}

fn decode_account_summary(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::AccountSummary {
        req_id: dec.decode_i32()?,
        account: dec.decode_string()?,
        tag: dec.decode_string()?,
        value: dec.decode_string()?,
        currency: dec.decode_string()?,
    })
}

fn decode_account_summary_end(dec: &mut MessageDecoder) -> Result<IBEvent> {
    dec.skip_fields(1)?;
    Ok(IBEvent::AccountSummaryEnd {
        req_id: dec.decode_i32()?,
    })
}

fn decode_historical_data(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let sv = dec.server_version();
    if sv < server_version::SYNT_REALTIME_BARS {
        dec.skip_fields(1)?;
    }
    let req_id = dec.decode_i32()?;
    // Before HISTORICAL_DATA_END existed, the range rode on the data message
    // and the message itself closed the request.
    let end = if sv < server_version::HISTORICAL_DATA_END {
        Some((dec.decode_string()?, dec.decode_string()?))
    } else {
        None
    };

    let count = dec.decode_i32()?.max(0) as usize;
    let mut bars = Vec::with_capacity(count);
    for _ in 0..count {
        let mut bar = Bar {
            time: dec.decode_string()?,
            open: dec.decode_f64()?,
            high: dec.decode_f64()?,
            low: dec.decode_f64()?,
            close: dec.decode_f64()?,
            volume: dec.decode_decimal_max()?,
            wap: dec.decode_decimal_max()?,
            ..Bar::default()
        };
        if sv < server_version::SYNT_REALTIME_BARS {
            dec.skip_fields(1)?; // hasGaps
        }
        bar.count = dec.decode_i32()?;
        bars.push(bar);
    }

    Ok(IBEvent::HistoricalData { req_id, bars, end })
}

fn decode_historical_data_end(dec: &mut MessageDecoder) -> Result<IBEvent> {
    Ok(IBEvent::HistoricalDataEnd {
        req_id: dec.decode_i32()?,
        start: dec.decode_string()?,
        end: dec.decode_string()?,
    })
}
