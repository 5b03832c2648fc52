//! IB TWS API protocol constants.
//!
//! Only the message ids and server-version gates that the bridge actually
//! encodes or decodes are listed here.

// ============================================================================
// Client / Protocol Constants
// ============================================================================

/// Minimum supported client version in the version range.
pub const MIN_CLIENT_VER: i32 = 100;

/// Maximum supported client version.
///
/// Capped one below `server_version::PROTOBUF` so the session always stays on
/// the text protocol: message ids travel as NUL-terminated ASCII fields.
pub const MAX_CLIENT_VER: i32 = 200;

/// Message header length (4-byte big-endian message length prefix).
pub const HEADER_LEN: usize = 4;

/// Maximum message length: 16 MB - 1 byte.
pub const MAX_MSG_LEN: usize = 0xFFFFFF;

/// API protocol signature sent at connection start.
pub const API_SIGN: &[u8; 4] = b"API\0";

// ============================================================================
// Incoming Message IDs (server -> client)
// ============================================================================

pub mod incoming {
    pub const TICK_PRICE: i32 = 1;
    pub const TICK_SIZE: i32 = 2;
    pub const ORDER_STATUS: i32 = 3;
    pub const ERR_MSG: i32 = 4;
    pub const OPEN_ORDER: i32 = 5;
    pub const NEXT_VALID_ID: i32 = 9;
    pub const MANAGED_ACCTS: i32 = 15;
    pub const HISTORICAL_DATA: i32 = 17;
    pub const OPEN_ORDER_END: i32 = 53;
    pub const POSITION_DATA: i32 = 61;
    pub const POSITION_END: i32 = 62;
    pub const ACCOUNT_SUMMARY: i32 = 63;
    pub const ACCOUNT_SUMMARY_END: i32 = 64;
    pub const HISTORICAL_DATA_END: i32 = 108;
}

// ============================================================================
// Outgoing Message IDs (client -> server)
// ============================================================================

pub mod outgoing {
    pub const REQ_MKT_DATA: i32 = 1;
    pub const CANCEL_MKT_DATA: i32 = 2;
    pub const PLACE_ORDER: i32 = 3;
    pub const CANCEL_ORDER: i32 = 4;
    pub const REQ_OPEN_ORDERS: i32 = 5;
    pub const REQ_IDS: i32 = 8;
    pub const REQ_ALL_OPEN_ORDERS: i32 = 16;
    pub const REQ_HISTORICAL_DATA: i32 = 20;
    pub const CANCEL_HISTORICAL_DATA: i32 = 25;
    pub const REQ_POSITIONS: i32 = 61;
    pub const REQ_ACCOUNT_SUMMARY: i32 = 62;
    pub const CANCEL_ACCOUNT_SUMMARY: i32 = 63;
    pub const CANCEL_POSITIONS: i32 = 64;
    pub const START_API: i32 = 71;
}

// ============================================================================
// Server Version Gates
// ============================================================================

/// Minimum server versions for optional wire fields.
///
/// Gates below `MIN_CLIENT_VER` are always satisfied after the handshake and
/// are therefore not listed.
pub mod server_version {
    pub const FRACTIONAL_POSITIONS: i32 = 101;
    pub const PEGGED_TO_BENCHMARK: i32 = 102;
    pub const MODELS_SUPPORT: i32 = 103;
    pub const EXT_OPERATOR: i32 = 105;
    pub const SOFT_DOLLAR_TIER: i32 = 106;
    pub const CASH_QTY: i32 = 111;
    pub const REQ_SMART_COMPONENTS: i32 = 114;
    pub const SYNT_REALTIME_BARS: i32 = 124;
    pub const MARKET_CAP_PRICE: i32 = 131;
    pub const DECISION_MAKER: i32 = 138;
    pub const MIFID_EXECUTION: i32 = 139;
    pub const AUTO_PRICE_FOR_HEDGE: i32 = 141;
    pub const ORDER_CONTAINER: i32 = 145;
    pub const D_PEG_ORDERS: i32 = 148;
    pub const PRICE_MGMT_ALGO: i32 = 151;
    pub const DURATION: i32 = 158;
    pub const POST_TO_ATS: i32 = 160;
    pub const AUTO_CANCEL_PARENT: i32 = 162;
    pub const ADVANCED_ORDER_REJECT: i32 = 166;
    pub const MANUAL_ORDER_TIME: i32 = 169;
    pub const PEGBEST_PEGMID_OFFSETS: i32 = 170;
    pub const FA_PROFILE_DESUPPORT: i32 = 177;
    pub const CUSTOMER_ACCOUNT: i32 = 183;
    pub const PROFESSIONAL_CUSTOMER: i32 = 184;
    pub const RFQ_FIELDS: i32 = 187;
    pub const INCLUDE_OVERNIGHT: i32 = 189;
    pub const UNDO_RFQ_FIELDS: i32 = 190;
    pub const PERM_ID_AS_LONG: i32 = 191;
    pub const CME_TAGGING_FIELDS: i32 = 192;
    pub const CME_TAGGING_FIELDS_IN_OPEN_ORDER: i32 = 193;
    pub const ERROR_TIME: i32 = 194;
    pub const HISTORICAL_DATA_END: i32 = 196;
    pub const IMBALANCE_ONLY: i32 = 199;
    pub const PROTOBUF: i32 = 201;
}

// ============================================================================
// Tick Types
// ============================================================================

/// Canonical tick type names, indexed by the wire tick type id.
const TICK_TYPE_NAMES: &[&str] = &[
    // 0-9
    "BID_SIZE", "BID", "ASK", "ASK_SIZE", "LAST",
    "LAST_SIZE", "HIGH", "LOW", "VOLUME", "CLOSE",
    // 10-19
    "BID_OPTION_COMPUTATION", "ASK_OPTION_COMPUTATION", "LAST_OPTION_COMPUTATION", "MODEL_OPTION", "OPEN",
    "LOW_13_WEEK", "HIGH_13_WEEK", "LOW_26_WEEK", "HIGH_26_WEEK", "LOW_52_WEEK",
    // 20-29
    "HIGH_52_WEEK", "AVG_VOLUME", "OPEN_INTEREST", "OPTION_HISTORICAL_VOL", "OPTION_IMPLIED_VOL",
    "OPTION_BID_EXCH", "OPTION_ASK_EXCH", "OPTION_CALL_OPEN_INTEREST", "OPTION_PUT_OPEN_INTEREST", "OPTION_CALL_VOLUME",
    // 30-39
    "OPTION_PUT_VOLUME", "INDEX_FUTURE_PREMIUM", "BID_EXCH", "ASK_EXCH", "AUCTION_VOLUME",
    "AUCTION_PRICE", "AUCTION_IMBALANCE", "MARK_PRICE", "BID_EFP_COMPUTATION", "ASK_EFP_COMPUTATION",
    // 40-49
    "LAST_EFP_COMPUTATION", "OPEN_EFP_COMPUTATION", "HIGH_EFP_COMPUTATION", "LOW_EFP_COMPUTATION", "CLOSE_EFP_COMPUTATION",
    "LAST_TIMESTAMP", "SHORTABLE", "FUNDAMENTAL_RATIOS", "RT_VOLUME", "HALTED",
    // 50-59
    "BID_YIELD", "ASK_YIELD", "LAST_YIELD", "CUST_OPTION_COMPUTATION", "TRADE_COUNT",
    "TRADE_RATE", "VOLUME_RATE", "LAST_RTH_TRADE", "RT_HISTORICAL_VOL", "IB_DIVIDENDS",
    // 60-69
    "BOND_FACTOR_MULTIPLIER", "REGULATORY_IMBALANCE", "NEWS_TICK", "SHORT_TERM_VOLUME_3_MIN", "SHORT_TERM_VOLUME_5_MIN",
    "SHORT_TERM_VOLUME_10_MIN", "DELAYED_BID", "DELAYED_ASK", "DELAYED_LAST", "DELAYED_BID_SIZE",
    // 70-79
    "DELAYED_ASK_SIZE", "DELAYED_LAST_SIZE", "DELAYED_HIGH", "DELAYED_LOW", "DELAYED_VOLUME",
    "DELAYED_CLOSE", "DELAYED_OPEN", "RT_TRD_VOLUME", "CREDITMAN_MARK_PRICE", "CREDITMAN_SLOW_MARK_PRICE",
    // 80-89
    "DELAYED_BID_OPTION", "DELAYED_ASK_OPTION", "DELAYED_LAST_OPTION", "DELAYED_MODEL_OPTION", "LAST_EXCH",
    "LAST_REG_TIME", "FUTURES_OPEN_INTEREST", "AVG_OPT_VOLUME", "DELAYED_LAST_TIMESTAMP", "SHORTABLE_SHARES",
    // 90-99
    "DELAYED_HALTED", "REUTERS_2_MUTUAL_FUNDS", "ETF_NAV_CLOSE", "ETF_NAV_PRIOR_CLOSE", "ETF_NAV_BID",
    "ETF_NAV_ASK", "ETF_NAV_LAST", "ETF_FROZEN_NAV_LAST", "ETF_NAV_HIGH", "ETF_NAV_LOW",
    // 100-105
    "SOCIAL_MARKET_ANALYTICS", "ESTIMATED_IPO_MIDPOINT", "FINAL_IPO_LAST", "DELAYED_YIELD_BID", "DELAYED_YIELD_ASK",
    "NOT_SET",
];

/// Name of a wire tick type, e.g. `1 -> "BID"`. `None` for ids this client
/// does not know.
pub fn tick_type_name(tick_type: i32) -> Option<&'static str> {
    usize::try_from(tick_type)
        .ok()
        .and_then(|i| TICK_TYPE_NAMES.get(i).copied())
}
