//! Strongly-typed enums for the contract and order string fields.
//!
//! Extensible types carry an `Other(String)` variant so values the bridge
//! does not name still round-trip through the wire unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Security Type
// ============================================================================

/// Security type (wire field `secType`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
    #[serde(rename = "STK")]
    Stock,
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "FUT")]
    Future,
    #[serde(rename = "CASH")]
    Forex,
    #[serde(rename = "IND")]
    Index,
    #[serde(rename = "BOND")]
    Bond,
    #[serde(rename = "CRYPTO")]
    Crypto,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for SecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock => write!(f, "STK"),
            Self::Option => write!(f, "OPT"),
            Self::Future => write!(f, "FUT"),
            Self::Forex => write!(f, "CASH"),
            Self::Index => write!(f, "IND"),
            Self::Bond => write!(f, "BOND"),
            Self::Crypto => write!(f, "CRYPTO"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for SecType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "STK" => Self::Stock,
            "OPT" => Self::Option,
            "FUT" => Self::Future,
            "CASH" => Self::Forex,
            "IND" => Self::Index,
            "BOND" => Self::Bond,
            "CRYPTO" => Self::Crypto,
            other => Self::Other(other.to_string()),
        })
    }
}

// ============================================================================
// Order Enums
// ============================================================================

/// Order action (wire field `action`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "SSHORT")]
    SellShort,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::SellShort => write!(f, "SSHORT"),
        }
    }
}

impl FromStr for Action {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "SSHORT" => Ok(Self::SellShort),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Order type (wire field `orderType`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "MKT")]
    Market,
    #[serde(rename = "LMT")]
    Limit,
    #[serde(rename = "STP")]
    Stop,
    #[serde(rename = "STP LMT")]
    StopLimit,
    #[serde(rename = "TRAIL")]
    TrailingStop,
    #[serde(rename = "MOC")]
    MarketOnClose,
    #[serde(rename = "LOC")]
    LimitOnClose,
    #[serde(untagged)]
    Other(String),
}

impl OrderType {
    /// Whether the gateway requires a limit price for this order type.
    pub fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::LimitOnClose)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MKT"),
            Self::Limit => write!(f, "LMT"),
            Self::Stop => write!(f, "STP"),
            Self::StopLimit => write!(f, "STP LMT"),
            Self::TrailingStop => write!(f, "TRAIL"),
            Self::MarketOnClose => write!(f, "MOC"),
            Self::LimitOnClose => write!(f, "LOC"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for OrderType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MKT" => Self::Market,
            "LMT" => Self::Limit,
            "STP" => Self::Stop,
            "STP LMT" => Self::StopLimit,
            "TRAIL" => Self::TrailingStop,
            "MOC" => Self::MarketOnClose,
            "LOC" => Self::LimitOnClose,
            other => Self::Other(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sec_type_display_round_trip() {
        let types = vec![
            (SecType::Stock, "STK"),
            (SecType::Option, "OPT"),
            (SecType::Forex, "CASH"),
            (SecType::Crypto, "CRYPTO"),
        ];
        for (variant, expected) in types {
            assert_eq!(variant.to_string(), expected);
            assert_eq!(SecType::from_str(expected).unwrap(), variant);
        }
    }

    #[test]
    fn sec_type_other_variant() {
        let parsed = SecType::from_str("WAR").unwrap();
        assert_eq!(parsed, SecType::Other("WAR".to_string()));
        assert_eq!(parsed.to_string(), "WAR");
    }

    #[test]
    fn action_rejects_unknown() {
        assert_eq!(Action::from_str("SELL").unwrap(), Action::Sell);
        assert!(Action::from_str("HOLD").is_err());
    }

    #[test]
    fn order_type_limit_price_requirement() {
        assert!(OrderType::Limit.requires_limit_price());
        assert!(OrderType::StopLimit.requires_limit_price());
        assert!(!OrderType::Market.requires_limit_price());
        assert!(!OrderType::from_str("MIDPRICE").unwrap().requires_limit_price());
        assert_eq!(OrderType::from_str("STP LMT").unwrap(), OrderType::StopLimit);
    }
}
