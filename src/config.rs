//! Command line arguments and the runtime configuration derived from them.

use std::time::Duration;

use clap::Parser;

/// IBKR Bridge: tool surface over an Interactive Brokers TWS/Gateway session.
#[derive(Parser, Debug, Clone)]
#[command(name = "ibkr-bridge", version = "0.1.0")]
pub struct Args {
    /// TWS/Gateway host
    #[arg(long, env = "IBKR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Endpoints tried in order, as PORT=LABEL
    #[arg(
        long = "ports",
        env = "IBKR_PORTS",
        value_delimiter = ',',
        value_parser = parse_endpoint,
        default_value = "4001=IB Gateway,7497=TWS Paper Trading"
    )]
    pub endpoints: Vec<Endpoint>,

    /// API client id
    #[arg(long, env = "IBKR_CLIENT_ID", default_value_t = 0)]
    pub client_id: i32,

    /// HTTP port of the tool surface
    #[arg(long, env = "IBKR_BRIDGE_WEB_PORT", default_value_t = 5000)]
    pub web_port: u16,

    /// Seconds to wait for each endpoint to become ready
    #[arg(long, env = "IBKR_READY_TIMEOUT_SECS", default_value_t = 30)]
    pub ready_timeout_secs: u64,
}

impl Args {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            host: self.host.clone(),
            endpoints: self.endpoints.clone(),
            client_id: self.client_id,
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            ..BridgeConfig::default()
        }
    }
}

/// A gateway port and the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub port: u16,
    pub label: String,
}

impl Endpoint {
    pub fn new(port: u16, label: &str) -> Self {
        Self {
            port,
            label: label.to_string(),
        }
    }
}

/// `4001=IB Gateway`, or a bare port labelled `port 4001`.
fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    let (port, label) = match s.split_once('=') {
        Some((port, label)) => (port.trim(), label.trim().to_string()),
        None => (s.trim(), format!("port {}", s.trim())),
    };
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port '{port}': {e}"))?;
    Ok(Endpoint { port, label })
}

/// Per-operation waits of the tool facade.
#[derive(Debug, Clone)]
pub struct ToolTimeouts {
    pub positions: Duration,
    pub account_summary: Duration,
    pub open_orders: Duration,
    pub historical: Duration,
    /// How long a market data subscription stays open before it is cancelled.
    pub market_data_dwell: Duration,
    /// Pause after placing an order so early status events land first.
    pub order_settle: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            positions: Duration::from_secs(10),
            account_summary: Duration::from_secs(10),
            open_orders: Duration::from_secs(10),
            historical: Duration::from_secs(15),
            market_data_dwell: Duration::from_secs(3),
            order_settle: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub endpoints: Vec<Endpoint>,
    pub client_id: i32,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub timeouts: ToolTimeouts,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            endpoints: vec![
                Endpoint::new(4001, "IB Gateway"),
                Endpoint::new(7497, "TWS Paper Trading"),
            ],
            client_id: 0,
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            timeouts: ToolTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_endpoints() {
        let args = Args::try_parse_from(["ibkr-bridge"]).unwrap();
        let config = args.bridge_config();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(
            config.endpoints,
            vec![
                Endpoint::new(4001, "IB Gateway"),
                Endpoint::new(7497, "TWS Paper Trading"),
            ]
        );
        assert_eq!(config.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(args.web_port, 5000);
    }

    #[test]
    fn ports_keep_their_order() {
        let args = Args::try_parse_from([
            "ibkr-bridge",
            "--ports",
            "7496=TWS Live,4002",
            "--client-id",
            "9",
        ])
        .unwrap();
        assert_eq!(
            args.endpoints,
            vec![Endpoint::new(7496, "TWS Live"), Endpoint::new(4002, "port 4002")]
        );
        assert_eq!(args.client_id, 9);
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Args::try_parse_from(["ibkr-bridge", "--ports", "gateway=x"]).is_err());
    }
}
