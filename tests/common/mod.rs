//! Scripted stand-in for a TWS/Gateway process.
//!
//! Speaks the handshake at server version 176, answers START_API with
//! `NextValidId` and `ManagedAccounts`, then hands every request to a script
//! that returns the frames to send back. Each request is also forwarded to the
//! test through [`MockGateway::next_request`].

#![allow(dead_code)]

use std::net::TcpListener as StdListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ibkr_bridge::{BridgeConfig, Endpoint, ToolTimeouts};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const ACCOUNT: &str = "DU123456";

pub type Script = Arc<dyn Fn(&[String]) -> Vec<Vec<String>> + Send + Sync>;

pub fn msg(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn frame(fields: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    for f in fields {
        body.extend_from_slice(f.as_bytes());
        body.push(0);
    }
    let mut out = (body.len() as u32).to_be_bytes().to_vec();
    out.extend(body);
    out
}

async fn read_fields(stream: &mut TcpStream) -> Option<Vec<String>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.ok()?;
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await.ok()?;
    let mut fields: Vec<String> = body
        .split(|b| *b == 0)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect();
    fields.pop(); // after the trailing NUL
    Some(fields)
}

#[derive(Clone)]
pub struct MockOptions {
    /// Send `NextValidId` after START_API. Without it the session never
    /// becomes ready.
    pub ready: bool,
    pub next_order_id: i64,
    pub script: Script,
}

impl MockOptions {
    pub fn ready(script: Script) -> Self {
        Self {
            ready: true,
            next_order_id: 1,
            script,
        }
    }

    pub fn silent() -> Self {
        Self {
            ready: false,
            next_order_id: 1,
            script: Arc::new(|_| Vec::new()),
        }
    }
}

pub struct MockGateway {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    requests: mpsc::UnboundedReceiver<Vec<String>>,
}

impl MockGateway {
    pub async fn start(script: Script) -> Self {
        Self::start_with(MockOptions::ready(script)).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, requests) = mpsc::unbounded_channel();

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, options.clone(), tx.clone()));
            }
        });

        Self {
            port,
            connections,
            requests,
        }
    }

    /// Sessions accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next request whose message id is `msg_id`, skipping others.
    pub async fn next_request(&mut self, msg_id: &str) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let fields = self.requests.recv().await.expect("mock gateway stopped");
                if fields.first().map(String::as_str) == Some(msg_id) {
                    return fields;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no request with message id {msg_id}"))
    }

    /// Requests received so far, without waiting.
    pub fn received(&mut self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Ok(fields) = self.requests.try_recv() {
            out.push(fields);
        }
        out
    }
}

async fn serve(mut stream: TcpStream, options: MockOptions, tx: mpsc::UnboundedSender<Vec<String>>) {
    let mut hello = [0u8; 17];
    if stream.read_exact(&mut hello).await.is_err() {
        return;
    }
    let ack = frame(&msg(&["176", "20260101 12:00:00 EST"]));
    if stream.write_all(&ack).await.is_err() {
        return;
    }
    // START_API
    if read_fields(&mut stream).await.is_none() {
        return;
    }
    if options.ready {
        let next_id = options.next_order_id.to_string();
        let _ = stream.write_all(&frame(&msg(&["9", "1", &next_id]))).await;
        let _ = stream.write_all(&frame(&msg(&["15", "1", ACCOUNT]))).await;
        let _ = stream
            .write_all(&frame(&msg(&[
                "4",
                "2",
                "-1",
                "2104",
                "Market data farm connection is OK:usfarm",
                "",
            ])))
            .await;
    }

    while let Some(fields) = read_fields(&mut stream).await {
        let replies = (options.script)(&fields);
        let _ = tx.send(fields);
        for reply in replies {
            if stream.write_all(&frame(&reply)).await.is_err() {
                return;
            }
        }
    }
}

/// A port nothing listens on.
pub fn refused_port() -> u16 {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config pointing at `endpoints`, with every wait shortened.
pub fn test_config(endpoints: Vec<Endpoint>) -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".into(),
        endpoints,
        client_id: 7,
        ready_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        timeouts: ToolTimeouts {
            positions: Duration::from_millis(500),
            account_summary: Duration::from_millis(500),
            open_orders: Duration::from_millis(500),
            historical: Duration::from_millis(500),
            market_data_dwell: Duration::from_millis(200),
            order_settle: Duration::from_millis(50),
        },
    }
}

pub fn single(port: u16) -> BridgeConfig {
    test_config(vec![Endpoint::new(port, "Mock Gateway")])
}

// ============================================================================
// Gateway messages at server version 176
// ============================================================================

pub fn position(symbol: &str, exchange: &str, qty: &str, avg_cost: &str) -> Vec<String> {
    msg(&[
        "61", "3", ACCOUNT, "265598", symbol, "STK", "", "0", "", "", exchange, "USD", symbol,
        symbol, qty, avg_cost,
    ])
}

pub fn position_end() -> Vec<String> {
    msg(&["62", "1"])
}

pub fn account_value(req_id: &str, tag: &str, value: &str) -> Vec<String> {
    msg(&["63", "1", req_id, ACCOUNT, tag, value, "USD"])
}

pub fn account_summary_end(req_id: &str) -> Vec<String> {
    msg(&["64", "1", req_id])
}

pub fn order_status(order_id: &str, status: &str, filled: &str, remaining: &str) -> Vec<String> {
    msg(&[
        "3", order_id, status, filled, remaining, "0", "1001", "0", "0", "7", "", "0",
    ])
}

pub fn open_order(order_id: &str, symbol: &str, action: &str, qty: &str, order_type: &str, lmt: &str) -> Vec<String> {
    msg(&[
        "5", order_id, "265598", symbol, "STK", "", "0", "", "", "SMART", "USD", symbol, symbol, action,
        qty, order_type, lmt, "", "DAY", "", ACCOUNT,
    ])
}

pub fn open_order_end() -> Vec<String> {
    msg(&["53", "1"])
}

pub fn tick_price(req_id: &str, tick_type: &str, price: &str) -> Vec<String> {
    msg(&["1", "6", req_id, tick_type, price, "100", "0"])
}

pub fn tick_size(req_id: &str, tick_type: &str, size: &str) -> Vec<String> {
    msg(&["2", "6", req_id, tick_type, size])
}

/// Pre-196 historical data: the batch carries the range and ends the request.
pub fn historical(req_id: &str, closes: &[&str]) -> Vec<String> {
    let mut fields = msg(&[
        "17",
        req_id,
        "20260101 09:30:00",
        "20260101 16:00:00",
        &closes.len().to_string(),
    ]);
    for (i, close) in closes.iter().enumerate() {
        fields.extend(msg(&[
            &format!("20260101 09:3{i}:00"),
            "100",
            "101",
            "99",
            close,
            "1500",
            "100.2",
            "12",
        ]));
    }
    fields
}

pub fn error(req_id: &str, code: &str, message: &str) -> Vec<String> {
    msg(&["4", "2", req_id, code, message, ""])
}
