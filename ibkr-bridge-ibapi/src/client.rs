//! Request side of a gateway session.
//!
//! [`IBClient::connect`] performs the handshake, sends START_API and spawns
//! the reader task; responses arrive on the returned event receiver.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::encoder::MessageEncoder;
use crate::errors::{IBApiError, Result};
use crate::models::contract::Contract;
use crate::models::order::Order;
use crate::protocol::{outgoing, server_version};
use crate::reader::MessageReader;
use crate::transport::{Transport, TransportWriter};
use crate::wrapper::IBEvent;

/// Parameters of a historical bar request.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalDataRequest {
    /// `yyyymmdd hh:mm:ss` with zone, or empty for "now".
    pub end_date_time: String,
    /// e.g. `"1 D"`, `"2 W"`.
    pub duration: String,
    /// e.g. `"1 hour"`, `"5 mins"`.
    pub bar_size: String,
    /// e.g. `"TRADES"`, `"MIDPOINT"`.
    pub what_to_show: String,
    pub use_rth: bool,
    /// 1 for `yyyymmdd hh:mm:ss` strings, 2 for epoch seconds.
    pub format_date: i32,
}

pub struct IBClient {
    writer: TransportWriter,
    server_version: i32,
    tws_time: String,
    client_id: i32,
    connected: bool,
    reader_handle: Option<JoinHandle<()>>,
}

impl IBClient {
    /// Connect, negotiate and start the API session.
    ///
    /// The first events on the receiver are normally `NextValidId` and
    /// `ManagedAccounts`.
    pub async fn connect(
        host: &str,
        port: u16,
        client_id: i32,
    ) -> Result<(Self, mpsc::UnboundedReceiver<IBEvent>)> {
        let mut transport = Transport::connect(host, port).await?;
        transport.start_api(client_id).await?;

        let server_version = transport.server_version();
        let tws_time = transport.tws_time().to_string();
        let (read_half, writer) = transport.into_split();
        let (rx, reader_handle) = MessageReader::new(read_half, server_version).spawn();

        tracing::debug!(host, port, client_id, server_version, "API session started");

        Ok((
            Self {
                writer,
                server_version,
                tws_time,
                client_id,
                connected: true,
                reader_handle: Some(reader_handle),
            },
            rx,
        ))
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn tws_time(&self) -> &str {
        &self.tws_time
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    /// False after `disconnect` or once the reader task has exited.
    pub fn is_connected(&self) -> bool {
        self.connected
            && self
                .reader_handle
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }

    pub async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.writer.shutdown().await;
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        tracing::info!(client_id = self.client_id, "disconnected from gateway");
    }

    fn encoder(&self, msg_id: i32) -> MessageEncoder {
        MessageEncoder::new(self.server_version, msg_id)
    }

    async fn send(&mut self, enc: MessageEncoder) -> Result<()> {
        if !self.connected {
            return Err(IBApiError::Disconnected("client is disconnected".into()));
        }
        let frame = enc.finish()?;
        let sent = self.writer.send_message(&frame).await;
        if sent.is_err() {
            self.connected = false;
        }
        sent
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Ask for a fresh `NextValidId`.
    pub async fn req_ids(&mut self) -> Result<()> {
        let mut enc = self.encoder(outgoing::REQ_IDS);
        enc.field(1).field(1);
        self.send(enc).await
    }

    // ========================================================================
    // Market data
    // ========================================================================

    pub async fn req_mkt_data(
        &mut self,
        ticker_id: i32,
        contract: &Contract,
        generic_ticks: &str,
        snapshot: bool,
    ) -> Result<()> {
        let sv = self.server_version;
        let mut enc = self.encoder(outgoing::REQ_MKT_DATA);
        enc.field(11).field(ticker_id).contract(contract);
        enc.field_bool(false) // no delta-neutral contract
            .field(generic_ticks)
            .field_bool(snapshot);
        if sv >= server_version::REQ_SMART_COMPONENTS {
            enc.field_bool(false); // regulatory snapshot
        }
        enc.field_empty(); // market data options
        self.send(enc).await
    }

    pub async fn cancel_mkt_data(&mut self, ticker_id: i32) -> Result<()> {
        let mut enc = self.encoder(outgoing::CANCEL_MKT_DATA);
        enc.field(2).field(ticker_id);
        self.send(enc).await
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Place a simple (non-combo, non-pegged) order.
    ///
    /// Attributes the bridge does not model go out as their gateway
    /// defaults, gated on the negotiated server version.
    pub async fn place_order(&mut self, id: i64, contract: &Contract, order: &Order) -> Result<()> {
        let sv = self.server_version;
        let mut enc = self.encoder(outgoing::PLACE_ORDER);
        if sv < server_version::ORDER_CONTAINER {
            enc.field(45);
        }
        enc.field(id).contract(contract);
        enc.field_empty().field_empty(); // secIdType, secId

        enc.field(order.action.as_ref().map(ToString::to_string).unwrap_or_default());
        if sv >= server_version::FRACTIONAL_POSITIONS {
            enc.field_max_decimal(order.total_quantity);
        } else {
            enc.field(order.total_quantity.map(|q| q.trunc()).unwrap_or_default());
        }
        enc.field(order.order_type.as_ref().map(ToString::to_string).unwrap_or_default())
            .field_max_f64(order.lmt_price)
            .field_max_f64(order.aux_price);

        enc.field(&order.tif)
            .field_empty() // ocaGroup
            .field(&order.account)
            .field_empty() // openClose
            .field(0) // origin: customer
            .field_empty() // orderRef
            .field_bool(order.transmit)
            .field(0) // parentId
            .field_bool(false) // blockOrder
            .field_bool(false) // sweepToFill
            .field(0) // displaySize
            .field(0) // triggerMethod
            .field_bool(order.outside_rth)
            .field_bool(false); // hidden

        enc.field_empty() // sharesAllocation
            .field(0) // discretionaryAmt
            .field_empty() // goodAfterTime
            .field_empty() // goodTillDate
            .field_empty() // faGroup
            .field_empty() // faMethod
            .field_empty(); // faPercentage
        if sv < server_version::FA_PROFILE_DESUPPORT {
            enc.field_empty();
        }
        if sv >= server_version::MODELS_SUPPORT {
            enc.field_empty();
        }

        enc.field(0) // shortSaleSlot
            .field_empty() // designatedLocation
            .field(-1) // exemptCode
            .field(0) // ocaType
            .field_empty() // rule80A
            .field_empty() // settlingFirm
            .field_bool(false) // allOrNone
            .field_max_i32(None) // minQty
            .field_max_f64(None) // percentOffset
            .field_bool(false) // eTradeOnly
            .field_bool(false) // firmQuoteOnly
            .field_max_f64(None); // nbboPriceCap

        enc.field(0); // auctionStrategy
        for _ in 0..5 {
            // startingPrice, stockRefPrice, delta, stockRangeLower/Upper
            enc.field_max_f64(None);
        }
        enc.field_bool(false) // overridePercentageConstraints
            .field_max_f64(None) // volatility
            .field_max_i32(None) // volatilityType
            .field_empty() // deltaNeutralOrderType
            .field_max_f64(None) // deltaNeutralAuxPrice
            .field_bool(false) // continuousUpdate
            .field_max_i32(None) // referencePriceType
            .field_max_f64(None) // trailStopPrice
            .field_max_f64(None) // trailingPercent
            .field_max_i32(None) // scaleInitLevelSize
            .field_max_i32(None) // scaleSubsLevelSize
            .field_max_f64(None) // scalePriceIncrement
            .field_empty() // scaleTable
            .field_empty() // activeStartTime
            .field_empty() // activeStopTime
            .field_empty() // hedgeType
            .field_bool(false) // optOutSmartRouting
            .field_empty() // clearingAccount
            .field_empty() // clearingIntent
            .field_bool(false) // notHeld
            .field_bool(false) // deltaNeutralContract
            .field_empty() // algoStrategy
            .field_empty() // algoId
            .field_bool(false) // whatIf
            .field_empty() // miscOptions
            .field_bool(false) // solicited
            .field_bool(false) // randomizeSize
            .field_bool(false); // randomizePrice

        if sv >= server_version::PEGGED_TO_BENCHMARK {
            enc.field(0) // conditions
                .field_empty(); // adjustedOrderType
            for _ in 0..5 {
                // trigger, lmtPriceOffset, adjustedStop, adjustedStopLimit, adjustedTrailing
                enc.field_max_f64(None);
            }
            enc.field_max_i32(None); // adjustableTrailingUnit
        }
        if sv >= server_version::EXT_OPERATOR {
            enc.field_empty();
        }
        if sv >= server_version::SOFT_DOLLAR_TIER {
            enc.field_empty().field_empty();
        }
        if sv >= server_version::CASH_QTY {
            enc.field_max_f64(None);
        }
        if sv >= server_version::DECISION_MAKER {
            enc.field_empty().field_empty();
        }
        if sv >= server_version::MIFID_EXECUTION {
            enc.field_empty().field_empty();
        }
        if sv >= server_version::AUTO_PRICE_FOR_HEDGE {
            enc.field_bool(false);
        }
        if sv >= server_version::ORDER_CONTAINER {
            enc.field_bool(false);
        }
        if sv >= server_version::D_PEG_ORDERS {
            enc.field_bool(false);
        }
        if sv >= server_version::PRICE_MGMT_ALGO {
            enc.field_max_i32(None);
        }
        if sv >= server_version::DURATION {
            enc.field_max_i32(None);
        }
        if sv >= server_version::POST_TO_ATS {
            enc.field_max_i32(None);
        }
        if sv >= server_version::AUTO_CANCEL_PARENT {
            enc.field_bool(false);
        }
        if sv >= server_version::ADVANCED_ORDER_REJECT {
            enc.field_empty();
        }
        if sv >= server_version::MANUAL_ORDER_TIME {
            enc.field_empty();
        }
        if sv >= server_version::PEGBEST_PEGMID_OFFSETS && contract.exchange == "IBKRATS" {
            enc.field_max_i32(None); // minTradeQty
        }
        if sv >= server_version::CUSTOMER_ACCOUNT {
            enc.field_empty();
        }
        if sv >= server_version::PROFESSIONAL_CUSTOMER {
            enc.field_bool(false);
        }
        if (server_version::RFQ_FIELDS..server_version::UNDO_RFQ_FIELDS).contains(&sv) {
            enc.field_empty().field_max_i32(None);
        }
        if sv >= server_version::INCLUDE_OVERNIGHT {
            enc.field_bool(false);
        }
        if sv >= server_version::CME_TAGGING_FIELDS {
            enc.field_max_i32(None); // manualOrderIndicator
        }
        if sv >= server_version::IMBALANCE_ONLY {
            enc.field_bool(false);
        }

        self.send(enc).await
    }

    pub async fn cancel_order(&mut self, id: i64) -> Result<()> {
        let sv = self.server_version;
        let mut enc = self.encoder(outgoing::CANCEL_ORDER);
        if sv < server_version::CME_TAGGING_FIELDS_IN_OPEN_ORDER {
            enc.field(1);
        }
        enc.field(id);
        if sv >= server_version::MANUAL_ORDER_TIME {
            enc.field_empty(); // manualOrderCancelTime
        }
        if (server_version::RFQ_FIELDS..server_version::UNDO_RFQ_FIELDS).contains(&sv) {
            enc.field_empty().field_empty().field_max_i32(None);
        }
        if sv >= server_version::CME_TAGGING_FIELDS {
            enc.field_empty().field_max_i32(None);
        }
        self.send(enc).await
    }

    /// Open orders placed by this client id.
    pub async fn req_open_orders(&mut self) -> Result<()> {
        let mut enc = self.encoder(outgoing::REQ_OPEN_ORDERS);
        enc.field(1);
        self.send(enc).await
    }

    /// Open orders from every client id and from TWS itself.
    pub async fn req_all_open_orders(&mut self) -> Result<()> {
        let mut enc = self.encoder(outgoing::REQ_ALL_OPEN_ORDERS);
        enc.field(1);
        self.send(enc).await
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub async fn req_positions(&mut self) -> Result<()> {
        let mut enc = self.encoder(outgoing::REQ_POSITIONS);
        enc.field(1);
        self.send(enc).await
    }

    pub async fn cancel_positions(&mut self) -> Result<()> {
        let mut enc = self.encoder(outgoing::CANCEL_POSITIONS);
        enc.field(1);
        self.send(enc).await
    }

    /// `tags` is a comma-separated list such as `"NetLiquidation,BuyingPower"`.
    pub async fn req_account_summary(&mut self, req_id: i32, group: &str, tags: &str) -> Result<()> {
        let mut enc = self.encoder(outgoing::REQ_ACCOUNT_SUMMARY);
        enc.field(1).field(req_id).field(group).field(tags);
        self.send(enc).await
    }

    pub async fn cancel_account_summary(&mut self, req_id: i32) -> Result<()> {
        let mut enc = self.encoder(outgoing::CANCEL_ACCOUNT_SUMMARY);
        enc.field(1).field(req_id);
        self.send(enc).await
    }

    // ========================================================================
    // Historical data
    // ========================================================================

    pub async fn req_historical_data(
        &mut self,
        ticker_id: i32,
        contract: &Contract,
        request: &HistoricalDataRequest,
    ) -> Result<()> {
        let sv = self.server_version;
        let mut enc = self.encoder(outgoing::REQ_HISTORICAL_DATA);
        if sv < server_version::SYNT_REALTIME_BARS {
            enc.field(6);
        }
        enc.field(ticker_id)
            .contract(contract)
            .field_bool(contract.include_expired)
            .field(&request.end_date_time)
            .field(&request.bar_size)
            .field(&request.duration)
            .field_bool(request.use_rth)
            .field(&request.what_to_show)
            .field(request.format_date);
        if sv >= server_version::SYNT_REALTIME_BARS {
            enc.field_bool(false); // keepUpToDate
        }
        enc.field_empty(); // chartOptions
        self.send(enc).await
    }

    pub async fn cancel_historical_data(&mut self, ticker_id: i32) -> Result<()> {
        let mut enc = self.encoder(outgoing::CANCEL_HISTORICAL_DATA);
        enc.field(1).field(ticker_id);
        self.send(enc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{Action, OrderType, SecType};
    use rust_decimal::Decimal;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn frame(fields: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for f in fields {
            body.extend_from_slice(f.as_bytes());
            body.push(0);
        }
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend(body);
        out
    }

    /// Gateway at `sv` that forwards every frame the client sends (as field
    /// lists) after the START_API message.
    async fn recording_gateway(sv: i32) -> (u16, UnboundedReceiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut hello = [0u8; 17];
            stream.read_exact(&mut hello).await.unwrap();
            stream.write_all(&frame(&[&sv.to_string(), "t"])).await.unwrap();
            loop {
                let mut len = [0u8; 4];
                if stream.read_exact(&mut len).await.is_err() {
                    return;
                }
                let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
                stream.read_exact(&mut body).await.unwrap();
                let mut fields: Vec<String> = body
                    .split(|&b| b == 0)
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect();
                fields.pop();
                if tx.send(fields).is_err() {
                    return;
                }
            }
        });
        (port, rx)
    }

    fn aapl() -> Contract {
        Contract::new("AAPL", SecType::Stock, "SMART", "USD")
    }

    #[tokio::test]
    async fn connect_sends_start_api() {
        let (port, mut sent) = recording_gateway(176).await;
        let (client, _events) = IBClient::connect("127.0.0.1", port, 3).await.unwrap();
        assert_eq!(client.server_version(), 176);
        assert!(client.is_connected());
        assert_eq!(sent.recv().await.unwrap(), vec!["71", "2", "3", ""]);
    }

    #[tokio::test]
    async fn market_data_request_layout() {
        let (port, mut sent) = recording_gateway(176).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        sent.recv().await.unwrap();

        client.req_mkt_data(10001, &aapl(), "", true).await.unwrap();
        let fields = sent.recv().await.unwrap();
        assert_eq!(fields.len(), 20);
        assert_eq!(&fields[..4], &["1", "11", "10001", "0"]);
        assert_eq!(fields[5], "STK");
        assert_eq!(fields[10], "SMART");
        assert_eq!(fields[12], "USD");
        assert_eq!(&fields[15..], &["0", "", "1", "0", ""][..]);
    }

    #[tokio::test]
    async fn limit_order_carries_price() {
        let (port, mut sent) = recording_gateway(176).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        sent.recv().await.unwrap();

        let order = Order {
            action: Some(Action::Buy),
            total_quantity: Some(Decimal::from(10)),
            order_type: Some(OrderType::Limit),
            lmt_price: Some(150.0),
            tif: "DAY".into(),
            ..Order::default()
        };
        client.place_order(42, &aapl(), &order).await.unwrap();
        let fields = sent.recv().await.unwrap();
        assert_eq!(fields[0], "3");
        assert_eq!(fields[1], "42");
        assert_eq!(fields[16], "BUY");
        assert_eq!(fields[17], "10");
        assert_eq!(fields[18], "LMT");
        assert_eq!(fields[19], "150");
        assert_eq!(fields[20], "");
        assert_eq!(fields[21], "DAY");
        assert_eq!(fields[27], "1"); // transmit
    }

    #[tokio::test]
    async fn cancel_order_layout_by_version() {
        let (port, mut sent) = recording_gateway(176).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        sent.recv().await.unwrap();
        client.cancel_order(42).await.unwrap();
        assert_eq!(sent.recv().await.unwrap(), vec!["4", "1", "42", ""]);

        let (port, mut sent) = recording_gateway(200).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        sent.recv().await.unwrap();
        client.cancel_order(42).await.unwrap();
        assert_eq!(sent.recv().await.unwrap(), vec!["4", "42", "", "", ""]);
    }

    #[tokio::test]
    async fn historical_and_account_requests() {
        let (port, mut sent) = recording_gateway(176).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        sent.recv().await.unwrap();

        let request = HistoricalDataRequest {
            end_date_time: String::new(),
            duration: "1 D".into(),
            bar_size: "1 hour".into(),
            what_to_show: "TRADES".into(),
            use_rth: true,
            format_date: 1,
        };
        client.req_historical_data(10003, &aapl(), &request).await.unwrap();
        let fields = sent.recv().await.unwrap();
        assert_eq!(fields[0], "20");
        assert_eq!(fields[1], "10003");
        assert_eq!(
            &fields[14..],
            &["0", "", "1 hour", "1 D", "1", "TRADES", "1", "0", ""][..]
        );

        client.req_account_summary(10004, "All", "NetLiquidation").await.unwrap();
        assert_eq!(
            sent.recv().await.unwrap(),
            vec!["62", "1", "10004", "All", "NetLiquidation"]
        );

        client.req_positions().await.unwrap();
        assert_eq!(sent.recv().await.unwrap(), vec!["61", "1"]);
    }

    #[tokio::test]
    async fn send_after_disconnect_fails() {
        let (port, _sent) = recording_gateway(176).await;
        let (mut client, _events) = IBClient::connect("127.0.0.1", port, 0).await.unwrap();
        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(matches!(
            client.req_ids().await,
            Err(IBApiError::Disconnected(_))
        ));
    }
}
