//! One gateway session: the request client, the dispatcher task and the
//! session store the dispatcher feeds.

use std::sync::Arc;

use ibkr_bridge_ibapi::{IBClient, IBEvent};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::errors::{BridgeError, Result};
use crate::handler::dispatch;
use crate::store::{ConnectionState, SessionStore};

pub struct GatewayConnection {
    label: String,
    host: String,
    port: u16,
    client: Mutex<IBClient>,
    store: Arc<SessionStore>,
    dispatcher: SyncMutex<Option<JoinHandle<()>>>,
}

impl GatewayConnection {
    /// Open the session and start draining it. Returns once START_API is
    /// sent; readiness arrives later as `NextValidId` and shows up in
    /// [`state`](Self::state).
    pub async fn connect(host: &str, port: u16, client_id: i32, label: &str) -> Result<Arc<Self>> {
        tracing::info!(endpoint = label, host, port, client_id, "connecting to gateway");
        let (client, events) = IBClient::connect(host, port, client_id).await?;
        tracing::info!(
            endpoint = label,
            server_version = client.server_version(),
            tws_time = client.tws_time(),
            client_id = client.client_id(),
            "handshake complete, API started"
        );

        let store = Arc::new(SessionStore::new());
        let dispatcher = spawn_dispatcher(events, Arc::clone(&store));

        Ok(Arc::new(Self {
            label: label.to_string(),
            host: host.to_string(),
            port,
            client: Mutex::new(client),
            store,
            dispatcher: SyncMutex::new(Some(dispatcher)),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn state(&self) -> ConnectionState {
        self.store.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn next_order_id(&self) -> Option<i64> {
        self.store.next_order_id()
    }

    pub fn take_order_id(&self) -> Result<i64> {
        self.store.take_order_id()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Exclusive access to the request side of the session.
    pub async fn client(&self) -> Result<MutexGuard<'_, IBClient>> {
        if self.state() == ConnectionState::Disconnected {
            return Err(BridgeError::NotConnected);
        }
        Ok(self.client.lock().await)
    }

    pub async fn disconnect(&self) {
        self.client.lock().await.disconnect().await;
        self.store.set_state(ConnectionState::Disconnected);
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        tracing::info!(endpoint = %self.label, "gateway session closed");
    }
}

/// Drain `events` into `store` until the reader task ends.
fn spawn_dispatcher(
    mut events: mpsc::UnboundedReceiver<IBEvent>,
    store: Arc<SessionStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatch(event, store.as_ref());
        }
        store.set_state(ConnectionState::Disconnected);
        tracing::debug!("dispatcher exiting (event channel closed)");
    })
}
