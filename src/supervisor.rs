//! Produces a ready gateway connection, trying the configured endpoints in
//! order. Only one attempt sequence runs at a time.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{BridgeConfig, Endpoint};
use crate::connection::GatewayConnection;
use crate::errors::{BridgeError, Result};
use crate::store::ConnectionState;

pub struct ConnectionSupervisor {
    config: BridgeConfig,
    current: RwLock<Option<Arc<GatewayConnection>>>,
    attempt_gate: Mutex<()>,
}

impl ConnectionSupervisor {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            attempt_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The held connection, if any, without connecting.
    pub fn current(&self) -> Option<Arc<GatewayConnection>> {
        self.current.read().clone()
    }

    fn live(&self) -> Option<Arc<GatewayConnection>> {
        self.current().filter(|c| c.is_connected())
    }

    /// Return the live connection, or establish one.
    pub async fn acquire(&self) -> Result<Arc<GatewayConnection>> {
        if let Some(conn) = self.live() {
            return Ok(conn);
        }

        let _gate = self.attempt_gate.lock().await;
        // Another caller may have connected while we waited for the gate.
        if let Some(conn) = self.live() {
            return Ok(conn);
        }

        let stale = self.current.write().take();
        if let Some(stale) = stale {
            tracing::info!(endpoint = stale.label(), "dropping stale connection");
            stale.disconnect().await;
        }

        let mut attempted = Vec::with_capacity(self.config.endpoints.len());
        for endpoint in &self.config.endpoints {
            attempted.push(endpoint.label.clone());
            if let Some(conn) = self.try_endpoint(endpoint).await {
                tracing::info!(
                    endpoint = %endpoint.label,
                    port = endpoint.port,
                    next_order_id = ?conn.next_order_id(),
                    "connected to IBKR"
                );
                *self.current.write() = Some(Arc::clone(&conn));
                return Ok(conn);
            }
        }

        tracing::error!(?attempted, "no gateway endpoint accepted a session");
        Err(BridgeError::ConnectionUnavailable { attempted })
    }

    async fn try_endpoint(&self, endpoint: &Endpoint) -> Option<Arc<GatewayConnection>> {
        let conn = match GatewayConnection::connect(
            &self.config.host,
            endpoint.port,
            self.config.client_id,
            &endpoint.label,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint.label, port = endpoint.port, error = %e, "connection attempt failed");
                return None;
            }
        };

        if self.wait_ready(&conn).await {
            return Some(conn);
        }
        tracing::warn!(
            endpoint = %endpoint.label,
            timeout = ?self.config.ready_timeout,
            "gateway never became ready"
        );
        conn.disconnect().await;
        None
    }

    async fn wait_ready(&self, conn: &GatewayConnection) -> bool {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            match conn.state() {
                ConnectionState::Connected => return true,
                ConnectionState::Disconnected => return false,
                ConnectionState::Connecting => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub async fn shutdown(&self) {
        let held = self.current.write().take();
        if let Some(conn) = held {
            conn.disconnect().await;
        }
    }
}
