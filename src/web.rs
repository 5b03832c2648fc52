//! HTTP surface: one route per tool operation.
//!
//! Tool results are returned as the JSON body with status 200, error-shaped
//! results included; an `error` field is the failure signal. Malformed
//! requests are rejected by the extractors with 4xx as usual.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::tools::{HistoricalParams, MarketDataParams, PlaceOrderParams, ToolFacade};

pub type SharedFacade = Arc<ToolFacade>;

pub fn create_router(facade: SharedFacade) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        // Connection
        .route("/api/connection/status", get(handle_connection_status))
        .route("/api/connection/connect", post(handle_connect))
        // Account
        .route("/api/account/positions", get(handle_positions))
        .route("/api/account/summary", get(handle_account_summary))
        .route("/api/account/metrics", get(handle_portfolio_metrics))
        // Market Data
        .route("/api/market/data", get(handle_market_data))
        .route("/api/market/historical", get(handle_historical_data))
        // Orders
        .route("/api/order/place", post(handle_place_order))
        .route("/api/order/cancel", post(handle_cancel_order))
        .route("/api/order/open", get(handle_open_orders))
        .route("/api/order/all", get(handle_all_orders))
        .route("/api/order/{id}", get(handle_order_status))
        .layer(CorsLayer::permissive())
        .with_state(facade)
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderBody {
    pub order_id: i64,
}

async fn handle_health(State(facade): State<SharedFacade>) -> impl IntoResponse {
    let connected = facade
        .supervisor()
        .current()
        .is_some_and(|c| c.is_connected());
    Json(serde_json::json!({
        "status": if connected { "healthy" } else { "disconnected" },
        "ibConnected": connected,
        "server": "IBKR Bridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_connection_status(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.get_connection_status())
}

async fn handle_connect(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.connect_to_ibkr().await)
}

async fn handle_positions(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.get_positions().await)
}

async fn handle_account_summary(
    State(facade): State<SharedFacade>,
    Query(q): Query<SummaryQuery>,
) -> impl IntoResponse {
    Json(facade.get_account_summary(q.tags.as_deref()).await)
}

async fn handle_portfolio_metrics(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.calculate_portfolio_metrics().await)
}

async fn handle_market_data(
    State(facade): State<SharedFacade>,
    Query(params): Query<MarketDataParams>,
) -> impl IntoResponse {
    Json(facade.get_market_data(&params).await)
}

async fn handle_historical_data(
    State(facade): State<SharedFacade>,
    Query(params): Query<HistoricalParams>,
) -> impl IntoResponse {
    Json(facade.get_historical_data(&params).await)
}

async fn handle_place_order(
    State(facade): State<SharedFacade>,
    Json(params): Json<PlaceOrderParams>,
) -> impl IntoResponse {
    Json(facade.place_order(&params).await)
}

async fn handle_cancel_order(
    State(facade): State<SharedFacade>,
    Json(body): Json<CancelOrderBody>,
) -> impl IntoResponse {
    Json(facade.cancel_order(body.order_id).await)
}

async fn handle_order_status(
    State(facade): State<SharedFacade>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    Json(facade.get_order_status(id).await)
}

async fn handle_open_orders(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.get_open_orders().await)
}

async fn handle_all_orders(State(facade): State<SharedFacade>) -> impl IntoResponse {
    Json(facade.get_all_orders().await)
}
