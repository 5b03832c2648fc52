//! IBKR Bridge server.
//!
//! Exposes the bridge's tool operations over HTTP. The gateway session is
//! opened lazily by the first operation that needs it.

use std::sync::Arc;

use clap::Parser;

use ibkr_bridge::config::Args;
use ibkr_bridge::{web, ToolFacade};

fn print_banner() {
    println!("========================================");
    println!("   IBKR Bridge");
    println!("   Interactive Brokers TWS/Gateway tools");
    println!("   Version {}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!();
}

fn print_endpoints(port: u16) {
    println!("Tool endpoints:");
    println!("  Health:           GET  http://localhost:{port}/health");
    println!("  Status:           GET  http://localhost:{port}/api/connection/status");
    println!("  Connect:          POST http://localhost:{port}/api/connection/connect");
    println!("  Positions:        GET  http://localhost:{port}/api/account/positions");
    println!("  Summary:          GET  http://localhost:{port}/api/account/summary?tags=NetLiquidation");
    println!("  Metrics:          GET  http://localhost:{port}/api/account/metrics");
    println!("  Market data:      GET  http://localhost:{port}/api/market/data?symbol=SPY");
    println!("  Historical:       GET  http://localhost:{port}/api/market/historical?symbol=SPY");
    println!("  Place order:      POST http://localhost:{port}/api/order/place");
    println!("  Cancel order:     POST http://localhost:{port}/api/order/cancel");
    println!("  Open orders:      GET  http://localhost:{port}/api/order/open");
    println!("  All orders:       GET  http://localhost:{port}/api/order/all");
    println!("  Order status:     GET  http://localhost:{port}/api/order/{{id}}");
    println!();
    println!("Press Ctrl+C to stop the server...");
    println!();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    print_banner();

    let config = args.bridge_config();
    for endpoint in &config.endpoints {
        println!("Gateway candidate: {} at {}:{}", endpoint.label, config.host, endpoint.port);
    }
    println!("Client ID: {}", config.client_id);
    println!();

    let facade = Arc::new(ToolFacade::new(config));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown_tx = Arc::new(std::sync::Mutex::new(Some(shutdown_tx)));

    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, shutting down gracefully...");
        if let Some(tx) = shutdown_tx.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = tx.send(());
        }
    })
    .expect("Failed to set Ctrl+C handler");

    let app = web::create_router(Arc::clone(&facade));
    print_endpoints(args.web_port);

    let addr = format!("0.0.0.0:{}", args.web_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");

    println!("Shutting down...");
    facade.shutdown().await;
    println!("Shutdown complete. Goodbye!");
}
