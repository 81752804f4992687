mod api;
mod config;
mod data;
mod error;
mod websocket;

use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::interval;
use log::{info, error};
use tower_http::cors::CorsLayer;

use crate::api::{ApiState, create_api_router};
use crate::config::{Config, STATS_INTERVAL_SECS, WS_PATH};
use crate::data::SymbolStreamRegistry;
use crate::error::ServiceError;
use crate::websocket::run_websocket_server;

async fn bind(address: &str) -> Result<TcpListener, ServiceError> {
    TcpListener::bind(address).await.map_err(|source| ServiceError::Bind {
        addr: address.to_string(),
        source,
    })
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    let registry = SymbolStreamRegistry::new(config.channel_capacity()?, config.retention_policy()?);

    start_stats_task(registry.clone());

    // Start API server
    let api_router = create_api_router(ApiState { registry: registry.clone() })
        .layer(CorsLayer::permissive());

    let api_listener = bind(&config.http_bind_address).await?;
    info!("HTTP server running at http://{}", config.http_bind_address);
    info!("Price stream: http://{}/stocks/{{symbol}}", config.http_bind_address);

    let api_server = axum::serve(api_listener, api_router);

    // Start message-socket server
    let ws_listener = bind(&config.ws_bind_address).await?;
    info!("Message socket running at ws://{}{}", config.ws_bind_address, WS_PATH);

    let websocket_server = run_websocket_server(ws_listener, registry.clone());

    let result = tokio::select! {
        result = api_server => {
            error!("API server stopped: {:?}", result);
            result.map_err(ServiceError::from)
        }
        _ = websocket_server => {
            error!("Message-socket server stopped");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    registry.shutdown();
    result
}

fn start_stats_task(registry: SymbolStreamRegistry) {
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            interval_timer.tick().await;
            let stats = registry.stats();

            if stats.symbols > 0 {
                info!("Stats - Symbols: {}, Subscribers: {}, Streams started: {}",
                      stats.symbols, stats.subscribers, stats.streams_started);
            }
        }
    });

    info!("Started stats monitoring task (every {} seconds)", STATS_INTERVAL_SECS);
}
