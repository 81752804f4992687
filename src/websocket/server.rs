use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use log::{info, warn, error};

use crate::config::WS_PATH;
use crate::data::SymbolStreamRegistry;
use crate::websocket::handler::PriceSocketHandler;

// Same pause axum::serve applies after a failed accept
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Accept message-socket connections for as long as the process runs.
pub async fn run_websocket_server(listener: TcpListener, registry: SymbolStreamRegistry) {
    info!("Ready to accept message-socket connections");

    loop {
        let (stream, addr) = accept_with_backoff(|| listener.accept()).await;
        let registry = registry.clone();
        tokio::spawn(async move {
            accept_connection(stream, addr.to_string(), registry).await;
        });
    }
}

// Accept errors such as EMFILE can repeat immediately; waiting between
// attempts keeps the loop from spinning.
async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                warn!("Failed to accept connection, retrying in {:?}: {}", ACCEPT_ERROR_BACKOFF, e);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn accept_connection(stream: TcpStream, peer_addr: String, registry: SymbolStreamRegistry) {
    let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
        let path = req.uri().path();
        if path == WS_PATH {
            Ok(response)
        } else {
            warn!("Unknown WebSocket path '{}' from {}", path, peer_addr);
            Err(not_found())
        }
    }).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {:?}", peer_addr, e);
            return;
        }
    };

    PriceSocketHandler::new(registry, peer_addr)
        .handle_connection(ws_stream)
        .await;
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Invalid WebSocket path".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
