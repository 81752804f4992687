use std::collections::HashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;
use log::{info, warn, error};

use crate::config::{OUTBOUND_QUEUE_SIZE, STOCK_PRICES_ROUTE};
use crate::data::SymbolStreamRegistry;
use crate::websocket::protocol::{ClientFrame, ServerFrame};

/// Serves one message-socket connection: any number of concurrent price
/// streams, each identified by the client-chosen stream id.
pub struct PriceSocketHandler {
    registry: SymbolStreamRegistry,
    connection_id: Uuid,
    peer_addr: String,
}

impl PriceSocketHandler {
    pub fn new(registry: SymbolStreamRegistry, peer_addr: String) -> Self {
        Self {
            registry,
            connection_id: Uuid::new_v4(),
            peer_addr,
        }
    }

    pub async fn handle_connection(self, ws_stream: WebSocketStream<TcpStream>) {
        let (write, read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_SIZE);

        info!("Message socket connected - Connection: {} from {}", self.connection_id, self.peer_addr);

        let write_task = self.spawn_write_task(write, outbound_rx);
        let read_task = self.spawn_read_task(read, outbound_tx);

        let (write_abort, read_abort) = (write_task.abort_handle(), read_task.abort_handle());
        tokio::select! {
            _ = write_task => {
                info!("Write task completed for connection {}", self.connection_id);
                read_abort.abort();
            }
            _ = read_task => {
                info!("Read task completed for connection {}", self.connection_id);
                write_abort.abort();
            }
        }

        info!("Message socket closed - Connection: {} from {}", self.connection_id, self.peer_addr);
    }

    fn spawn_write_task(
        &self,
        mut write: SplitSink<WebSocketStream<TcpStream>, Message>,
        mut outbound_rx: mpsc::Receiver<String>,
    ) -> JoinHandle<()> {
        let connection_id = self.connection_id;

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    error!("Error sending frame on connection {}: {:?}", connection_id, e);
                    break;
                }
            }
        })
    }

    fn spawn_read_task(
        &self,
        mut read: SplitStream<WebSocketStream<TcpStream>>,
        outbound_tx: mpsc::Sender<String>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let connection_id = self.connection_id;

        tokio::spawn(async move {
            // Dropping the set aborts every stream still forwarding
            let mut stream_tasks = JoinSet::new();
            let mut streams: HashMap<u64, AbortHandle> = HashMap::new();

            while let Some(msg_result) = read.next().await {
                while stream_tasks.try_join_next().is_some() {}
                streams.retain(|_, handle| !handle.is_finished());

                let msg = match msg_result {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!("WebSocket error for connection {}: {:?}", connection_id, e);
                        break;
                    }
                };

                match msg {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::RequestStream { id, route, data }) => {
                                if route != STOCK_PRICES_ROUTE {
                                    warn!("Unknown route '{}' requested on connection {}", route, connection_id);
                                    Some(ServerFrame::error(Some(id), format!("Unknown route: {}", route)))
                                } else if streams.contains_key(&id) {
                                    Some(ServerFrame::error(Some(id), "Stream id already in use"))
                                } else {
                                    let handle = stream_tasks.spawn(forward_prices(
                                        registry.clone(),
                                        id,
                                        data.clone(),
                                        outbound_tx.clone(),
                                    ));
                                    streams.insert(id, handle);
                                    info!("Connection {} opened stream {} for {}", connection_id, id, data);
                                    None
                                }
                            }
                            Ok(ClientFrame::Cancel { id }) => {
                                match streams.remove(&id) {
                                    Some(handle) => {
                                        handle.abort();
                                        info!("Connection {} cancelled stream {}", connection_id, id);
                                    }
                                    None => warn!("Cancel for unknown stream {} on connection {}", id, connection_id),
                                }
                                None
                            }
                            Err(e) => {
                                warn!("Rejected frame on connection {}: {}", connection_id, e);
                                Some(ServerFrame::error(None, format!("Invalid frame: {}", e)))
                            }
                        };

                        if let Some(frame) = reply {
                            match frame.to_json() {
                                Ok(json) => {
                                    if outbound_tx.send(json).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => error!("Failed to serialize frame: {}", e),
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Client sent close frame for connection {}", connection_id);
                        break;
                    }
                    _ => {}
                }
            }
        })
    }
}

async fn forward_prices(
    registry: SymbolStreamRegistry,
    id: u64,
    symbol: String,
    outbound_tx: mpsc::Sender<String>,
) {
    let mut subscription = registry.subscribe(&symbol);

    while let Some(sample) = subscription.next().await {
        let json = match (ServerFrame::Next { id, data: sample }).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize price for {}: {}", subscription.symbol(), e);
                break;
            }
        };

        if outbound_tx.send(json).await.is_err() {
            break;
        }
    }
}
