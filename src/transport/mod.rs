//! WebSocket transport.
//!
//! One [`SocketClient`] owns one connection at a time, run by a single
//! background task: connect, pump frames, ping on an interval, and on close
//! reconnect with exponential backoff up to a bounded attempt count. Because
//! the task owns connections sequentially, a stale connection can never
//! deliver events after a newer one has opened.
//!
//! Inbound frames that fail to decode are dropped without surfacing an
//! error; a torn frame must not take down the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::chat::{ChatEvent, ClientMessage};

/// Connection settings. Defaults match the production client: five
/// reconnect attempts from a 1s base delay and a 25s keep-alive ping.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    pub auto_reconnect: bool,
    pub base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub ping_interval: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: true,
            base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            ping_interval: Duration::from_secs(25),
        }
    }
}

/// What the consumer receives: connection lifecycle plus decoded events.
#[derive(Debug)]
pub enum SocketEvent {
    Opened,
    Closed,
    Event(ChatEvent),
}

/// Handle to the connection task. Cheap to clone into any component that
/// needs to push a message into the active conversation.
#[derive(Clone)]
pub struct SocketClient {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl SocketClient {
    /// Spawn the connection task. Events (and reconnect lifecycle) arrive
    /// on the returned receiver; the stream ends when the task gives up or
    /// is told to disconnect.
    pub fn connect(config: SocketConfig) -> (SocketClient, mpsc::UnboundedReceiver<SocketEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound, out_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(run(config, out_rx, event_tx, connected.clone(), shutdown_rx));

        (
            SocketClient {
                outbound,
                connected,
                shutdown,
            },
            event_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a frame for the open connection. Returns `false` when the
    /// socket is not open — "message not sent", not an error.
    pub fn send(&self, message: &ClientMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.outbound.send(message.to_json()).is_ok()
    }

    /// Tear down: cancels the ping interval, any pending reconnect timer,
    /// and the connection itself.
    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Delay before reconnect attempt `attempt + 1`: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

async fn run(
    config: SocketConfig,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let conn = tokio::select! {
            conn = connect_async(&config.url) => conn,
            _ = shutdown_rx.changed() => break,
        };

        match conn {
            Ok((mut ws, _)) => {
                attempt = 0;
                connected.store(true, Ordering::SeqCst);
                if event_tx.send(SocketEvent::Opened).is_err() {
                    break;
                }

                let mut ping = tokio::time::interval(config.ping_interval);
                // The first interval tick fires immediately; skip it so the
                // first ping goes out one full interval after open.
                ping.tick().await;

                loop {
                    tokio::select! {
                        inbound = ws.next() => match inbound {
                            Some(Ok(Message::Text(text))) => {
                                match ChatEvent::decode_frame(&text) {
                                    Some(event) => {
                                        if event_tx.send(SocketEvent::Event(event)).is_err() {
                                            return;
                                        }
                                    }
                                    None => debug!("dropping malformed frame"),
                                }
                            }
                            Some(Ok(Message::Close(_))) => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket read failed");
                                break;
                            }
                            None => break,
                        },
                        out = out_rx.recv() => match out {
                            Some(text) => {
                                if ws.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            // Every client handle dropped; tear down.
                            None => {
                                let _ = ws.close(None).await;
                                return;
                            }
                        },
                        _ = ping.tick() => {
                            if ws.send(Message::Text(ClientMessage::Ping.to_json())).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    }
                }

                connected.store(false, Ordering::SeqCst);
                if event_tx.send(SocketEvent::Closed).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "websocket connect failed");
                if event_tx.send(SocketEvent::Closed).is_err() {
                    break;
                }
            }
        }

        if *shutdown_rx.borrow() || !config.auto_reconnect {
            break;
        }
        if attempt >= config.max_reconnect_attempts {
            info!(
                attempts = config.max_reconnect_attempts,
                "reconnect attempts exhausted"
            );
            break;
        }

        let delay = backoff_delay(config.base_delay, attempt);
        attempt += 1;
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
}
