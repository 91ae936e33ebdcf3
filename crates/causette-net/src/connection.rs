//! WebSocket connection task with tokio mpsc command/signal pattern.
//!
//! The socket runs in a dedicated tokio task.  External code communicates
//! with it through typed command and signal channels, keeping the transport
//! fully asynchronous and decoupled from state handling.  The task owns
//! reconnection: when the socket drops it signals `Down`, waits a fixed
//! delay, and dials again until it is shut down.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use causette_shared::constants::{CHANNEL_CAPACITY, RECONNECT_DELAY_MS};
use causette_shared::protocol::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / signal types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Fire-and-forget emit.  Dropped with a warning while disconnected.
    Emit(ClientEvent),
    /// Close the socket and end the task.
    Shutdown,
}

/// Signals sent *from* the connection task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The socket is (re)established.
    Up,
    /// The socket was lost; a reconnect attempt follows automatically.
    Down,
    /// A well-formed server event arrived.
    Event(ServerEvent),
    /// A transport-level failure.  Non-fatal, reconnection continues.
    Error(String),
}

/// Configuration for the connection task.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:4000/ws`.
    pub ws_url: String,
    /// Bearer credential sent on the upgrade request.
    pub token: String,
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(ws_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token: token.into(),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

/// Errors produced while establishing a connection.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid credential header: {0}")]
    Credential(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
}

enum SocketExit {
    /// Shutdown was requested; the task must end.
    Shutdown,
    /// The socket dropped; the task should reconnect.
    Lost,
}

/// Spawn the connection task.
///
/// Returns the command sender and the signal receiver.  Dropping the command
/// sender shuts the task down, same as an explicit
/// [`TransportCommand::Shutdown`].
pub fn spawn_connection(
    config: ConnectionConfig,
) -> (
    mpsc::Sender<TransportCommand>,
    mpsc::Receiver<TransportSignal>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<TransportCommand>(CHANNEL_CAPACITY);
    let (signal_tx, signal_rx) = mpsc::channel::<TransportSignal>(CHANNEL_CAPACITY);

    tokio::spawn(run_connection(config, cmd_rx, signal_tx));

    (cmd_tx, signal_rx)
}

async fn run_connection(
    config: ConnectionConfig,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    signal_tx: mpsc::Sender<TransportSignal>,
) {
    info!(url = %config.ws_url, "Connection task started");

    loop {
        match dial(&config).await {
            Ok(ws) => {
                info!(url = %config.ws_url, "Connected");
                let _ = signal_tx.send(TransportSignal::Up).await;

                let exit = drive_socket(ws, &mut cmd_rx, &signal_tx).await;
                let _ = signal_tx.send(TransportSignal::Down).await;

                if let SocketExit::Shutdown = exit {
                    break;
                }
                warn!("Socket lost, reconnecting");
            }
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                let _ = signal_tx.send(TransportSignal::Error(e.to_string())).await;
            }
        }

        if let SocketExit::Shutdown = wait_before_retry(&mut cmd_rx, config.reconnect_delay).await {
            break;
        }
    }

    info!("Connection task terminated");
}

/// Establish the WebSocket with the bearer credential on the upgrade request.
async fn dial(config: &ConnectionConfig) -> Result<WsStream, NetError> {
    let mut request = config.ws_url.as_str().into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", config.token))?,
    );

    let (ws, _response) = connect_async(request).await?;
    Ok(ws)
}

/// Pump the live socket until it drops or shutdown is requested.
async fn drive_socket(
    ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<TransportCommand>,
    signal_tx: &mpsc::Sender<TransportSignal>,
) -> SocketExit {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Emit(event)) => {
                        let frame = match event.to_frame() {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize outbound event");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(WsMessage::text(frame)).await {
                            warn!(error = %e, "Send failed, socket lost");
                            return SocketExit::Lost;
                        }
                    }
                    Some(TransportCommand::Shutdown) | None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return SocketExit::Shutdown;
                    }
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match ServerEvent::from_frame(text.as_str()) {
                            Ok(event) => {
                                let _ = signal_tx.send(TransportSignal::Event(event)).await;
                            }
                            Err(e) => {
                                // Protocol skew tolerance: drop without mutating anything.
                                debug!(error = %e, "Dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return SocketExit::Lost;
                    }
                    Some(Ok(_)) => {
                        // Binary / ping / pong frames carry no events.
                    }
                    Some(Err(e)) => {
                        let _ = signal_tx.send(TransportSignal::Error(e.to_string())).await;
                        return SocketExit::Lost;
                    }
                }
            }
        }
    }
}

/// Sleep out the reconnect delay while still honoring commands.  Emits that
/// arrive while disconnected are dropped, not queued.
async fn wait_before_retry(
    cmd_rx: &mut mpsc::Receiver<TransportCommand>,
    delay: Duration,
) -> SocketExit {
    let deadline = tokio::time::Instant::now() + delay;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Emit(event)) => {
                        warn!(?event, "Not connected, dropping outbound event");
                    }
                    Some(TransportCommand::Shutdown) | None => return SocketExit::Shutdown,
                }
            }
            _ = tokio::time::sleep_until(deadline) => return SocketExit::Lost,
        }
    }
}
