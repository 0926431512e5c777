//! WebSocket connection with state management and auto-reconnect.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use mandi_shared::{ClientCommand, ServerEvent, WsEnvelope};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ConnectError, SendError};

/// Connection state for the WebSocket transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

/// Handle for sending commands through a WebSocket connection.
///
/// Cheap to clone; every auction session holds one. `send` refuses frames
/// while the transport is down instead of queueing them — a command composed
/// against a dead connection is stale by the time the socket comes back, and
/// sessions re-issue their own joins after a reconnect.
#[derive(Debug, Clone)]
pub struct WsHandle {
    sender: mpsc::UnboundedSender<WsEnvelope<ClientCommand>>,
    state: watch::Receiver<ConnectionState>,
}

impl WsHandle {
    /// Send a command to the server. Returns the envelope id, which acks and
    /// error events echo back as their nonce/correlation id.
    pub fn send(&self, cmd: ClientCommand) -> Result<String, SendError> {
        if !self.state.borrow().is_connected() {
            return Err(SendError::NotConnected);
        }
        let envelope = WsEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            payload: cmd,
            ts: Utc::now(),
            correlation_id: None,
        };
        let id = envelope.id.clone();
        self.sender
            .send(envelope)
            .map_err(|_| SendError::Closed)?;
        Ok(id)
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}

/// A managed WebSocket connection to the auction server.
///
/// The initial handshake happens inside [`WsConnection::connect`]; once that
/// succeeds a background task owns the socket and keeps it alive across
/// transport losses. Dropping the connection (or calling
/// [`disconnect`](WsConnection::disconnect)) tears the task down.
#[derive(Debug)]
pub struct WsConnection {
    sender: mpsc::UnboundedSender<WsEnvelope<ClientCommand>>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<WsEnvelope<ServerEvent>>,
    shutdown: watch::Sender<bool>,
}

const EVENT_CAPACITY: usize = 256;

impl WsConnection {
    /// Establish the transport. Fails if the endpoint is unreachable or the
    /// handshake is rejected; after success, transport loss is handled by the
    /// reconnect loop and never surfaced as an error.
    pub async fn connect(
        url: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Result<Self, ConnectError> {
        let url = url.into();
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|source| ConnectError::Handshake {
                    url: url.clone(),
                    source,
                })?;
        info!(%url, "websocket connected");

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_connection_loop(
            url,
            stream,
            reconnect,
            state_tx,
            events_tx.clone(),
            cmd_rx,
            shutdown_rx,
        ));

        Ok(Self {
            sender: cmd_tx,
            state: state_rx,
            events: events_tx,
            shutdown: shutdown_tx,
        })
    }

    /// Get a handle for sending commands.
    pub fn handle(&self) -> WsHandle {
        WsHandle {
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }

    /// Observe the connection state. The receiver sees every transition,
    /// including `Reconnecting → Connected`, which sessions use as their
    /// re-join trigger.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribe to the inbound event stream. Each subscriber sees every
    /// event; filtering by auction is the subscriber's job.
    pub fn events(&self) -> broadcast::Receiver<WsEnvelope<ServerEvent>> {
        self.events.subscribe()
    }

    /// Gracefully tear the transport down. Idempotent.
    pub async fn disconnect(&self) {
        if self.shutdown.send(true).is_err() {
            return;
        }
        let mut state = self.state.clone();
        while !matches!(
            *state.borrow(),
            ConnectionState::Disconnected | ConnectionState::Failed { .. }
        ) {
            if state.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum ServeEnd {
    Shutdown,
    TransportLost,
}

async fn run_connection_loop(
    url: String,
    first_stream: WsStream,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<WsEnvelope<ServerEvent>>,
    mut commands: mpsc::UnboundedReceiver<WsEnvelope<ClientCommand>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stream = Some(first_stream);
    let mut attempt = 0u32;

    loop {
        let ws = match stream.take() {
            Some(ws) => ws,
            None => {
                // Anything queued while we were down is stale; drop it.
                while let Ok(envelope) = commands.try_recv() {
                    warn!(id = %envelope.id, "dropping command queued while disconnected");
                }

                if reconnect.max_attempts > 0 && attempt > reconnect.max_attempts {
                    let reason =
                        format!("max reconnect attempts ({}) exceeded", reconnect.max_attempts);
                    warn!(%url, %reason, "giving up on reconnect");
                    let _ = state.send(ConnectionState::Failed { reason });
                    return;
                }

                let _ = state.send(ConnectionState::Reconnecting { attempt });
                let delay = reconnect.delay_for_attempt(attempt.saturating_sub(1));
                debug!(%url, attempt, delay_ms = delay, "reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(delay as u64)) => {}
                    _ = shutdown.changed() => {}
                }
                if *shutdown.borrow() {
                    let _ = state.send(ConnectionState::Disconnected);
                    return;
                }

                match connect_async(url.as_str()).await {
                    Ok((ws, _response)) => {
                        info!(%url, attempt, "websocket reconnected");
                        // The initial Connected is the channel's starting
                        // value; only reconnects are announced, so every
                        // observed transition into Connected means a re-join
                        // is due.
                        let _ = state.send(ConnectionState::Connected);
                        ws
                    }
                    Err(e) => {
                        warn!(%url, attempt, error = %e, "reconnect attempt failed");
                        attempt += 1;
                        continue;
                    }
                }
            }
        };

        attempt = 0;

        match serve(ws, &events, &mut commands, &mut shutdown).await {
            ServeEnd::Shutdown => {
                let _ = state.send(ConnectionState::Disconnected);
                return;
            }
            ServeEnd::TransportLost => {
                info!(%url, "websocket connection lost");
                attempt = 1;
            }
        }
    }
}

/// Pump one live socket until it closes or shutdown is requested.
async fn serve(
    ws: WsStream,
    events: &broadcast::Sender<WsEnvelope<ServerEvent>>,
    commands: &mut mpsc::UnboundedReceiver<WsEnvelope<ClientCommand>>,
    shutdown: &mut watch::Receiver<bool>,
) -> ServeEnd {
    let (mut write, mut read) = ws.split();
    let mut commands_open = true;

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                        // No subscribers is fine; events are simply unobserved.
                        Ok(envelope) => { let _ = events.send(envelope); }
                        Err(e) => warn!(error = %e, "dropping malformed server frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return ServeEnd::TransportLost,
                // Pong replies are handled by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read error");
                    return ServeEnd::TransportLost;
                }
            },
            outbound = commands.recv(), if commands_open => match outbound {
                Some(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        debug!(id = %envelope.id, "sending frame");
                        if let Err(e) = write.send(Message::text(json)).await {
                            warn!(error = %e, "websocket send failed");
                            return ServeEnd::TransportLost;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize command"),
                },
                None => commands_open = false,
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return ServeEnd::Shutdown;
                }
            }
        }
    }
}
