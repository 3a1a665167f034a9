//! Remote session manager
//!
//! Maintains the outbound WebSocket session to the control plane:
//! acquires a bearer token, connects, announces itself with a
//! `service-info` frame, serves framed requests, and reconnects with
//! bounded exponential backoff. `shutdown` closes the socket with code
//! 1000 and prevents any further reconnect.

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, instrument, warn};

use crate::dispatch::Dispatcher;
use crate::error::{SessionError, SessionResult};
use crate::frames::{parse_frame, InboundFrame, OutboundFrame, WireError};
use crate::token::TokenProvider;

/// Initial reconnect delay.
const INITIAL_BACKOFF: Duration = Duration::from_millis(1_000);
/// Reconnect delay cap.
const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Control-plane WebSocket URL.
    pub server_url: String,
    /// Service name announced in the `service-info` frame.
    pub service_name: String,
}

/// The outbound control-plane session.
pub struct SessionManager {
    config: SessionConfig,
    tokens: Arc<TokenProvider>,
    dispatcher: Arc<Dispatcher>,
    started_at: DateTime<Utc>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a session manager. Call [`SessionManager::start`] to
    /// connect.
    #[must_use]
    pub fn new(config: SessionConfig, tokens: Arc<TokenProvider>, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            tokens,
            dispatcher,
            started_at: Utc::now(),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Populate the facade map and spawn the connection loop.
    pub async fn start(self: &Arc<Self>) {
        self.dispatcher.prepopulate().await;

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run_loop().await;
        });
        *self.task.lock().await = Some(handle);

        info!(server_url = %self.config.server_url, "remote session started");
    }

    /// Stop the session: cancel any pending reconnect, close the socket
    /// with code 1000 and reason "shutdown", and prevent further
    /// dispatch.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.task.lock().await.take() {
            if handle.await.is_err() {
                warn!("session task ended abnormally during shutdown");
            }
        }
        info!("remote session stopped");
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    async fn run_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if self.is_shutdown() {
                return;
            }

            match self.connect_once(&mut shutdown_rx, &mut backoff).await {
                Ok(()) => {
                    // Orderly close from the session itself.
                    if self.is_shutdown() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, delay_ms = backoff.as_millis() as u64, "session connection failed, scheduling reconnect");
                }
            }

            // Single scheduled reconnect: this loop is the only place a
            // new connection attempt originates.
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown_rx.changed() => return,
            }
            backoff = next_backoff(backoff, MAX_BACKOFF);
        }
    }

    #[instrument(skip(self, shutdown_rx, backoff), fields(server_url = %self.config.server_url))]
    async fn connect_once(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
        backoff: &mut Duration,
    ) -> SessionResult<()> {
        let token = self.tokens.get_token().await?;

        let mut request = self
            .config
            .server_url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::transport_with_source("invalid server url", e))?;
        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SessionError::transport_with_source("invalid bearer token", e))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(WsError::Http(response)) => {
                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    // The token was rejected at the upgrade; force a
                    // refresh before the next attempt.
                    self.tokens.invalidate().await;
                }
                return Err(SessionError::transport(format!(
                    "websocket upgrade rejected with status {status}"
                )));
            }
            Err(e) => {
                return Err(SessionError::transport_with_source("websocket connect failed", e));
            }
        };

        info!("connected to control plane");
        // Successful open resets the reconnect delay.
        *backoff = INITIAL_BACKOFF;
        let (mut write, mut read) = stream.split();

        let service_info = OutboundFrame::ServiceInfo {
            service: self.config.service_name.clone(),
            started_at: self.started_at,
            connectors: self.dispatcher.connector_ids().await,
        };
        write
            .send(Message::Text(service_info.to_json()))
            .await
            .map_err(|e| SessionError::transport_with_source("failed to send service-info", e))?;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "shutdown".into(),
                    }));
                    let _ = write.send(close).await;
                    return Ok(());
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_text(&text).await {
                                write
                                    .send(Message::Text(reply))
                                    .await
                                    .map_err(|e| SessionError::transport_with_source("failed to send reply", e))?;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            // Protocol pings are answered with pongs
                            // carrying the same payload.
                            write
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|e| SessionError::transport_with_source("failed to send pong", e))?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "server closed the connection");
                            return Err(SessionError::transport("connection closed by server"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(SessionError::transport_with_source("websocket receive failed", e));
                        }
                        None => {
                            return Err(SessionError::transport("connection stream ended"));
                        }
                    }
                }
            }
        }
    }

    /// Handle one inbound text frame, returning the serialized reply when
    /// one is due.
    pub(crate) async fn handle_text(&self, text: &str) -> Option<String> {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame");
                return None;
            }
        };

        match frame {
            InboundFrame::Ping { request_id } => Some(
                OutboundFrame::Pong {
                    request_id,
                    timestamp: Utc::now(),
                    connectors: self.dispatcher.connector_ids().await,
                }
                .to_json(),
            ),

            InboundFrame::ListConnectors { request_id } => Some(
                OutboundFrame::Connectors {
                    request_id,
                    connectors: self.dispatcher.connector_ids().await,
                }
                .to_json(),
            ),

            InboundFrame::Operation(request) => {
                let Some(request_id) = request.request_id else {
                    warn!("operation frame has no requestId, ignoring");
                    return None;
                };

                let Some(connector_id) = request.connector_id else {
                    let err = SessionError::from(
                        portico_connector::error::ConnectorError::validation(
                            "operation frame requires 'connectorId'",
                        ),
                    );
                    return Some(OutboundFrame::failure(request_id, &err).to_json());
                };

                let Some(operation) = request.operation else {
                    let err = SessionError::from(
                        portico_connector::error::ConnectorError::validation(format!(
                            "unknown operation '{}'",
                            request.operation_raw.as_deref().unwrap_or("")
                        )),
                    );
                    return Some(OutboundFrame::failure(request_id, &err).to_json());
                };

                debug!(connector_id = %connector_id, operation = %operation, "dispatching operation");
                let reply = match self
                    .dispatcher
                    .dispatch(&connector_id, operation, &request.payload)
                    .await
                {
                    Ok(result) => OutboundFrame::success(request_id, result),
                    Err(e) => {
                        warn!(connector_id = %connector_id, operation = %operation, error = %e, "operation failed");
                        OutboundFrame::failure(request_id, &e)
                    }
                };
                Some(reply.to_json())
            }

            InboundFrame::Unknown {
                frame_type,
                request_id,
            } => match request_id {
                Some(request_id) => Some(
                    OutboundFrame::Error {
                        request_id,
                        error: WireError {
                            message: format!("unknown frame type '{frame_type}'"),
                            name: "ProtocolError".to_string(),
                        },
                    }
                    .to_json(),
                ),
                None => {
                    warn!(frame_type = %frame_type, "ignoring unknown frame without requestId");
                    None
                }
            },
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("server_url", &self.config.server_url)
            .finish()
    }
}

/// Doubling backoff bounded by `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
