//! Per-connection session: receive loop, writer task, cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use rolecall_core::{envelope, ClientId, Request, RouterError};
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;

/// Releases the session's registrations and queue on every exit path.
struct SessionGuard {
    client_id: ClientId,
    dispatcher: Arc<Dispatcher>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.dispatcher.disconnect(&self.client_id);
        self.dispatcher
            .metrics()
            .gauge_add("ws_connections_active", &[], -1);
        tracing::info!(client_id = %self.client_id, "WebSocket client disconnected");
    }
}

/// One accepted connection.
pub struct Session {
    client_id: ClientId,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    pub fn new(client_id: ClientId, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            client_id,
            dispatcher,
        }
    }

    /// Handle one decoded (or undecodable) inbound frame.
    ///
    /// Decode failures are logged and swallowed; the session keeps going.
    pub fn handle_frame(&self, frame: Result<Request, RouterError>) {
        self.dispatcher.clients().touch(&self.client_id);
        match frame {
            Ok(request) => {
                self.dispatcher.dispatch(&self.client_id, request);
            }
            Err(e) => {
                self.dispatcher
                    .metrics()
                    .counter_inc("decode_errors_total", &[], 1);
                tracing::warn!(
                    client_id = %self.client_id,
                    kind = e.error_kind(),
                    error = %e,
                    "Dropping undecodable message"
                );
            }
        }
    }

    /// Drive the connection until the client leaves or the transport fails.
    pub async fn run(self, socket: WebSocket, mut rx: mpsc::Receiver<String>, ping_interval: Duration) {
        let _guard = SessionGuard {
            client_id: self.client_id.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        };
        let (mut ws_tx, mut ws_rx) = socket.split();

        // Writer task: forward queued messages to the socket + periodic ping
        let writer_cid = self.client_id.clone();
        let mut writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval(ping_interval);
            ping.tick().await; // consume first immediate tick

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                            break;
                        }
                        tracing::trace!(client_id = %writer_cid, "Sent ping");
                    }
                }
            }
            let _ = ws_tx.close().await;
        });

        let reader = async {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => self.handle_frame(envelope::decode(text.as_str())),
                    Ok(WsMessage::Binary(bytes)) => self.handle_frame(envelope::decode_bytes(&bytes)),
                    Ok(WsMessage::Pong(_)) | Ok(WsMessage::Ping(_)) => {
                        self.dispatcher.clients().touch(&self.client_id);
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Err(e) => {
                        tracing::debug!(client_id = %self.client_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = &mut writer => {},
            _ = reader => {},
        }
        writer.abort();
    }
}
