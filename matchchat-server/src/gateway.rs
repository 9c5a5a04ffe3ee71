//! Connection gateway: the `/ws` endpoint.
//!
//! Each accepted WebSocket gets a [`ConnectionHandle`] and two tasks: a writer
//! that drains the handle's queue into the socket, and a reader that processes
//! inbound events one at a time. The connection binds to a user with an
//! explicit `join` event; when either task ends the presence entry held by
//! this connection is released.
//!
//! Outbound messages leave through [`deliver`], which addresses exactly one
//! connection.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use matchchat_proto::event::{self, ClientEvent, SendPayload, ServerEvent};
use matchchat_proto::message::{Draft, Message, UserId};
use serde::Deserialize;

use crate::auth::bearer_token;
use crate::presence::ConnectionHandle;
use crate::server::AppState;

/// Pushes a `newMessage` event to one connection.
///
/// Returns `false` if the connection is already closed; the message stays in
/// the store either way.
pub fn deliver(handle: &ConnectionHandle, message: Message) -> bool {
    handle.send(ServerEvent::NewMessage(message))
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Bearer token for clients that cannot set headers on a WebSocket.
    pub token: Option<String>,
}

/// axum handler that authenticates (optionally) and upgrades to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Response {
    let verified = match bearer_token(&headers).or(params.token.as_deref()) {
        Some(token) => match state.auth.verify(token) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "rejected websocket upgrade");
                return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
            }
        },
        None if state.require_ws_auth => {
            tracing::warn!("rejected websocket upgrade without token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, verified))
}

/// Runs one WebSocket connection to completion.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, verified: Option<UserId>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (handle, mut rx) = ConnectionHandle::channel();
    let conn_id = handle.id();

    tracing::info!(%conn_id, verified = ?verified, "connection opened");

    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event::encode(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%conn_id, error = %e, "failed to encode outbound event");
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                tracing::warn!(%conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    let mut session = Session::new(handle.clone(), verified);
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => session.on_text(text.as_str(), &reader_state).await,
                WsMessage::Binary(_) => {
                    tracing::warn!(%conn_id, "binary frames are not supported, dropping");
                }
                WsMessage::Close(_) => {
                    tracing::info!(%conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ping/pong are answered by the protocol layer.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let offline = state.presence().leave(&handle);
    tracing::info!(%conn_id, users = ?offline, "connection closed");
}

/// Per-connection event processing.
///
/// Kept free of any socket so it can be driven directly in tests.
struct Session {
    handle: ConnectionHandle,
    verified: Option<UserId>,
    user: Option<UserId>,
}

impl Session {
    const fn new(handle: ConnectionHandle, verified: Option<UserId>) -> Self {
        Self {
            handle,
            verified,
            user: None,
        }
    }

    async fn on_text(&mut self, text: &str, state: &AppState) {
        let event = match event::decode::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(conn_id = %self.handle.id(), error = %e, "dropping malformed frame");
                return;
            }
        };

        match event {
            ClientEvent::Join(user) => self.on_join(user, state),
            ClientEvent::SendMessage(payload) => self.on_send(payload, state).await,
        }
    }

    fn on_join(&mut self, user: UserId, state: &AppState) {
        let conn_id = self.handle.id();
        if user.is_blank() {
            tracing::warn!(%conn_id, "join with empty user id, dropping");
            return;
        }
        if let Some(verified) = &self.verified
            && verified != &user
        {
            tracing::warn!(%conn_id, user_id = %user, verified = %verified, "join does not match token");
            self.reply_error(format!("connection is authenticated as {verified}"));
            return;
        }

        let presence = state.presence();
        if self.user.as_ref().is_some_and(|previous| previous != &user) {
            presence.leave(&self.handle);
        }
        if let Some(displaced) = presence.join(user.clone(), self.handle.clone())
            && displaced != self.handle
        {
            tracing::info!(
                user_id = %user,
                %conn_id,
                displaced = %displaced.id(),
                "replaced existing connection"
            );
        }

        tracing::info!(user_id = %user, %conn_id, "user joined");
        self.user = Some(user.clone());
        self.handle.send(ServerEvent::Joined(user));
    }

    async fn on_send(&self, payload: SendPayload, state: &AppState) {
        let conn_id = self.handle.id();
        let Some(sender) = self.user.clone() else {
            tracing::warn!(%conn_id, "sendMessage before join");
            self.reply_error("join before sending messages".to_string());
            return;
        };

        let SendPayload {
            sender: claimed,
            receiver,
            receiver_id,
            text,
        } = payload;
        let (Some(receiver), Some(text)) = (receiver.or(receiver_id), text) else {
            tracing::warn!(%conn_id, user_id = %sender, "sendMessage missing receiver or text, dropping");
            return;
        };
        if let Some(claimed) = claimed.filter(|claimed| claimed != &sender) {
            tracing::warn!(%conn_id, user_id = %sender, claimed = %claimed, "ignoring client-supplied sender");
        }

        if let Err(e) = state
            .router
            .send(Draft {
                sender,
                receiver,
                text,
            })
            .await
        {
            self.reply_error(e.client_reason());
        }
    }

    fn reply_error(&self, reason: String) {
        self.handle.send(ServerEvent::Error { reason });
    }
}
