//! REST surface: send a message, fetch a conversation, health probe.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use matchchat_proto::event::SendMessageRequest;
use matchchat_proto::message::{Draft, Message, UserId, ValidationError};
use serde_json::json;

use crate::auth::AuthError;
use crate::error::MessageError;
use crate::server::AppState;

/// Routes served under the shared [`AppState`].
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", post(send_message))
        .route("/api/messages/{receiver_id}", get(get_messages))
        .route("/health", get(health))
}

/// The verified identity of the caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        state.auth.verify_headers(&parts.headers).map(Self)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "unauthenticated request");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Not authorized" })),
        )
            .into_response()
    }
}

/// Failures reported by the REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was incomplete or carried unusable text.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The message could not be persisted.
    #[error("Failed to send message")]
    SendFailed,
    /// The conversation could not be read.
    #[error("Failed to load messages")]
    LoadFailed,
}

impl From<MessageError> for ApiError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Validation(v) => Self::Validation(v),
            MessageError::Storage(_) => Self::SendFailed,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SendFailed | Self::LoadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(sender): AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let routed = state
        .router
        .send(Draft {
            sender,
            receiver: req.receiver_id,
            text: req.text,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(routed.message)))
}

async fn get_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(receiver_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .router
        .conversation(user, UserId::new(receiver_id))
        .await
        .map_err(|_| ApiError::LoadFailed)?;
    Ok(Json(messages))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "online": state.presence().online_count(),
    }))
}
