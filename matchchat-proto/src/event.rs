//! Real-time channel events and REST request bodies.
//!
//! Real-time frames are JSON objects of the shape
//! `{"event": "<name>", "data": <payload>}`, carried in WebSocket text frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::{Message, UserId};

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Binds the connection to a user identifier.
    Join(UserId),
    /// Asks the server to persist and route a message.
    SendMessage(SendPayload),
}

/// Payload of a `sendMessage` event.
///
/// All fields are optional on the wire so that incomplete payloads can be
/// told apart from undecodable frames. The `sender` is advisory only: the
/// server always uses the identity bound to the connection, and a `sender`
/// that is not a string decodes as `None` instead of failing the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    /// Sender claimed by the client.
    #[serde(
        default,
        deserialize_with = "lenient_user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub sender: Option<UserId>,
    /// Addressed member.
    #[serde(default)]
    pub receiver: Option<UserId>,
    /// Addressed member, as spelled by the REST body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// Message body.
    #[serde(default)]
    pub text: Option<String>,
}

impl SendPayload {
    /// The addressed member, preferring `receiver` over `receiverId`.
    #[must_use]
    pub fn addressee(&self) -> Option<&UserId> {
        self.receiver.as_ref().or(self.receiver_id.as_ref())
    }
}

fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(id)) => Some(UserId::new(id)),
        _ => None,
    })
}

/// Events the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A message addressed to this connection's user.
    NewMessage(Message),
    /// Acknowledges a `join`, echoing the bound user identifier.
    Joined(UserId),
    /// A request from this connection could not be completed.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Body of `POST /api/messages`.
///
/// The sender comes from the authenticated identity, never from the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Addressed member.
    #[serde(default)]
    pub receiver_id: UserId,
    /// Message body.
    #[serde(default)]
    pub text: String,
}

/// Error type for real-time frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encodes an event into the JSON text of a WebSocket frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the event cannot be serialized.
pub fn encode<T: Serialize>(event: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes an event from the JSON text of a WebSocket frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] for malformed JSON, unknown event
/// names, or payloads of the wrong shape.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}
