//! Persisted message types for the `MatchChat` protocol.
//!
//! A [`Message`] is the immutable record of one direct message between two
//! members. It is produced by the server's message store and shipped to
//! clients both over the REST API and inside real-time `newMessage` events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default maximum message text size in bytes.
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

/// Opaque identifier of a registered member, established by authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A persisted direct message.
///
/// Messages are immutable once stored. A message belongs to the unordered
/// pair `{sender, receiver}`; see [`Message::is_between`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Assigned by the store at persistence time.
    pub id: MessageId,
    /// Member who sent the message.
    pub sender: UserId,
    /// Member the message is addressed to.
    pub receiver: UserId,
    /// Message body, never blank.
    pub text: String,
    /// Assigned by the store; non-decreasing within one store.
    pub created_at: Timestamp,
}

impl Message {
    /// Returns `true` if this message belongs to the conversation between
    /// `a` and `b`, in either direction.
    #[must_use]
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.sender == a && &self.receiver == b) || (&self.sender == b && &self.receiver == a)
    }
}

/// A message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Sending member.
    pub sender: UserId,
    /// Receiving member.
    pub receiver: UserId,
    /// Message body.
    pub text: String,
}

/// Error returned when a message fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No sender identity was supplied.
    #[error("sender is required")]
    MissingSender,
    /// No receiver identity was supplied.
    #[error("receiver is required")]
    MissingReceiver,
    /// Message text is empty or only whitespace.
    #[error("message text is empty")]
    EmptyText,
    /// Message text exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl Draft {
    /// Creates a draft from its three parts.
    #[must_use]
    pub fn new(sender: impl Into<UserId>, receiver: impl Into<UserId>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            text: text.into(),
        }
    }

    /// Validates this draft for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingSender`] or
    /// [`ValidationError::MissingReceiver`] for blank identities,
    /// [`ValidationError::EmptyText`] for blank text, or
    /// [`ValidationError::TooLarge`] if the text exceeds `max_text_len` bytes.
    pub fn validate(&self, max_text_len: usize) -> Result<(), ValidationError> {
        if self.sender.is_blank() {
            return Err(ValidationError::MissingSender);
        }
        if self.receiver.is_blank() {
            return Err(ValidationError::MissingReceiver);
        }
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if self.text.len() > max_text_len {
            return Err(ValidationError::TooLarge {
                size: self.text.len(),
                max: max_text_len,
            });
        }
        Ok(())
    }

    /// Turns the draft into a persisted [`Message`] with the given identity
    /// and timestamp.
    #[must_use]
    pub fn into_message(self, id: MessageId, created_at: Timestamp) -> Message {
        Message {
            id,
            sender: self.sender,
            receiver: self.receiver,
            text: self.text,
            created_at,
        }
    }
}
