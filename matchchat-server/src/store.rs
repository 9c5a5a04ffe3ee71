//! Durable, ordered persistence of direct messages.
//!
//! The [`MessageStore`] trait is the append-only contract the router relies
//! on. [`MemoryStore`] keeps messages for the lifetime of the process; the
//! SQLite-backed [`crate::sqlite::SqliteStore`] survives restarts.
//!
//! Store operations are synchronous. Async callers run them on the blocking
//! pool (see [`crate::router::MessageRouter`]).

use matchchat_proto::message::{DEFAULT_MAX_TEXT_LEN, Draft, Message, MessageId, Timestamp, UserId};
use parking_lot::RwLock;

use crate::error::{MessageError, StorageError};

/// Append-only message persistence.
pub trait MessageStore: Send + Sync {
    /// Validates and persists a draft, assigning its `id` and `createdAt`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Validation`] if the draft is invalid (nothing
    /// is written), or [`MessageError::Storage`] if the write fails.
    fn append(&self, draft: Draft) -> Result<Message, MessageError>;

    /// Returns every message exchanged between `a` and `b`, in either
    /// direction, ordered by `createdAt` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn list_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StorageError>;

    /// Largest accepted message text, in bytes.
    fn max_text_len(&self) -> usize;
}

/// Picks the timestamp for the next message so that a store never goes
/// backwards, even if the wall clock does.
#[must_use]
pub fn next_timestamp(last: Option<Timestamp>) -> Timestamp {
    let now = Timestamp::now();
    last.map_or(now, |last| now.max(last))
}

/// In-memory message log; the default when no database path is configured.
///
/// Thread-safe via [`RwLock`]. Appends hold the write lock for the whole
/// assign-and-push step, so log order and `createdAt` order agree.
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
    max_text_len: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new, empty store with the default text size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_text_len(DEFAULT_MAX_TEXT_LEN)
    }

    /// Creates a new, empty store with a custom text size limit.
    #[must_use]
    pub fn with_max_text_len(max_text_len: usize) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            max_text_len,
        }
    }

    /// Total number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns `true` if nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, draft: Draft) -> Result<Message, MessageError> {
        draft.validate(self.max_text_len)?;

        let mut messages = self.messages.write();
        let created_at = next_timestamp(messages.last().map(|m| m.created_at));
        let message = draft.into_message(MessageId::new(), created_at);
        messages.push(message.clone());
        drop(messages);

        Ok(message)
    }

    fn list_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StorageError> {
        // Log order is already createdAt order.
        let messages = self.messages.read();
        Ok(messages.iter().filter(|m| m.is_between(a, b)).cloned().collect())
    }

    fn max_text_len(&self) -> usize {
        self.max_text_len
    }
}
