//! Error types shared by the store, the router, and the HTTP surface.

use matchchat_proto::message::ValidationError;

/// The persistence layer could not complete an operation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The SQLite backend reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file or its directory could not be prepared.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be turned back into a message.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// The blocking task running the store operation failed.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure of a send request: either it was invalid or it could not be stored.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The request is missing a field or carries unusable text.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The message could not be persisted.
    #[error("failed to store message: {0}")]
    Storage(#[from] StorageError),
}

impl MessageError {
    /// Reason suitable for showing to the client that issued the request.
    ///
    /// Storage details stay in the server log.
    #[must_use]
    pub fn client_reason(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Storage(_) => "failed to send message".to_string(),
        }
    }
}
