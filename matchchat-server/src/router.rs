//! Message routing: validate, persist, look up presence, deliver.
//!
//! The router owns no state of its own. Persistence runs on the blocking pool,
//! so each send has a suspension point between "stored" and "delivered";
//! presence is read after the write completes.

use std::sync::Arc;

use matchchat_proto::message::{Draft, Message, UserId};

use crate::error::{MessageError, StorageError};
use crate::gateway;
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;

/// What happened to the live push of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed to the receiver's connection.
    Live,
    /// The receiver had no connection; the message waits in the store.
    Offline,
    /// The receiver's connection closed between lookup and push.
    Dropped,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// The message as persisted.
    pub message: Message,
    /// Whether it also reached the receiver live.
    pub delivery: Delivery,
}

/// Coordinates the message store and the presence registry.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
}

impl MessageRouter {
    /// Creates a router over the given store and registry.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// The presence registry this router consults.
    #[must_use]
    pub const fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Persists `draft` and pushes it to the receiver if they are online.
    ///
    /// Delivery is attempted at most once and never retried; an offline
    /// receiver is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Validation`] without touching the store if the
    /// draft is invalid, or [`MessageError::Storage`] if it could not be
    /// persisted (no delivery is attempted then).
    pub async fn send(&self, draft: Draft) -> Result<Routed, MessageError> {
        if let Err(e) = draft.validate(self.store.max_text_len()) {
            tracing::warn!(sender = %draft.sender, error = %e, "rejected invalid message");
            return Err(e.into());
        }

        let store = Arc::clone(&self.store);
        let message = match tokio::task::spawn_blocking(move || store.append(draft)).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to persist message");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(error = %e, "message store task failed");
                return Err(StorageError::from(e).into());
            }
        };

        let delivery = match self.presence.lookup(&message.receiver) {
            Some(handle) => {
                if gateway::deliver(&handle, message.clone()) {
                    Delivery::Live
                } else {
                    tracing::debug!(
                        receiver = %message.receiver,
                        conn_id = %handle.id(),
                        "receiver connection closed before delivery"
                    );
                    Delivery::Dropped
                }
            }
            None => {
                tracing::debug!(receiver = %message.receiver, "receiver offline, message stored");
                Delivery::Offline
            }
        };

        tracing::debug!(
            message_id = %message.id,
            sender = %message.sender,
            receiver = %message.receiver,
            delivery = ?delivery,
            "message routed"
        );

        Ok(Routed { message, delivery })
    }

    /// Returns the conversation between `a` and `b`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    pub async fn conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StorageError> {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.list_conversation(&a, &b)).await?;
        if let Err(e) = &result {
            tracing::error!(error = %e, "failed to load conversation");
        }
        result
    }
}
