//! SQLite-backed [`MessageStore`].
//!
//! One connection, guarded by a mutex. The last issued timestamp lives under
//! the same mutex so `createdAt` stays non-decreasing across appends and
//! across restarts (it is reloaded from the table on open).

use std::path::Path;

use matchchat_proto::message::{DEFAULT_MAX_TEXT_LEN, Draft, Message, MessageId, Timestamp, UserId};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::{MessageError, StorageError};
use crate::store::{MessageStore, next_timestamp};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT    NOT NULL UNIQUE,
    sender     TEXT    NOT NULL,
    receiver   TEXT    NOT NULL,
    text       TEXT    NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender, receiver, created_at);
";

struct Inner {
    conn: Connection,
    last: Option<Timestamp>,
}

/// File-backed message store.
pub struct SqliteStore {
    inner: Mutex<Inner>,
    max_text_len: usize,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, max_text_len: usize) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tracing::info!(dir = %parent.display(), "creating database directory");
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, max_text_len)
    }

    /// Opens a private in-memory database. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_MAX_TEXT_LEN)
    }

    fn from_connection(conn: Connection, max_text_len: usize) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        let last: Option<i64> =
            conn.query_row("SELECT MAX(created_at) FROM messages", [], |row| row.get(0))?;
        let last = last.map(|ms| Timestamp::from_millis(u64::try_from(ms).unwrap_or_default()));

        Ok(Self {
            inner: Mutex::new(Inner { conn, last }),
            max_text_len,
        })
    }
}

impl MessageStore for SqliteStore {
    fn append(&self, draft: Draft) -> Result<Message, MessageError> {
        draft.validate(self.max_text_len)?;

        let mut inner = self.inner.lock();
        let created_at = next_timestamp(inner.last);
        let message = draft.into_message(MessageId::new(), created_at);
        inner
            .conn
            .execute(
                "INSERT INTO messages (id, sender, receiver, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    message.sender.as_str(),
                    message.receiver.as_str(),
                    message.text,
                    i64::try_from(created_at.as_millis()).unwrap_or(i64::MAX),
                ],
            )
            .map_err(StorageError::from)?;
        inner.last = Some(created_at);
        drop(inner);

        Ok(message)
    }

    fn list_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StorageError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT id, sender, receiver, text, created_at
             FROM messages
             WHERE (sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1)
             ORDER BY created_at ASC, seq ASC",
        )?;

        let rows = stmt
            .query_map(params![a.as_str(), b.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, sender, receiver, text, created_at)| -> Result<Message, StorageError> {
                let id = Uuid::parse_str(&id)
                    .map_err(|e| StorageError::CorruptRow(format!("message id {id}: {e}")))?;
                Ok(Message {
                    id: MessageId::from_uuid(id),
                    sender: UserId::new(sender),
                    receiver: UserId::new(receiver),
                    text,
                    created_at: Timestamp::from_millis(u64::try_from(created_at).unwrap_or_default()),
                })
            })
            .collect()
    }

    fn max_text_len(&self) -> usize {
        self.max_text_len
    }
}
