//! `SQLite` implementation of the document store.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio::sync::broadcast;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::core::config::StorageConfig;
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::{ConversationId, IdentityId, MessageId};
use crate::core::model::{AttachmentMeta, Conversation, Identity, Message, Preferences, Role};
use crate::store::batch::{WriteBatch, WriteOp};
use crate::store::subscription::{ChangeEvent, Subscription};
use crate::store::{
    BatchWriter, ConversationStore, IdentityStore, MessageStore, StoreFuture,
};

/// Change events buffered for slow live queries before they lag.
const CHANGE_BUFFER: usize = 256;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS identities (
        id TEXT PRIMARY KEY,
        display_name TEXT,
        email TEXT,
        avatar_url TEXT,
        created_at INTEGER NOT NULL,
        preferences_json TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        title TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        archived INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_owner
        ON conversations (owner, archived, created_at DESC);
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        conversation_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        attachments_json TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (conversation_id, created_at, seq);";

type ConversationRow = (ConversationId, IdentityId, String, i64, bool);
type MessageRow = (MessageId, String, String, i64, Option<String>);
type IdentityRow = (
    IdentityId,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    String,
);

/// Document store backed by a single `SQLite` database.
///
/// Cloning is cheap; clones share the connection and the change feed.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Connection,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database configured in `config`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn new(config: &StorageConfig) -> ChatResult<Self> {
        Self::open(&config.sqlite_path).await
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn).await
    }

    /// Private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    /// Round-trip a trivial query through the connection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn ping(&self) -> ChatResult<()> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn init(conn: Connection) -> ChatResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self { conn, changes })
    }

    fn notify(&self, event: ChangeEvent) {
        // No receivers simply means no live query is open.
        let _ = self.changes.send(event);
    }

    async fn query_conversations(
        &self,
        owner: IdentityId,
        archived: Option<bool>,
    ) -> ChatResult<Vec<Conversation>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, title, created_at, archived
                     FROM conversations
                     WHERE owner = ?1 AND (?2 IS NULL OR archived = ?2)
                     ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner, archived], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<ConversationRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(conversation_from_row).collect()
    }

    async fn query_messages(&self, conversation: ConversationId) -> ChatResult<Vec<Message>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, role, content, created_at, attachments_json
                     FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at ASC, seq ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![conversation], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<MessageRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn millis_to_datetime(ms: i64) -> ChatResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ChatError::InvalidDocument(format!("invalid timestamp {ms}")))
}

fn conversation_from_row(row: ConversationRow) -> ChatResult<Conversation> {
    let (id, owner, title, created_at, archived) = row;
    Ok(Conversation {
        id,
        owner,
        title,
        created_at: millis_to_datetime(created_at)?,
        archived,
    })
}

fn message_from_row(row: MessageRow) -> ChatResult<Message> {
    let (id, role, content, created_at, attachments) = row;
    let role: Role = role
        .parse()
        .map_err(|err| ChatError::InvalidDocument(format!("invalid role: {err}")))?;
    let attachments: Vec<AttachmentMeta> = match attachments {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    Ok(Message {
        id,
        role,
        content,
        created_at: millis_to_datetime(created_at)?,
        attachments,
    })
}

fn identity_from_row(row: IdentityRow) -> ChatResult<Identity> {
    let (id, display_name, email, avatar_url, created_at, preferences) = row;
    Ok(Identity {
        id,
        display_name,
        email,
        avatar_url,
        created_at: millis_to_datetime(created_at)?,
        preferences: serde_json::from_str(&preferences)?,
    })
}

impl IdentityStore for SqliteDocumentStore {
    fn get_identity(&self, id: &IdentityId) -> StoreFuture<'_, ChatResult<Option<Identity>>> {
        let id = id.clone();
        Box::pin(async move {
            let row: Option<IdentityRow> = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT id, display_name, email, avatar_url, created_at, preferences_json
                             FROM identities WHERE id = ?1",
                            rusqlite::params![id],
                            |row| {
                                Ok((
                                    row.get(0)?,
                                    row.get(1)?,
                                    row.get(2)?,
                                    row.get(3)?,
                                    row.get(4)?,
                                    row.get(5)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            row.map(identity_from_row).transpose()
        })
    }

    fn create_identity(&self, identity: &Identity) -> StoreFuture<'_, ChatResult<()>> {
        let identity = identity.clone();
        Box::pin(async move {
            let event = ChangeEvent::Identity(identity.id.clone());
            let preferences = serde_json::to_string(&identity.preferences)?;
            let created_at = identity.created_at.timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT OR IGNORE INTO identities
                         (id, display_name, email, avatar_url, created_at, preferences_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            identity.id,
                            identity.display_name,
                            identity.email,
                            identity.avatar_url,
                            created_at,
                            preferences
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            self.notify(event);
            Ok(())
        })
    }

    fn merge_preferences(
        &self,
        id: &IdentityId,
        preferences: &Preferences,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let id = id.clone();
        let update = preferences.clone();
        Box::pin(async move {
            let key = id.clone();
            let updated = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let current: Option<String> = tx
                        .query_row(
                            "SELECT preferences_json FROM identities WHERE id = ?1",
                            rusqlite::params![key],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let Some(current) = current else {
                        return Ok(false);
                    };
                    let mut merged: Preferences = serde_json::from_str(&current)
                        .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
                    merged.merge(&update);
                    let merged = serde_json::to_string(&merged)
                        .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
                    tx.execute(
                        "UPDATE identities SET preferences_json = ?1 WHERE id = ?2",
                        rusqlite::params![merged, key],
                    )?;
                    tx.commit()?;
                    Ok(true)
                })
                .await?;

            if updated {
                self.notify(ChangeEvent::Identity(id));
            } else {
                warn!(identity = %id, "preferences not saved: profile missing");
            }
            Ok(())
        })
    }
}

impl ConversationStore for SqliteDocumentStore {
    fn create_conversation(&self, conversation: &Conversation) -> StoreFuture<'_, ChatResult<()>> {
        let conversation = conversation.clone();
        Box::pin(async move {
            let event = ChangeEvent::Conversation {
                owner: conversation.owner.clone(),
            };
            let created_at = conversation.created_at.timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO conversations (id, owner, title, created_at, archived)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            conversation.id,
                            conversation.owner,
                            conversation.title,
                            created_at,
                            conversation.archived
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            self.notify(event);
            Ok(())
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move {
            let row: Option<ConversationRow> = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT id, owner, title, created_at, archived
                             FROM conversations WHERE id = ?1",
                            rusqlite::params![id],
                            |row| {
                                Ok((
                                    row.get(0)?,
                                    row.get(1)?,
                                    row.get(2)?,
                                    row.get(3)?,
                                    row.get(4)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            row.map(conversation_from_row).transpose()
        })
    }

    fn update_title(&self, id: ConversationId, title: &str) -> StoreFuture<'_, ChatResult<()>> {
        let title = title.to_string();
        Box::pin(async move {
            let owner: Option<IdentityId> = self
                .conn
                .call(move |conn| {
                    let owner = conn
                        .query_row(
                            "UPDATE conversations SET title = ?1 WHERE id = ?2 RETURNING owner",
                            rusqlite::params![title, id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(owner)
                })
                .await?;
            let owner = owner.ok_or(ChatError::ConversationNotFound(id))?;
            self.notify(ChangeEvent::Conversation { owner });
            Ok(())
        })
    }

    fn set_archived(
        &self,
        id: ConversationId,
        archived: bool,
    ) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let owner: Option<IdentityId> = self
                .conn
                .call(move |conn| {
                    let owner = conn
                        .query_row(
                            "UPDATE conversations SET archived = ?1 WHERE id = ?2 RETURNING owner",
                            rusqlite::params![archived, id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(owner)
                })
                .await?;
            let owner = owner.ok_or(ChatError::ConversationNotFound(id))?;
            debug!(conversation = %id, archived, "archived flag updated");
            self.notify(ChangeEvent::Conversation { owner });
            Ok(())
        })
    }

    fn list_conversations(
        &self,
        owner: &IdentityId,
        archived: Option<bool>,
    ) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
        let owner = owner.clone();
        Box::pin(self.query_conversations(owner, archived))
    }

    fn watch_conversations(
        &self,
        owner: &IdentityId,
        archived: bool,
    ) -> Subscription<Conversation> {
        let store = self.clone();
        let scope = owner.clone();
        let owner = owner.clone();
        Subscription::spawn(
            self.changes.subscribe(),
            move |event| matches!(event, ChangeEvent::Conversation { owner } if *owner == scope),
            move || {
                let store = store.clone();
                let owner = owner.clone();
                async move { store.query_conversations(owner, Some(archived)).await }
            },
        )
    }
}

impl MessageStore for SqliteDocumentStore {
    fn append_message(
        &self,
        conversation: ConversationId,
        message: &Message,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let message = message.clone();
        Box::pin(async move {
            let attachments = if message.attachments.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.attachments)?)
            };
            let created_at = message.created_at.timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO messages
                         (id, conversation_id, role, content, created_at, attachments_json)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            message.id,
                            conversation,
                            message.role.as_str(),
                            message.content,
                            created_at,
                            attachments
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            self.notify(ChangeEvent::Messages(conversation));
            Ok(())
        })
    }

    fn update_message_content(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: &str,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let content = content.to_string();
        Box::pin(async move {
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "UPDATE messages SET content = ?1 WHERE id = ?2 AND conversation_id = ?3",
                        rusqlite::params![content, message, conversation],
                    )?;
                    Ok(())
                })
                .await?;
            self.notify(ChangeEvent::Messages(conversation));
            Ok(())
        })
    }

    fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
        Box::pin(self.query_messages(conversation))
    }

    fn watch_messages(&self, conversation: ConversationId) -> Subscription<Message> {
        let store = self.clone();
        Subscription::spawn(
            self.changes.subscribe(),
            move |event| matches!(event, ChangeEvent::Messages(id) if *id == conversation),
            move || {
                let store = store.clone();
                async move { store.query_messages(conversation).await }
            },
        )
    }
}

impl BatchWriter for SqliteDocumentStore {
    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            if batch.is_empty() {
                return Ok(());
            }
            let size = batch.len();
            let ops = batch.into_ops();
            let events = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let mut events: Vec<ChangeEvent> = Vec::new();
                    for op in ops {
                        let event = match op {
                            WriteOp::DeleteMessage {
                                conversation,
                                message,
                            } => {
                                tx.execute(
                                    "DELETE FROM messages WHERE id = ?1 AND conversation_id = ?2",
                                    rusqlite::params![message, conversation],
                                )?;
                                Some(ChangeEvent::Messages(conversation))
                            }
                            WriteOp::DeleteConversation(conversation) => {
                                let owner: Option<IdentityId> = tx
                                    .query_row(
                                        "DELETE FROM conversations WHERE id = ?1 RETURNING owner",
                                        rusqlite::params![conversation],
                                        |row| row.get(0),
                                    )
                                    .optional()?;
                                owner.map(|owner| ChangeEvent::Conversation { owner })
                            }
                            WriteOp::DeleteIdentity(identity) => {
                                tx.execute(
                                    "DELETE FROM identities WHERE id = ?1",
                                    rusqlite::params![identity],
                                )?;
                                Some(ChangeEvent::Identity(identity))
                            }
                        };
                        if let Some(event) = event {
                            if !events.contains(&event) {
                                events.push(event);
                            }
                        }
                    }
                    tx.commit()?;
                    Ok(events)
                })
                .await?;

            debug!(operations = size, "batch committed");
            for event in events {
                self.notify(event);
            }
            Ok(())
        })
    }
}
