//! SQLite store.
//!
//! One database file with four tables:
//! - `owners`: provisioned users; conversations may only reference these
//! - `conversations`: thread records, `updated_at` advanced on every append
//! - `messages`: immutable messages, ordered by an integer rowid
//! - `user_preferences`: optional per-owner hints
//!
//! The schema is created by [`SqliteStore::migrate`]. A store opened with
//! [`SqliteStore::connect`] against an unmigrated database reports
//! `Unavailable` on every call until it is migrated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mindkeep_core::error::RepositoryError;
use mindkeep_core::message::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, MessageMetadata,
    OwnerId, Priority, Role,
};
use mindkeep_core::preference::UserPreference;
use mindkeep_core::repository::{ConversationRepository, PreferenceRepository};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A durable SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Prepare a pool for the database at `url` without touching the schema.
    ///
    /// Accepts either a `sqlite:` URL or a plain file path. `sqlite::memory:`
    /// gives an ephemeral database held by a single connection.
    ///
    /// Connections open lazily: an unreachable database only fails here when
    /// the URL itself is invalid, and every later call reports `Unavailable`.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let in_memory = url.contains(":memory:");
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .map_err(|e| RepositoryError::Unavailable(format!("Invalid SQLite URL: {e}")))?
        } else {
            SqliteConnectOptions::new().filename(url)
        }
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(4);
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_lazy_with(options);

        info!(url, "SQLite store configured");
        Ok(Self { pool })
    }

    /// Open the database and bring its schema up to date.
    pub async fn new(url: &str) -> Result<Self, RepositoryError> {
        let store = Self::connect(url).await?;
        store.migrate().await?;
        Ok(store)
    }


    /// Create tables and indexes. Idempotent.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        const SCHEMA: [(&str, &str); 5] = [
            (
                "owners table",
                r#"
                CREATE TABLE IF NOT EXISTS owners (
                    id          TEXT PRIMARY KEY,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id          TEXT PRIMARY KEY,
                    owner_id    TEXT NOT NULL REFERENCES owners(id),
                    title       TEXT NOT NULL,
                    status      TEXT NOT NULL DEFAULT 'active',
                    priority    TEXT NOT NULL DEFAULT 'normal',
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    metadata        TEXT NOT NULL DEFAULT '{}',
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_preferences table",
                r#"
                CREATE TABLE IF NOT EXISTS user_preferences (
                    owner_id                TEXT PRIMARY KEY REFERENCES owners(id),
                    response_style          TEXT NOT NULL DEFAULT 'balanced',
                    topic_interests         TEXT NOT NULL DEFAULT '[]',
                    personalization_enabled INTEGER NOT NULL DEFAULT 1,
                    cross_context_enabled   INTEGER NOT NULL DEFAULT 0
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, iid DESC)",
            ),
        ];

        for (what, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Unavailable(format!("Migration failed ({what}): {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Provision an owner. Re-adding an existing owner is a no-op.
    pub async fn add_owner(&self, owner: &OwnerId) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO owners (id, created_at) VALUES (?, ?)")
            .bind(owner.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, RepositoryError::WriteFailed))?;
        Ok(())
    }

    pub async fn set_preferences(&self, preference: &UserPreference) -> Result<(), RepositoryError> {
        let interests = serde_json::to_string(&preference.topic_interests)
            .map_err(|e| RepositoryError::WriteFailed(format!("Interests serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_preferences
                (owner_id, response_style, topic_interests, personalization_enabled, cross_context_enabled)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(preference.owner_id.as_str())
        .bind(&preference.response_style)
        .bind(interests)
        .bind(preference.personalization_enabled)
        .bind(preference.cross_context_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, RepositoryError::WriteFailed))?;
        Ok(())
    }

    pub async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, status, priority, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, RepositoryError::Unavailable))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn owner_exists(&self, owner: &OwnerId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM owners WHERE id = ?")
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, RepositoryError::Unavailable))?;
        Ok(row.is_some())
    }
}

/// Map a sqlx failure onto the repository taxonomy.
///
/// Schema and connectivity problems are `Unavailable`, decode problems are
/// `Malformed`; anything else is handed to `otherwise`.
fn classify(err: sqlx::Error, otherwise: fn(String) -> RepositoryError) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db)
            if db.message().contains("no such table")
                || db.message().contains("unable to open database") =>
        {
            RepositoryError::Unavailable(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Tls(_) => RepositoryError::Unavailable(err.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => RepositoryError::Malformed(err.to_string()),
        _ => otherwise(err.to_string()),
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::Malformed(format!("{name} column: {e}")))
}

fn timestamp(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Malformed(format!("{name} '{raw}': {e}")))
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let status: String = column(row, "status")?;
    let priority: String = column(row, "priority")?;
    Ok(Conversation {
        id: ConversationId(column(row, "id")?),
        owner_id: OwnerId(column(row, "owner_id")?),
        title: column(row, "title")?,
        status: ConversationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Malformed(format!("Unknown status '{status}'")))?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| RepositoryError::Malformed(format!("Unknown priority '{priority}'")))?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = column(row, "role")?;
    let metadata: String = column(row, "metadata")?;
    Ok(Message {
        id: MessageId(column(row, "id")?),
        conversation_id: ConversationId(column(row, "conversation_id")?),
        role: Role::parse(&role)
            .ok_or_else(|| RepositoryError::Malformed(format!("Unknown role '{role}'")))?,
        content: column(row, "content")?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| RepositoryError::Malformed(format!("metadata: {e}")))?,
        created_at: timestamp(row, "created_at")?,
    })
}

#[async_trait]
impl ConversationRepository for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        if !self.owner_exists(owner).await? {
            return Err(RepositoryError::OwnerNotFound(owner.to_string()));
        }

        let conversation = Conversation::new(owner.clone(), title);
        sqlx::query(
            r#"
            INSERT INTO conversations (id, owner_id, title, status, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation.id.as_str())
        .bind(conversation.owner_id.as_str())
        .bind(&conversation.title)
        .bind(conversation.status.as_str())
        .bind(conversation.priority.as_str())
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                RepositoryError::OwnerNotFound(owner.to_string())
            }
            _ => classify(e, RepositoryError::WriteFailed),
        })?;

        debug!(conversation = %conversation.id, owner = %owner, "Conversation created");
        Ok(conversation)
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<Message, RepositoryError> {
        let message = Message::new(conversation_id.clone(), role, content, metadata);
        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| RepositoryError::WriteFailed(format!("Metadata serialization: {e}")))?;
        let created_at = message.created_at.to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, RepositoryError::WriteFailed))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&created_at)
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, RepositoryError::WriteFailed))?;

        if touched.rows_affected() == 0 {
            return Err(RepositoryError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.as_str())
        .bind(conversation_id.as_str())
        .bind(role.as_str())
        .bind(&message.content)
        .bind(metadata_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, RepositoryError::WriteFailed))?;

        tx.commit()
            .await
            .map_err(|e| classify(e, RepositoryError::WriteFailed))?;

        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, metadata, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY iid DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(e, RepositoryError::Unavailable))?;

        let mut messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn health_check(&self) -> Result<bool, RepositoryError> {
        sqlx::query("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, RepositoryError::Unavailable))?;
        Ok(true)
    }
}

#[async_trait]
impl PreferenceRepository for SqliteStore {
    async fn get_preferences(
        &self,
        owner: &OwnerId,
    ) -> Result<Option<UserPreference>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT response_style, topic_interests, personalization_enabled, cross_context_enabled
            FROM user_preferences
            WHERE owner_id = ?
            "#,
        )
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify(e, RepositoryError::Unavailable))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let interests: String = column(&row, "topic_interests")?;
        let topic_interests: Vec<String> = serde_json::from_str(&interests).map_err(|e| {
            warn!(owner = %owner, error = %e, "Undecodable topic interests");
            RepositoryError::Malformed(format!("topic_interests: {e}"))
        })?;

        Ok(Some(UserPreference {
            owner_id: owner.clone(),
            response_style: column(&row, "response_style")?,
            topic_interests,
            personalization_enabled: column(&row, "personalization_enabled")?,
            cross_context_enabled: column(&row, "cross_context_enabled")?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        store.add_owner(&OwnerId::from("alice")).await.unwrap();
        store
    }

    fn alice() -> OwnerId {
        OwnerId::from("alice")
    }

    #[tokio::test]
    async fn unmigrated_store_is_unavailable() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let err = store.create_conversation(&alice(), "t").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)), "got {err:?}");
        assert!(store.health_check().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_database_fails_per_call_not_at_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("mindkeep.db");
        let url = format!("sqlite://{}", path.display());

        let store = SqliteStore::connect(&url).await.unwrap();
        let err = store.create_conversation(&alice(), "t").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)), "got {err:?}");
        assert!(store.health_check().await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = test_store().await;
        store.migrate().await.unwrap();
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn unknown_owner_is_rejected() {
        let store = test_store().await;
        let err = store
            .create_conversation(&OwnerId::from("mallory"), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OwnerNotFound(_)));
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = test_store().await;
        let conv = store.create_conversation(&alice(), "Q3 planning").await.unwrap();

        let loaded = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Q3 planning");
        assert_eq!(loaded.owner_id, alice());
        assert_eq!(loaded.status, ConversationStatus::Active);
        assert_eq!(loaded.priority, Priority::Normal);
    }

    #[tokio::test]
    async fn append_bumps_updated_at_and_keeps_order() {
        let store = test_store().await;
        let conv = store.create_conversation(&alice(), "t").await.unwrap();

        store
            .append_message(&conv.id, Role::User, "first", MessageMetadata::default())
            .await
            .unwrap();
        let reply = store
            .append_message(
                &conv.id,
                Role::Assistant,
                "second",
                MessageMetadata {
                    model: Some("gpt-4o-mini".into()),
                    tokens_used: Some(42),
                    latency_ms: Some(120),
                    confidence: Some(0.9),
                },
            )
            .await
            .unwrap();

        let loaded = store.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.updated_at, reply.created_at);

        let messages = store.list_recent_messages(&conv.id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].metadata.tokens_used, Some(42));
    }

    #[tokio::test]
    async fn append_to_unknown_conversation() {
        let store = test_store().await;
        let err = store
            .append_message(
                &ConversationId::from("ghost"),
                Role::User,
                "hi",
                MessageMetadata::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn recent_window_returns_tail() {
        let store = test_store().await;
        let conv = store.create_conversation(&alice(), "t").await.unwrap();
        for i in 0..8 {
            store
                .append_message(&conv.id, Role::User, &format!("m{i}"), MessageMetadata::default())
                .await
                .unwrap();
        }

        let tail = store.list_recent_messages(&conv.id, 3).await.unwrap();
        let contents: Vec<_> = tail.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m5", "m6", "m7"]);
        assert!(store.list_recent_messages(&conv.id, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_role_is_malformed() {
        let store = test_store().await;
        let conv = store.create_conversation(&alice(), "t").await.unwrap();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, metadata, created_at) VALUES ('x', ?, 'robot', 'c', '{}', ?)",
        )
        .bind(conv.id.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.list_recent_messages(&conv.id, 5).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Malformed(_)));
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let store = test_store().await;
        assert!(store.get_preferences(&alice()).await.unwrap().is_none());

        let pref = UserPreference {
            owner_id: alice(),
            response_style: "detailed".into(),
            topic_interests: vec!["hiring".into(), "roadmaps".into()],
            personalization_enabled: true,
            cross_context_enabled: true,
        };
        store.set_preferences(&pref).await.unwrap();

        assert_eq!(store.get_preferences(&alice()).await.unwrap(), Some(pref));
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindkeep.db");
        let path = path.to_str().unwrap();

        let conv_id = {
            let store = SqliteStore::new(path).await.unwrap();
            store.add_owner(&alice()).await.unwrap();
            let conv = store.create_conversation(&alice(), "t").await.unwrap();
            store
                .append_message(&conv.id, Role::User, "kept", MessageMetadata::default())
                .await
                .unwrap();
            conv.id
        };

        let reopened = SqliteStore::new(path).await.unwrap();
        let messages = reopened.list_recent_messages(&conv_id, 5).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }
}
