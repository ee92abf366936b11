use crate::entities::messages::{ChatMessage, HistoryCursor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use std::collections::HashSet;

const READ_FIELDS: &str =
    "id, team_id, sender_id, content, reply_to_id, sent_at, edited_at, deleted_at";

/// Durable storage for chat messages and read receipts. The use-case layer
/// is the only caller; nothing above it sees rows.
#[async_trait]
pub trait MessageStore: Sync + Send {
    async fn create_message(
        &self,
        team_id: i64,
        sender_id: i64,
        content: &str,
        reply_to_id: Option<i64>,
        sent_at: DateTime<Utc>,
    ) -> anyhow::Result<ChatMessage>;

    /// Fetches a message by id, soft-deleted rows included. Callers branch
    /// on `deleted_at`; a deleted row is never shown as live content.
    async fn get_message_by_id(&self, message_id: i64) -> anyhow::Result<Option<ChatMessage>>;

    async fn update_message_text(
        &self,
        message_id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn mark_deleted(&self, message_id: i64, deleted_at: DateTime<Utc>)
    -> anyhow::Result<()>;

    /// Newest-first keyset page, soft-deleted rows excluded. With a cursor,
    /// only rows strictly older than `(sent_at, id)` are returned.
    async fn get_messages_by_team(
        &self,
        team_id: i64,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> anyhow::Result<Vec<ChatMessage>>;

    /// Idempotent: a receipt that already exists is left untouched.
    async fn upsert_read_receipts(
        &self,
        reader_id: i64,
        message_ids: &[i64],
        read_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// The subset of `message_ids` the reader has receipts for.
    async fn get_read_status(
        &self,
        reader_id: i64,
        message_ids: &[i64],
    ) -> anyhow::Result<HashSet<i64>>;
}

#[derive(Clone)]
pub struct MySqlMessageStore {
    db: Pool<MySql>,
}

impl MySqlMessageStore {
    pub fn new(db: Pool<MySql>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for MySqlMessageStore {
    async fn create_message(
        &self,
        team_id: i64,
        sender_id: i64,
        content: &str,
        reply_to_id: Option<i64>,
        sent_at: DateTime<Utc>,
    ) -> anyhow::Result<ChatMessage> {
        const QUERY: &str = const_str::concat!(
            "INSERT INTO chat_messages (team_id, sender_id, content, reply_to_id, sent_at) ",
            "VALUES (?, ?, ?, ?, ?)"
        );
        let result = sqlx::query(QUERY)
            .bind(team_id)
            .bind(sender_id)
            .bind(content)
            .bind(reply_to_id)
            .bind(sent_at)
            .execute(&self.db)
            .await?;
        let message_id = result.last_insert_id() as i64;
        Ok(ChatMessage {
            id: message_id,
            team_id,
            sender_id,
            content: content.to_owned(),
            reply_to_id,
            sent_at,
            edited_at: None,
            deleted_at: None,
        })
    }

    async fn get_message_by_id(&self, message_id: i64) -> anyhow::Result<Option<ChatMessage>> {
        const QUERY: &str =
            const_str::concat!("SELECT ", READ_FIELDS, " FROM chat_messages WHERE id = ?");
        let message = sqlx::query_as(QUERY)
            .bind(message_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(message)
    }

    async fn update_message_text(
        &self,
        message_id: i64,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        const QUERY: &str = "UPDATE chat_messages SET content = ?, edited_at = ? WHERE id = ?";
        sqlx::query(QUERY)
            .bind(content)
            .bind(edited_at)
            .bind(message_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn mark_deleted(
        &self,
        message_id: i64,
        deleted_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        const QUERY: &str = const_str::concat!(
            "UPDATE chat_messages SET deleted_at = ? ",
            "WHERE id = ? AND deleted_at IS NULL"
        );
        sqlx::query(QUERY)
            .bind(deleted_at)
            .bind(message_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn get_messages_by_team(
        &self,
        team_id: i64,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let messages = match before {
            Some(cursor) => {
                const QUERY: &str = const_str::concat!(
                    "SELECT ",
                    READ_FIELDS,
                    " FROM chat_messages ",
                    "WHERE team_id = ? AND deleted_at IS NULL AND (sent_at, id) < (?, ?) ",
                    "ORDER BY sent_at DESC, id DESC LIMIT ?"
                );
                sqlx::query_as(QUERY)
                    .bind(team_id)
                    .bind(cursor.sent_at)
                    .bind(cursor.id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?
            }
            None => {
                const QUERY: &str = const_str::concat!(
                    "SELECT ",
                    READ_FIELDS,
                    " FROM chat_messages ",
                    "WHERE team_id = ? AND deleted_at IS NULL ",
                    "ORDER BY sent_at DESC, id DESC LIMIT ?"
                );
                sqlx::query_as(QUERY)
                    .bind(team_id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?
            }
        };
        Ok(messages)
    }

    async fn upsert_read_receipts(
        &self,
        reader_id: i64,
        message_ids: &[i64],
        read_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        const QUERY: &str = const_str::concat!(
            "INSERT IGNORE INTO chat_read_receipts (message_id, reader_id, read_at) ",
            "VALUES (?, ?, ?)"
        );
        for message_id in message_ids {
            sqlx::query(QUERY)
                .bind(message_id)
                .bind(reader_id)
                .bind(read_at)
                .execute(&self.db)
                .await?;
        }
        Ok(())
    }

    async fn get_read_status(
        &self,
        reader_id: i64,
        message_ids: &[i64],
    ) -> anyhow::Result<HashSet<i64>> {
        if message_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let query = format!(
            "SELECT message_id FROM chat_read_receipts WHERE reader_id = ? AND message_id IN ({placeholders})"
        );
        let mut statement = sqlx::query_scalar(&query).bind(reader_id);
        for message_id in message_ids {
            statement = statement.bind(message_id);
        }
        let read_ids: Vec<i64> = statement.fetch_all(&self.db).await?;
        Ok(read_ids.into_iter().collect())
    }
}
