use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub team_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub reply_to_id: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Keyset position for history pagination, ordered by `(sent_at, id)`
/// descending. A page contains rows strictly older than the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub sent_at: DateTime<Utc>,
    pub id: i64,
}

impl From<&ChatMessage> for HistoryCursor {
    fn from(message: &ChatMessage) -> Self {
        Self {
            sent_at: message.sent_at,
            id: message.id,
        }
    }
}
