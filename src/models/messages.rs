use crate::common::error::{AppError, ServiceResult};
use crate::entities::messages::ChatMessage;
use crate::entities::users::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message ids travel as strings on the wire; everything internal is `i64`.
pub fn parse_wire_id(value: &str) -> ServiceResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| AppError::InvalidInput("invalid message id"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub accent_color: Option<String>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            accent_color: user.accent_color,
        }
    }
}

/// Quoted parent rendered inline with a reply. Absent when the parent has
/// been soft-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyInfo {
    pub message_id: String,
    pub text: String,
    pub sender_display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageModel {
    pub id: String,
    pub team_id: String,
    pub sender: UserInfo,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_to: Option<ReplyInfo>,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub edited_at: Option<DateTime<Utc>>,
    pub read_status: ReadStatus,
    /// Set per recipient during fan-out.
    #[serde(rename = "isCurrentUser")]
    pub is_current_user: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_message_id: Option<String>,
}

impl ChatMessageModel {
    pub fn from_entity(
        message: ChatMessage,
        sender: UserInfo,
        reply_to: Option<ReplyInfo>,
    ) -> Self {
        Self {
            id: message.id.to_string(),
            team_id: message.team_id.to_string(),
            sender,
            text: message.content,
            reply_to,
            sent_at: message.sent_at,
            edited_at: message.edited_at,
            read_status: ReadStatus::Delivered,
            is_current_user: false,
            client_message_id: None,
        }
    }

    pub fn sender_id(&self) -> ServiceResult<i64> {
        parse_wire_id(&self.sender.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessageModel>,
    pub has_more: bool,
    pub team_id: String,
}

/// Produced by mark-as-read for each message whose sender is not the
/// reader; delivered to the sender's own connections only.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusNotification {
    pub message_id: i64,
    pub team_id: i64,
    pub sender_id: i64,
    pub reader_id: i64,
    pub status: ReadStatus,
}
