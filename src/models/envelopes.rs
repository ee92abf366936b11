use crate::common::error::AppError;
use crate::models::messages::{ChatMessageModel, HistoryPage, ReadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMessageArgs {
    pub text: String,
    #[serde(default)]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditMessageArgs {
    pub message_id: String,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteMessageArgs {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkAsReadArgs {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoadHistoryArgs {
    #[serde(default)]
    pub before_message_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One decoded inbound frame. All state lives in the store; an envelope is
/// processed in isolation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEnvelope {
    NewMessage(NewMessageArgs),
    EditMessage(EditMessageArgs),
    DeleteMessage(DeleteMessageArgs),
    MarkAsRead(MarkAsReadArgs),
    LoadHistoryRequest(LoadHistoryArgs),
}

/// A frame that could not be turned into a [`ClientEnvelope`]. Carries the
/// client-supplied type tag (when one could be read) so the `error`
/// response still correlates with the client's pending action.
#[derive(Debug, PartialEq)]
pub struct DecodeFailure {
    pub original_type: Option<String>,
    pub reason: AppError,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl ClientEnvelope {
    pub fn decode(frame: &str) -> Result<Self, DecodeFailure> {
        let raw: RawEnvelope = serde_json::from_str(frame).map_err(|_| DecodeFailure {
            original_type: None,
            reason: AppError::DecodingRequestFailed,
        })?;

        let payload_error = |_| DecodeFailure {
            original_type: Some(raw.kind.clone()),
            reason: AppError::DecodingRequestFailed,
        };
        match raw.kind.as_str() {
            "new-message" => serde_json::from_value(raw.payload)
                .map(ClientEnvelope::NewMessage)
                .map_err(payload_error),
            "edit-message" => serde_json::from_value(raw.payload)
                .map(ClientEnvelope::EditMessage)
                .map_err(payload_error),
            "delete-message" => serde_json::from_value(raw.payload)
                .map(ClientEnvelope::DeleteMessage)
                .map_err(payload_error),
            "mark-as-read" => serde_json::from_value(raw.payload)
                .map(ClientEnvelope::MarkAsRead)
                .map_err(payload_error),
            "load-history-request" => serde_json::from_value(raw.payload)
                .map(ClientEnvelope::LoadHistoryRequest)
                .map_err(payload_error),
            _ => Err(DecodeFailure {
                original_type: Some(raw.kind),
                reason: AppError::InvalidInput("unknown message type"),
            }),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            ClientEnvelope::NewMessage(_) => "new-message",
            ClientEnvelope::EditMessage(_) => "edit-message",
            ClientEnvelope::DeleteMessage(_) => "delete-message",
            ClientEnvelope::MarkAsRead(_) => "mark-as-read",
            ClientEnvelope::LoadHistoryRequest(_) => "load-history-request",
        }
    }

    /// Correlation id supplied by the client, where the payload carries one.
    pub fn client_message_id(&self) -> Option<&str> {
        match self {
            ClientEnvelope::NewMessage(args) => args.client_message_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEditedPayload {
    pub id: String,
    pub team_id: String,
    pub text: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeletedPayload {
    pub id: String,
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub message_id: String,
    pub team_id: String,
    pub status: ReadStatus,
    /// The user whose read state changed (the reader).
    pub target_user: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub original_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_message_id: Option<String>,
}

/// Everything this service ever writes to a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEnvelope {
    MessageReceived(ChatMessageModel),
    MessageEdited(MessageEditedPayload),
    MessageDeleted(MessageDeletedPayload),
    StatusUpdate(StatusUpdatePayload),
    HistoryLoaded(HistoryPage),
    Error(ErrorPayload),
}

impl ServerEnvelope {
    pub fn error(reason: &AppError, original_type: &str, client_message_id: Option<&str>) -> Self {
        ServerEnvelope::Error(ErrorPayload {
            message: reason.message().to_owned(),
            original_type: original_type.to_owned(),
            client_message_id: client_message_id.map(str::to_owned),
        })
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
