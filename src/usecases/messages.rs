use crate::common::context::Context;
use crate::common::error::{AppError, ServiceResult, unexpected};
use crate::entities::messages::{ChatMessage, HistoryCursor};
use crate::models::envelopes::{MessageDeletedPayload, MessageEditedPayload};
use crate::models::messages::{
    ChatMessageModel, HistoryPage, ReadStatus, ReplyInfo, StatusNotification, UserInfo,
};
use crate::repositories::notifications::NotificationEvent;
use chrono::Utc;
use tracing::warn;

const MAX_MESSAGE_LENGTH: usize = 4096;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 100;

fn validate_content(text: &str) -> ServiceResult<()> {
    let length = text.chars().count();
    if length == 0 || length > MAX_MESSAGE_LENGTH {
        return Err(AppError::InvalidInput(
            "message text must be between 1 and 4096 characters",
        ));
    }
    Ok(())
}

async fn require_membership<C: Context>(ctx: &C, user_id: i64, team_id: i64) -> ServiceResult<()> {
    match ctx.memberships().is_member(user_id, team_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::TeamsAccessDenied),
        Err(e) => unexpected(e),
    }
}

async fn require_user<C: Context>(ctx: &C, user_id: i64) -> ServiceResult<UserInfo> {
    match ctx.users().get_user(user_id).await {
        Ok(Some(user)) => Ok(user.into()),
        Ok(None) => Err(AppError::UsersNotFound),
        Err(e) => unexpected(e),
    }
}

/// Builds the quoted parent for a reply. A soft-deleted parent (or one
/// whose author no longer resolves) produces no quote rather than an error.
async fn resolve_reply<C: Context>(
    ctx: &C,
    team_id: i64,
    reply_to_id: Option<i64>,
) -> ServiceResult<Option<ReplyInfo>> {
    let Some(parent_id) = reply_to_id else {
        return Ok(None);
    };
    let parent = match ctx.store().get_message_by_id(parent_id).await {
        Ok(parent) => parent,
        Err(e) => return unexpected(e),
    };
    let Some(parent) = parent.filter(|p| p.team_id == team_id) else {
        return Ok(None);
    };
    if parent.is_deleted() {
        return Ok(None);
    }
    let sender = match ctx.users().get_user(parent.sender_id).await {
        Ok(sender) => sender,
        Err(e) => return unexpected(e),
    };
    Ok(sender.map(|sender| ReplyInfo {
        message_id: parent.id.to_string(),
        text: parent.content,
        sender_display_name: sender.display_name,
    }))
}

/// Looks up a live message belonging to `team_id` for mutation by
/// `user_id`. Sender-only; an admin override would slot in here.
async fn require_own_message<C: Context>(
    ctx: &C,
    user_id: i64,
    team_id: i64,
    message_id: i64,
) -> ServiceResult<ChatMessage> {
    let message = match ctx.store().get_message_by_id(message_id).await {
        Ok(message) => message,
        Err(e) => return unexpected(e),
    };
    let Some(message) = message.filter(|m| m.team_id == team_id) else {
        return Err(AppError::MessagesNotFound);
    };
    if message.is_deleted() {
        return Err(AppError::MessagesAlreadyDeleted);
    }
    if message.sender_id != user_id {
        return Err(AppError::MessagesAccessDenied);
    }
    Ok(message)
}

pub async fn send<C: Context>(
    ctx: &C,
    sender_id: i64,
    team_id: i64,
    text: &str,
    reply_to_id: Option<i64>,
) -> ServiceResult<ChatMessageModel> {
    validate_content(text)?;
    require_membership(ctx, sender_id, team_id).await?;

    // The parent must exist in this team. A parent deleted since the
    // client saw it is still a valid target; the reply is persisted with
    // the link but rendered without the quote.
    let reply_to = match reply_to_id {
        Some(parent_id) => {
            let parent = match ctx.store().get_message_by_id(parent_id).await {
                Ok(parent) => parent,
                Err(e) => return unexpected(e),
            };
            let Some(parent) = parent.filter(|p| p.team_id == team_id) else {
                return Err(AppError::MessagesNotFound);
            };
            if parent.is_deleted() {
                None
            } else {
                let parent_sender = require_user(ctx, parent.sender_id).await?;
                Some(ReplyInfo {
                    message_id: parent.id.to_string(),
                    text: parent.content,
                    sender_display_name: parent_sender.display_name,
                })
            }
        }
        None => None,
    };

    let sender = require_user(ctx, sender_id).await?;
    let message = match ctx
        .store()
        .create_message(team_id, sender_id, text, reply_to_id, Utc::now())
        .await
    {
        Ok(message) => message,
        Err(e) => return unexpected(e),
    };

    let event = NotificationEvent::NewMessage {
        team_id,
        sender_id,
        message_id: message.id,
    };
    if let Err(e) = ctx.notifications().dispatch(event).await {
        warn!("Failed to dispatch new-message notification: {e}");
    }

    Ok(ChatMessageModel::from_entity(message, sender, reply_to))
}

pub async fn edit<C: Context>(
    ctx: &C,
    user_id: i64,
    team_id: i64,
    message_id: i64,
    new_text: &str,
) -> ServiceResult<MessageEditedPayload> {
    validate_content(new_text)?;
    require_membership(ctx, user_id, team_id).await?;
    require_own_message(ctx, user_id, team_id, message_id).await?;

    let edited_at = Utc::now();
    match ctx
        .store()
        .update_message_text(message_id, new_text, edited_at)
        .await
    {
        Ok(()) => Ok(MessageEditedPayload {
            id: message_id.to_string(),
            team_id: team_id.to_string(),
            text: new_text.to_owned(),
            edited_at,
        }),
        Err(e) => unexpected(e),
    }
}

pub async fn delete<C: Context>(
    ctx: &C,
    user_id: i64,
    team_id: i64,
    message_id: i64,
) -> ServiceResult<MessageDeletedPayload> {
    require_membership(ctx, user_id, team_id).await?;
    require_own_message(ctx, user_id, team_id, message_id).await?;

    // The row is retained; history reads filter on the deletion timestamp.
    match ctx.store().mark_deleted(message_id, Utc::now()).await {
        Ok(()) => Ok(MessageDeletedPayload {
            id: message_id.to_string(),
            team_id: team_id.to_string(),
        }),
        Err(e) => unexpected(e),
    }
}

pub async fn mark_as_read<C: Context>(
    ctx: &C,
    reader_id: i64,
    team_id: i64,
    message_ids: &[i64],
) -> ServiceResult<Vec<StatusNotification>> {
    if message_ids.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one message id is required",
        ));
    }

    // Ids that do not resolve to a live message of this team are skipped,
    // not failed: the client may race a delete.
    let mut affected = Vec::with_capacity(message_ids.len());
    for &message_id in message_ids {
        let message = match ctx.store().get_message_by_id(message_id).await {
            Ok(message) => message,
            Err(e) => return unexpected(e),
        };
        if let Some(message) = message.filter(|m| m.team_id == team_id && !m.is_deleted()) {
            affected.push(message);
        }
    }
    if affected.is_empty() {
        return Ok(Vec::new());
    }

    let affected_ids: Vec<i64> = affected.iter().map(|m| m.id).collect();
    if let Err(e) = ctx
        .store()
        .upsert_read_receipts(reader_id, &affected_ids, Utc::now())
        .await
    {
        return unexpected(e);
    }

    let notifications = affected
        .into_iter()
        .filter(|message| message.sender_id != reader_id)
        .map(|message| StatusNotification {
            message_id: message.id,
            team_id: message.team_id,
            sender_id: message.sender_id,
            reader_id,
            status: ReadStatus::Read,
        })
        .collect();
    Ok(notifications)
}

pub async fn history<C: Context>(
    ctx: &C,
    user_id: i64,
    team_id: i64,
    before_message_id: Option<i64>,
    limit: Option<u32>,
) -> ServiceResult<HistoryPage> {
    require_membership(ctx, user_id, team_id).await?;

    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(AppError::InvalidInput("limit must be between 1 and 100"));
    }

    let before = match before_message_id {
        Some(cursor_id) => {
            let cursor = match ctx.store().get_message_by_id(cursor_id).await {
                Ok(cursor) => cursor,
                Err(e) => return unexpected(e),
            };
            // A deleted message still anchors the keyset position.
            match cursor.filter(|m| m.team_id == team_id) {
                Some(message) => Some(HistoryCursor::from(&message)),
                None => return Err(AppError::MessagesNotFound),
            }
        }
        None => None,
    };

    // One extra row tells us whether an older page exists.
    let mut rows = match ctx
        .store()
        .get_messages_by_team(team_id, before, limit + 1)
        .await
    {
        Ok(rows) => rows,
        Err(e) => return unexpected(e),
    };
    let has_more = rows.len() > limit as usize;
    rows.truncate(limit as usize);
    // Newest-first from the store; the page reads oldest-first.
    rows.reverse();

    let row_ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
    let read_ids = match ctx.store().get_read_status(user_id, &row_ids).await {
        Ok(read_ids) => read_ids,
        Err(e) => return unexpected(e),
    };

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let sender = require_user(ctx, row.sender_id).await?;
        let reply_to = resolve_reply(ctx, team_id, row.reply_to_id).await?;
        let is_current_user = row.sender_id == user_id;
        let read_status = if read_ids.contains(&row.id) {
            ReadStatus::Read
        } else {
            ReadStatus::Delivered
        };
        let mut model = ChatMessageModel::from_entity(row, sender, reply_to);
        model.is_current_user = is_current_user;
        model.read_status = read_status;
        messages.push(model);
    }

    Ok(HistoryPage {
        messages,
        has_more,
        team_id: team_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::User;
    use crate::repositories::memory::MemoryContext;

    const TEAM: i64 = 7;
    const ALICE: i64 = 1;
    const BOB: i64 = 2;

    fn user(id: i64, display_name: &str) -> User {
        User {
            id,
            display_name: display_name.to_owned(),
            avatar_url: None,
            accent_color: None,
        }
    }

    async fn team_context() -> MemoryContext {
        let ctx = MemoryContext::new();
        ctx.join_team(user(ALICE, "Alice"), TEAM).await;
        ctx.join_team(user(BOB, "Bob"), TEAM).await;
        ctx
    }

    #[tokio::test]
    async fn send_requires_team_membership() {
        let ctx = team_context().await;
        let outsider = 99;
        let result = send(&ctx, outsider, TEAM, "hi", None).await;
        assert_eq!(result.unwrap_err(), AppError::TeamsAccessDenied);
    }

    #[tokio::test]
    async fn send_persists_and_enriches_with_sender_info() {
        let ctx = team_context().await;
        ctx.store.set_next_message_id(101);

        let message = send(&ctx, ALICE, TEAM, "hi", None).await.unwrap();

        assert_eq!(message.id, "101");
        assert_eq!(message.team_id, "7");
        assert_eq!(message.sender.display_name, "Alice");
        assert_eq!(message.text, "hi");
        assert_eq!(message.edited_at, None);

        let events = ctx.notifications.events().await;
        assert_eq!(events.len(), 1);

        let stored = ctx.store().get_message_by_id(101).await.unwrap().unwrap();
        assert_eq!(stored.sender_id, ALICE);
        assert!(!stored.is_deleted());
    }

    #[tokio::test]
    async fn send_rejects_empty_and_oversized_text() {
        let ctx = team_context().await;
        assert!(matches!(
            send(&ctx, ALICE, TEAM, "", None).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
        let oversized = "x".repeat(4097);
        assert!(matches!(
            send(&ctx, ALICE, TEAM, &oversized, None).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
        // Boundary: exactly 4096 characters is fine.
        let max = "x".repeat(4096);
        assert!(send(&ctx, ALICE, TEAM, &max, None).await.is_ok());
    }

    #[tokio::test]
    async fn reply_carries_the_quoted_parent() {
        let ctx = team_context().await;
        let parent = send(&ctx, ALICE, TEAM, "parent", None).await.unwrap();
        let parent_id = parent.id.parse::<i64>().unwrap();

        let reply = send(&ctx, BOB, TEAM, "child", Some(parent_id)).await.unwrap();
        let quote = reply.reply_to.unwrap();
        assert_eq!(quote.message_id, parent.id);
        assert_eq!(quote.text, "parent");
        assert_eq!(quote.sender_display_name, "Alice");
    }

    #[tokio::test]
    async fn reply_to_deleted_parent_is_created_without_quote() {
        let ctx = team_context().await;
        let parent = send(&ctx, ALICE, TEAM, "parent", None).await.unwrap();
        let parent_id = parent.id.parse::<i64>().unwrap();
        delete(&ctx, ALICE, TEAM, parent_id).await.unwrap();

        let reply = send(&ctx, BOB, TEAM, "child", Some(parent_id)).await.unwrap();
        assert_eq!(reply.reply_to, None);
    }

    #[tokio::test]
    async fn reply_to_unknown_parent_is_not_found() {
        let ctx = team_context().await;
        let result = send(&ctx, ALICE, TEAM, "child", Some(404)).await;
        assert_eq!(result.unwrap_err(), AppError::MessagesNotFound);
    }

    #[tokio::test]
    async fn edit_is_sender_only_and_leaves_the_message_untouched() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "original", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();

        let result = edit(&ctx, BOB, TEAM, message_id, "hijacked").await;
        assert_eq!(result.unwrap_err(), AppError::MessagesAccessDenied);

        let stored = ctx.store().get_message_by_id(message_id).await.unwrap().unwrap();
        assert_eq!(stored.content, "original");
        assert_eq!(stored.edited_at, None);
    }

    #[tokio::test]
    async fn edit_replaces_content_and_sets_edit_timestamp() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "original", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();

        let payload = edit(&ctx, ALICE, TEAM, message_id, "fixed").await.unwrap();
        assert_eq!(payload.id, message.id);
        assert_eq!(payload.text, "fixed");

        let stored = ctx.store().get_message_by_id(message_id).await.unwrap().unwrap();
        assert_eq!(stored.content, "fixed");
        assert_eq!(stored.edited_at, Some(payload.edited_at));
    }

    #[tokio::test]
    async fn edit_in_the_wrong_team_is_not_found() {
        let ctx = team_context().await;
        ctx.join_team(user(ALICE, "Alice"), 8).await;
        let message = send(&ctx, ALICE, TEAM, "original", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();

        let result = edit(&ctx, ALICE, 8, message_id, "moved?").await;
        assert_eq!(result.unwrap_err(), AppError::MessagesNotFound);
    }

    #[tokio::test]
    async fn deleted_messages_cannot_be_edited_or_deleted_again() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "bye", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();
        delete(&ctx, ALICE, TEAM, message_id).await.unwrap();

        let edit_result = edit(&ctx, ALICE, TEAM, message_id, "undo").await;
        assert_eq!(edit_result.unwrap_err(), AppError::MessagesAlreadyDeleted);
        let delete_result = delete(&ctx, ALICE, TEAM, message_id).await;
        assert_eq!(delete_result.unwrap_err(), AppError::MessagesAlreadyDeleted);
    }

    #[tokio::test]
    async fn deleted_messages_are_retained_but_hidden_from_history() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "bye", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();
        delete(&ctx, ALICE, TEAM, message_id).await.unwrap();

        // The row survives for audit; reads never surface it.
        let stored = ctx.store().get_message_by_id(message_id).await.unwrap().unwrap();
        assert!(stored.is_deleted());

        let page = history(&ctx, BOB, TEAM, None, None).await.unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn mark_as_read_is_idempotent_per_user() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "hi", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();

        let first = mark_as_read(&ctx, BOB, TEAM, &[message_id]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].sender_id, ALICE);
        assert_eq!(first[0].reader_id, BOB);
        assert_eq!(first[0].status, ReadStatus::Read);

        // Second session of the same user acking again: no error, one row.
        let second = mark_as_read(&ctx, BOB, TEAM, &[message_id]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(ctx.store.receipt_count().await, 1);
    }

    #[tokio::test]
    async fn mark_as_read_skips_own_messages_and_requires_ids() {
        let ctx = team_context().await;
        let message = send(&ctx, ALICE, TEAM, "hi", None).await.unwrap();
        let message_id = message.id.parse::<i64>().unwrap();

        // Reading your own message produces no status notification.
        let own = mark_as_read(&ctx, ALICE, TEAM, &[message_id]).await.unwrap();
        assert!(own.is_empty());

        let result = mark_as_read(&ctx, BOB, TEAM, &[]).await;
        assert!(matches!(result.unwrap_err(), AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn history_requires_membership_and_valid_limit() {
        let ctx = team_context().await;
        let outsider = history(&ctx, 99, TEAM, None, None).await;
        assert_eq!(outsider.unwrap_err(), AppError::TeamsAccessDenied);

        let zero = history(&ctx, ALICE, TEAM, None, Some(0)).await;
        assert!(matches!(zero.unwrap_err(), AppError::InvalidInput(_)));
        let oversized = history(&ctx, ALICE, TEAM, None, Some(101)).await;
        assert!(matches!(oversized.unwrap_err(), AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn history_pages_are_chronological_gap_free_and_duplicate_free() {
        let ctx = team_context().await;
        for i in 1..=3 {
            send(&ctx, ALICE, TEAM, &format!("m{i}"), None).await.unwrap();
        }

        let first = history(&ctx, BOB, TEAM, None, Some(2)).await.unwrap();
        assert_eq!(first.messages.len(), 2);
        assert!(first.has_more);
        // Oldest-first within the page, newest messages on the first page.
        assert_eq!(first.messages[0].text, "m2");
        assert_eq!(first.messages[1].text, "m3");

        let cursor = first.messages[0].id.parse::<i64>().unwrap();
        let second = history(&ctx, BOB, TEAM, Some(cursor), Some(2)).await.unwrap();
        assert_eq!(second.messages.len(), 1);
        assert!(!second.has_more);
        assert_eq!(second.messages[0].text, "m1");

        let mut seen: Vec<&str> = first
            .messages
            .iter()
            .chain(second.messages.iter())
            .map(|m| m.id.as_str())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn history_resolves_read_status_and_authorship_per_requester() {
        let ctx = team_context().await;
        let first = send(&ctx, ALICE, TEAM, "from alice", None).await.unwrap();
        send(&ctx, BOB, TEAM, "from bob", None).await.unwrap();
        let first_id = first.id.parse::<i64>().unwrap();
        mark_as_read(&ctx, BOB, TEAM, &[first_id]).await.unwrap();

        let page = history(&ctx, BOB, TEAM, None, None).await.unwrap();
        assert_eq!(page.messages.len(), 2);

        let alice_message = &page.messages[0];
        assert_eq!(alice_message.read_status, ReadStatus::Read);
        assert!(!alice_message.is_current_user);

        let bob_message = &page.messages[1];
        assert_eq!(bob_message.read_status, ReadStatus::Delivered);
        assert!(bob_message.is_current_user);
    }

    #[tokio::test]
    async fn history_skips_soft_deleted_reply_parents() {
        let ctx = team_context().await;
        let parent = send(&ctx, ALICE, TEAM, "parent", None).await.unwrap();
        let parent_id = parent.id.parse::<i64>().unwrap();
        send(&ctx, BOB, TEAM, "child", Some(parent_id)).await.unwrap();
        delete(&ctx, ALICE, TEAM, parent_id).await.unwrap();

        let page = history(&ctx, BOB, TEAM, None, None).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].text, "child");
        assert_eq!(page.messages[0].reply_to, None);
    }
}
