use crate::common::context::Context;
use crate::events::EventResult;
use crate::hub::Hub;
use crate::hub::connection::ConnInfo;
use crate::models::envelopes::{MarkAsReadArgs, ServerEnvelope, StatusUpdatePayload};
use crate::models::messages::parse_wire_id;
use crate::usecases::messages;

pub async fn handle<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    args: MarkAsReadArgs,
) -> EventResult {
    let message_ids = args
        .message_ids
        .iter()
        .map(|id| parse_wire_id(id))
        .collect::<Result<Vec<_>, _>>()?;
    let notifications = messages::mark_as_read(ctx, conn.user_id, conn.team_id, &message_ids).await?;

    // Read state is only interesting to the author; everyone else keeps
    // their own copy untouched.
    for notification in notifications {
        let envelope = ServerEnvelope::StatusUpdate(StatusUpdatePayload {
            message_id: notification.message_id.to_string(),
            team_id: notification.team_id.to_string(),
            status: notification.status,
            target_user: notification.reader_id.to_string(),
        });
        hub.send_to_user(notification.team_id, notification.sender_id, &envelope)
            .await?;
    }
    Ok(())
}
