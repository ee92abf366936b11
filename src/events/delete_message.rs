use crate::common::context::Context;
use crate::events::EventResult;
use crate::hub::Hub;
use crate::hub::connection::ConnInfo;
use crate::models::envelopes::{DeleteMessageArgs, ServerEnvelope};
use crate::models::messages::parse_wire_id;
use crate::usecases::messages;

pub async fn handle<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    args: DeleteMessageArgs,
) -> EventResult {
    let message_id = parse_wire_id(&args.message_id)?;
    let payload = messages::delete(ctx, conn.user_id, conn.team_id, message_id).await?;
    hub.broadcast_to_team(conn.team_id, &ServerEnvelope::MessageDeleted(payload))
        .await
}
