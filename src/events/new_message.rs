use crate::common::context::Context;
use crate::events::EventResult;
use crate::hub::Hub;
use crate::hub::connection::ConnInfo;
use crate::models::envelopes::NewMessageArgs;
use crate::models::messages::parse_wire_id;
use crate::usecases::messages;

pub async fn handle<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    args: NewMessageArgs,
) -> EventResult {
    let reply_to_id = args
        .reply_to_message_id
        .as_deref()
        .map(parse_wire_id)
        .transpose()?;
    let mut message = messages::send(ctx, conn.user_id, conn.team_id, &args.text, reply_to_id).await?;
    // Echo the correlation id so the author can match the broadcast to its
    // optimistic local copy.
    message.client_message_id = args.client_message_id;
    hub.broadcast_new_message(conn.team_id, message).await
}
