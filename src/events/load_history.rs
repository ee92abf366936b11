use crate::common::context::Context;
use crate::events::EventResult;
use crate::hub::Hub;
use crate::hub::connection::ConnInfo;
use crate::models::envelopes::{LoadHistoryArgs, ServerEnvelope};
use crate::models::messages::parse_wire_id;
use crate::usecases::messages;

pub async fn handle<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    args: LoadHistoryArgs,
) -> EventResult {
    let before = args
        .before_message_id
        .as_deref()
        .map(parse_wire_id)
        .transpose()?;
    let page = messages::history(ctx, conn.user_id, conn.team_id, before, args.limit).await?;
    hub.send_to_conn(conn.team_id, conn.conn_id, &ServerEnvelope::HistoryLoaded(page))
        .await
}
