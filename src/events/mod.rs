pub mod delete_message;
pub mod edit_message;
pub mod load_history;
pub mod mark_as_read;
pub mod new_message;

use crate::common::context::Context;
use crate::common::error::ServiceResult;
use crate::hub::Hub;
use crate::hub::connection::ConnInfo;
use crate::models::envelopes::{ClientEnvelope, ServerEnvelope};
use tracing::warn;

pub type EventResult = ServiceResult<()>;

/// Entry point of the read pump: one inbound frame in, zero or more
/// outbound envelopes out. Never fails the connection — every decode,
/// validation or permission problem resolves to an `error` envelope sent
/// back to the originating connection only.
pub async fn handle_frame<C: Context>(ctx: &C, hub: &Hub, conn: ConnInfo, frame: &str) {
    let envelope = match ClientEnvelope::decode(frame) {
        Ok(envelope) => envelope,
        Err(failure) => {
            let original_type = failure.original_type.as_deref().unwrap_or("unknown");
            let error = ServerEnvelope::error(&failure.reason, original_type, None);
            if let Err(e) = hub.send_to_conn(conn.team_id, conn.conn_id, &error).await {
                warn!(conn_id = %conn.conn_id, "Failed to deliver decode error: {:?}", e.code());
            }
            return;
        }
    };

    let original_type = envelope.kind();
    let client_message_id = envelope.client_message_id().map(str::to_owned);
    if let Err(reason) = handle_envelope(ctx, hub, conn, envelope).await {
        let error = ServerEnvelope::error(&reason, original_type, client_message_id.as_deref());
        if let Err(e) = hub.send_to_conn(conn.team_id, conn.conn_id, &error).await {
            warn!(conn_id = %conn.conn_id, "Failed to deliver error envelope: {:?}", e.code());
        }
    }
}

pub async fn handle_envelope<C: Context>(
    ctx: &C,
    hub: &Hub,
    conn: ConnInfo,
    envelope: ClientEnvelope,
) -> EventResult {
    match envelope {
        ClientEnvelope::NewMessage(args) => new_message::handle(ctx, hub, conn, args).await,
        ClientEnvelope::EditMessage(args) => edit_message::handle(ctx, hub, conn, args).await,
        ClientEnvelope::DeleteMessage(args) => delete_message::handle(ctx, hub, conn, args).await,
        ClientEnvelope::MarkAsRead(args) => mark_as_read::handle(ctx, hub, conn, args).await,
        ClientEnvelope::LoadHistoryRequest(args) => {
            load_history::handle(ctx, hub, conn, args).await
        }
    }
}
