use crate::api::RequestContext;
use crate::common::context::Context;
use crate::common::error::AppError;
use crate::hub::connection;
use axum::extract::{Query, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;

/// Identity established upstream; a socket is bound to one user and one
/// team for its whole lifetime.
#[derive(Deserialize)]
pub struct ConnectQuery {
    pub user_id: i64,
    pub team_id: i64,
}

pub async fn websocket(
    ctx: RequestContext,
    Query(query): Query<ConnectQuery>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    // Membership is checked before the upgrade; non-members never get a
    // socket at all.
    if !ctx
        .memberships()
        .is_member(query.user_id, query.team_id)
        .await?
    {
        return Err(AppError::TeamsAccessDenied);
    }

    Ok(upgrade.on_upgrade(move |socket| async move {
        let hub = ctx.hub.clone();
        connection::serve(&ctx, hub, socket, query.user_id, query.team_id).await;
    }))
}
