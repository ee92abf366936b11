use crate::api::RequestContext;
use crate::common::error::ServiceResponse;
use crate::models::messages::{HistoryPage, parse_wire_id};
use crate::usecases::messages;
use axum::Json;
use axum::extract::{Path, Query};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub user_id: i64,
    #[serde(default)]
    pub before_message_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Synchronous counterpart of `load-history-request`, same page shape.
pub async fn history(
    ctx: RequestContext,
    Path(team_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ServiceResponse<HistoryPage> {
    let before = query
        .before_message_id
        .as_deref()
        .map(parse_wire_id)
        .transpose()?;
    let page = messages::history(&ctx, query.user_id, team_id, before, query.limit).await?;
    Ok(Json(page))
}
