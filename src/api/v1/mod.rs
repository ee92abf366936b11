pub mod messages;

use crate::common::state::AppState;
use axum::Router;
use axum::routing::get;

pub fn router() -> Router<AppState> {
    Router::new().route("/teams/{team_id}/messages", get(messages::history))
}
