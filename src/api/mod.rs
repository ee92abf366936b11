use crate::common::context::Context;
use crate::common::init;
use crate::common::state::AppState;
use crate::hub::Hub;
use crate::repositories::memberships::{MembershipOracle, MySqlMembershipOracle};
use crate::repositories::messages::{MessageStore, MySqlMessageStore};
use crate::repositories::notifications::{LogNotificationDispatcher, NotificationDispatcher};
use crate::repositories::users::{MySqlUserInfoProvider, UserInfoProvider};
use crate::settings::AppSettings;
use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::get;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub mod v1;
pub mod ws;

pub struct RequestContext {
    pub store: MySqlMessageStore,
    pub memberships: MySqlMembershipOracle,
    pub users: MySqlUserInfoProvider,
    pub notifications: LogNotificationDispatcher,
    pub hub: Hub,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/ws", get(ws::websocket))
        .nest("/api/v1", v1::router())
}

pub async fn serve(settings: &AppSettings) -> anyhow::Result<()> {
    let state = init::initialize_state(settings).await?;
    let addr = SocketAddr::new(settings.app_host, settings.app_port);
    let listener = TcpListener::bind(addr).await?;
    info!("chat-service listening on {addr}");
    let app = router().with_state(state);
    axum::serve(listener, app).await?;
    Ok(())
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self {
            store: MySqlMessageStore::new(state.db.clone()),
            memberships: MySqlMembershipOracle::new(state.db.clone()),
            users: MySqlUserInfoProvider::new(state.db.clone()),
            notifications: LogNotificationDispatcher,
            hub: state.hub.clone(),
        })
    }
}

impl Context for RequestContext {
    fn store(&self) -> &dyn MessageStore {
        &self.store
    }

    fn memberships(&self) -> &dyn MembershipOracle {
        &self.memberships
    }

    fn users(&self) -> &dyn UserInfoProvider {
        &self.users
    }

    fn notifications(&self) -> &dyn NotificationDispatcher {
        &self.notifications
    }
}
