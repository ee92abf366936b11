use crate::entities::users::User;
use async_trait::async_trait;
use sqlx::{MySql, Pool};

/// Resolves lightweight display info for response enrichment.
#[async_trait]
pub trait UserInfoProvider: Sync + Send {
    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>>;
}

#[derive(Clone)]
pub struct MySqlUserInfoProvider {
    db: Pool<MySql>,
}

impl MySqlUserInfoProvider {
    pub fn new(db: Pool<MySql>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserInfoProvider for MySqlUserInfoProvider {
    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        const QUERY: &str = const_str::concat!(
            "SELECT id, display_name, avatar_url, accent_color ",
            "FROM users WHERE id = ?"
        );
        let user = sqlx::query_as(QUERY)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}
