use async_trait::async_trait;
use sqlx::{MySql, Pool};

/// Answers whether a user belongs to a team. Team management itself lives
/// in another service.
#[async_trait]
pub trait MembershipOracle: Sync + Send {
    async fn is_member(&self, user_id: i64, team_id: i64) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct MySqlMembershipOracle {
    db: Pool<MySql>,
}

impl MySqlMembershipOracle {
    pub fn new(db: Pool<MySql>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MembershipOracle for MySqlMembershipOracle {
    async fn is_member(&self, user_id: i64, team_id: i64) -> anyhow::Result<bool> {
        const QUERY: &str = const_str::concat!(
            "SELECT COUNT(*) FROM team_members ",
            "WHERE user_id = ? AND team_id = ?"
        );
        let count: i64 = sqlx::query_scalar(QUERY)
            .bind(user_id)
            .bind(team_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }
}
