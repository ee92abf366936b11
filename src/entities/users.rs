#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub accent_color: Option<String>,
}
