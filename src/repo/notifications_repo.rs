use sqlx::PgPool;

#[derive(Clone)]
pub struct NotificationsRepo {
    pub pool: PgPool,
}

impl NotificationsRepo {
    pub async fn insert(&self, user_id: i64, title: &str, message: &str, kind: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, type, is_read)
            VALUES ($1, $2, $3, $4, FALSE)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
