use crate::settings::SettingsProvider;
use sqlx::{PgPool, Row};

/// `settings(setting_key, setting_value)` table.
#[derive(Clone)]
pub struct SettingsRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl SettingsProvider for SettingsRepo {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT setting_value FROM settings WHERE setting_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("setting_value")))
    }
}
