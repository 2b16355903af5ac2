use crate::domain::currency::Currency;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[async_trait::async_trait]
pub trait CurrencyStore: Send + Sync {
    /// Inserts or refreshes metadata by code. Stored rates and the active flag are kept.
    async fn upsert(&self, currency: &Currency) -> anyhow::Result<()>;

    async fn list_active(&self) -> anyhow::Result<Vec<Currency>>;

    async fn get_active(&self, code: &str) -> anyhow::Result<Option<Currency>>;

    async fn update_rate(&self, code: &str, rate: Decimal) -> anyhow::Result<()>;
}

// The seeded rate is only written on first insert; refreshed rates survive a reseed.
const UPSERT_SQL: &str = r#"
    INSERT INTO currencies (code, name, symbol, decimals, min_amount, network, icon, exchange_rate, is_active)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
    ON CONFLICT (code) DO UPDATE SET
        name = EXCLUDED.name,
        symbol = EXCLUDED.symbol,
        decimals = EXCLUDED.decimals,
        min_amount = EXCLUDED.min_amount,
        network = EXCLUDED.network,
        icon = EXCLUDED.icon
"#;

#[derive(Clone)]
pub struct CurrenciesRepo {
    pub pool: PgPool,
}

fn currency_from_row(r: &PgRow) -> Currency {
    let decimals: i32 = r.get("decimals");
    Currency {
        code: r.get("code"),
        name: r.get("name"),
        symbol: r.get("symbol"),
        decimals: decimals.max(0) as u32,
        min_amount: r.get("min_amount"),
        network: r.get("network"),
        icon: r.get("icon"),
        exchange_rate: r.get("exchange_rate"),
        is_active: r.get("is_active"),
        last_updated: r.get("last_updated"),
    }
}

#[async_trait::async_trait]
impl CurrencyStore for CurrenciesRepo {
    async fn upsert(&self, c: &Currency) -> anyhow::Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(&c.code)
            .bind(&c.name)
            .bind(&c.symbol)
            .bind(c.decimals as i32)
            .bind(c.min_amount)
            .bind(&c.network)
            .bind(&c.icon)
            .bind(c.exchange_rate)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<Currency>> {
        let rows = sqlx::query(
            r#"
            SELECT code, name, symbol, decimals, min_amount, network, icon, exchange_rate, is_active, last_updated
            FROM currencies
            WHERE is_active = TRUE
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(currency_from_row).collect())
    }

    async fn get_active(&self, code: &str) -> anyhow::Result<Option<Currency>> {
        let row = sqlx::query(
            r#"
            SELECT code, name, symbol, decimals, min_amount, network, icon, exchange_rate, is_active, last_updated
            FROM currencies
            WHERE code = $1 AND is_active = TRUE
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(currency_from_row))
    }

    async fn update_rate(&self, code: &str, rate: Decimal) -> anyhow::Result<()> {
        sqlx::query("UPDATE currencies SET exchange_rate = $2, last_updated = NOW() WHERE code = $1")
            .bind(code)
            .bind(rate.round_dp(8))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
