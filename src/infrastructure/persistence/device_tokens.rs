use crate::domain::entities::{now_timestamp, DeviceToken};
use crate::domain::errors::DomainResult;
use crate::domain::ports::DeviceTokenRepository;
use crate::infrastructure::persistence::{optional_text, Database};
use sqlx::Row;

#[async_trait::async_trait]
impl DeviceTokenRepository for Database {
    async fn register(
        &self,
        owner_id: &str,
        token: &str,
        platform: Option<&str>,
    ) -> DomainResult<DeviceToken> {
        sqlx::query(
            "INSERT INTO device_tokens (owner_id, token, platform, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (owner_id, token) DO UPDATE SET platform = excluded.platform",
        )
        .bind(owner_id)
        .bind(token)
        .bind(platform)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT owner_id, token, COALESCE(platform, '') AS platform, created_at
             FROM device_tokens WHERE owner_id = ? AND token = ?",
        )
        .bind(owner_id)
        .bind(token)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(owner_id = %owner_id, "Device token registered");
        Ok(DeviceToken {
            owner_id: row.try_get("owner_id")?,
            token: row.try_get("token")?,
            platform: optional_text(&row, "platform")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<DeviceToken>> {
        let rows = sqlx::query(
            "SELECT owner_id, token, COALESCE(platform, '') AS platform, created_at
             FROM device_tokens WHERE owner_id = ?
             ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tokens = Vec::with_capacity(rows.len());
        for row in rows {
            tokens.push(DeviceToken {
                owner_id: row.try_get("owner_id")?,
                token: row.try_get("token")?,
                platform: optional_text(&row, "platform")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(tokens)
    }

    async fn remove_tokens(&self, owner_id: &str, tokens: &[String]) -> DomainResult<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for token in tokens {
            removed += sqlx::query("DELETE FROM device_tokens WHERE owner_id = ? AND token = ?")
                .bind(owner_id)
                .bind(token)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}
