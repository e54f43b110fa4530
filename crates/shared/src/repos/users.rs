use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::UserProfile;
use crate::timezone::DEFAULT_USER_TIME_ZONE;

use super::{Store, StoreError};

impl Store {
    pub(super) async fn load_user_profile(&self, user_id: Uuid) -> Result<UserProfile, StoreError> {
        let time_zone: Option<String> =
            sqlx::query_scalar("SELECT time_zone FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(UserProfile {
            user_id,
            time_zone: time_zone.unwrap_or_else(|| DEFAULT_USER_TIME_ZONE.to_string()),
        })
    }

    pub async fn update_time_zone(&self, user_id: Uuid, time_zone: &str) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;

        sqlx::query("UPDATE users SET time_zone = $2 WHERE id = $1")
            .bind(user_id)
            .bind(time_zone)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn create_session(
        &self,
        user_id: Uuid,
        access_token_hash: &[u8],
        refresh_token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;

        sqlx::query(
            "INSERT INTO auth_sessions (user_id, access_token_hash, refresh_token_hash, expires_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(access_token_hash)
        .bind(refresh_token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn resolve_session_user(
        &self,
        access_token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let user_id = sqlx::query_scalar(
            "SELECT user_id
             FROM auth_sessions
             WHERE access_token_hash = $1
               AND revoked_at IS NULL
               AND expires_at > $2",
        )
        .bind(access_token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }
}
