use uuid::Uuid;

use super::{Store, StoreError};

impl Store {
    pub async fn register_device(
        &self,
        user_id: Uuid,
        device_id: &str,
        push_token: &str,
    ) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;

        sqlx::query(
            "INSERT INTO devices (user_id, device_identifier, push_token)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, device_identifier)
             DO UPDATE SET
               push_token = EXCLUDED.push_token,
               updated_at = NOW()",
        )
        .bind(user_id)
        .bind(device_id)
        .bind(push_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(super) async fn list_push_tokens(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let tokens = sqlx::query_scalar(
            "SELECT push_token
             FROM devices
             WHERE user_id = $1
             ORDER BY device_identifier",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }
}
