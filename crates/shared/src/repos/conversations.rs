use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::models::StoredMessage;

use super::{NewMessage, Store, StoreError, TurnWriteSet};

impl Store {
    pub(super) async fn load_message_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, sender_id, body, created_at
             FROM messages
             WHERE user_id = $1
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let history = rows
            .into_iter()
            .map(|row| {
                Ok(StoredMessage {
                    id: row.try_get("id")?,
                    sender_id: row.try_get("sender_id")?,
                    body: row.try_get("body")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        debug!(user_id = %user_id, count = history.len(), "loaded message history");
        Ok(history)
    }

    /// Persists one turn atomically: the user message (idempotent on its
    /// client-supplied id), the assistant message, and every reminder
    /// staged during generation.
    pub(super) async fn commit_turn_write_set(
        &self,
        write_set: TurnWriteSet,
    ) -> Result<(), StoreError> {
        self.ensure_user(write_set.user_id).await?;

        let mut tx = self.pool.begin().await?;

        insert_message(&mut tx, write_set.user_id, &write_set.user_message, true).await?;
        insert_message(
            &mut tx,
            write_set.user_id,
            &write_set.assistant_message,
            false,
        )
        .await?;

        for reminder in &write_set.reminders {
            sqlx::query(
                "INSERT INTO scheduled_reminders
                   (id, user_id, title, body, scheduled_at, time_zone, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(reminder.id)
            .bind(reminder.user_id)
            .bind(&reminder.title)
            .bind(&reminder.body)
            .bind(reminder.scheduled_at)
            .bind(&reminder.time_zone)
            .bind(reminder.status.as_str())
            .bind(reminder.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    message: &NewMessage,
    idempotent: bool,
) -> Result<(), StoreError> {
    let query = if idempotent {
        "INSERT INTO messages (id, user_id, sender_id, body, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO NOTHING"
    } else {
        "INSERT INTO messages (id, user_id, sender_id, body, created_at)
         VALUES ($1, $2, $3, $4, $5)"
    };

    sqlx::query(query)
        .bind(message.id)
        .bind(user_id)
        .bind(&message.sender_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
