mod conversations;
mod devices;
mod users;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ScheduledReminder, StoredMessage, UserProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Everything one turn persists. Committed as a single transaction;
/// either all of it lands or none of it does.
#[derive(Debug, Clone)]
pub struct TurnWriteSet {
    pub user_id: Uuid,
    pub user_message: NewMessage,
    pub assistant_message: NewMessage,
    pub reminders: Vec<ScheduledReminder>,
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Storage seam for the turn pipeline. The sqlx-backed [`Store`] is the
/// production implementation; tests substitute fakes.
pub trait ChatStore: Send + Sync {
    fn user_profile(&self, user_id: Uuid) -> StoreFuture<'_, UserProfile>;
    fn message_history(&self, user_id: Uuid) -> StoreFuture<'_, Vec<StoredMessage>>;
    fn commit_turn(&self, write_set: TurnWriteSet) -> StoreFuture<'_, ()>;
    fn push_tokens(&self, user_id: Uuid) -> StoreFuture<'_, Vec<String>>;
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self) -> Result<Uuid, StoreError> {
        let user_id: Uuid = sqlx::query_scalar("INSERT INTO users DEFAULT VALUES RETURNING id")
            .fetch_one(&self.pool)
            .await?;
        Ok(user_id)
    }

    pub async fn ensure_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl ChatStore for Store {
    fn user_profile(&self, user_id: Uuid) -> StoreFuture<'_, UserProfile> {
        Box::pin(async move { self.load_user_profile(user_id).await })
    }

    fn message_history(&self, user_id: Uuid) -> StoreFuture<'_, Vec<StoredMessage>> {
        Box::pin(async move { self.load_message_history(user_id).await })
    }

    fn commit_turn(&self, write_set: TurnWriteSet) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.commit_turn_write_set(write_set).await })
    }

    fn push_tokens(&self, user_id: Uuid) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { self.list_push_tokens(user_id).await })
    }
}
