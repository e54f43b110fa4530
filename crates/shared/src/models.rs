use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved sender marker for messages authored by the assistant.
pub const ASSISTANT_SENDER_ID: &str = "ASSISTANT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub client_platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub push_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTimeZoneRequest {
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Client-assigned id for the user message document. Repeating the
    /// same id does not duplicate the stored user message.
    pub message_id: Uuid,
    pub client_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub time_zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderStatus {
    Pending,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
        }
    }
}

/// A reminder staged during a turn. `scheduled_at` is validated to be in
/// the future at staging time and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub time_zone: String,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Per-turn context threaded through agent generation and into tool
/// invocations. Owned by exactly one in-flight turn; tool side effects
/// land in `pending_writes` and are committed atomically with the
/// conversation messages, or discarded if the turn fails.
#[derive(Debug)]
pub struct TurnContext {
    pub user_id: Uuid,
    pub user_time_zone: String,
    pub now: DateTime<Utc>,
    pub pending_writes: Vec<ScheduledReminder>,
}

impl TurnContext {
    pub fn new(user_id: Uuid, user_time_zone: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            user_time_zone,
            now,
            pending_writes: Vec::new(),
        }
    }
}
