use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::ResponseAgent;
use crate::models::{ASSISTANT_SENDER_ID, ChatRole, ChatTurn, TurnContext};
use crate::push::PushDispatcher;
use crate::repos::{ChatStore, NewMessage, StoreError, TurnWriteSet};

pub const NOTIFICATION_TITLE: &str = "You have a new message!";

const NOTIFICATION_BODY_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("turn persistence failed: {0}")]
    Storage(#[from] StoreError),
}

/// Drives one inbound user message through the full pipeline: load the
/// profile and history, generate the assistant reply, commit the turn
/// atomically, then notify the user's devices. Only a commit failure is
/// fatal; generation and notification degrade without failing the turn.
#[derive(Clone)]
pub struct TurnOrchestrator {
    store: Arc<dyn ChatStore>,
    agent: ResponseAgent,
    push: PushDispatcher,
}

impl TurnOrchestrator {
    pub fn new(store: Arc<dyn ChatStore>, agent: ResponseAgent, push: PushDispatcher) -> Self {
        Self { store, agent, push }
    }

    pub async fn run_turn(
        &self,
        user_id: Uuid,
        user_message: &str,
        client_message_id: Uuid,
        client_timestamp: DateTime<Utc>,
    ) -> Result<(), TurnError> {
        let profile = self.store.user_profile(user_id).await?;
        let history = self.store.message_history(user_id).await?;

        let mut turns: Vec<ChatTurn> = history
            .iter()
            .map(|message| ChatTurn {
                role: if message.sender_id == ASSISTANT_SENDER_ID {
                    ChatRole::Assistant
                } else {
                    ChatRole::User
                },
                content: message.body.clone(),
            })
            .collect();
        turns.push(ChatTurn {
            role: ChatRole::User,
            content: user_message.to_string(),
        });

        let mut ctx = TurnContext::new(user_id, profile.time_zone, Utc::now());
        let reply = self.agent.generate(&turns, &mut ctx).await;

        let write_set = TurnWriteSet {
            user_id,
            user_message: NewMessage {
                id: client_message_id,
                sender_id: user_id.to_string(),
                body: user_message.to_string(),
                created_at: client_timestamp,
            },
            assistant_message: NewMessage {
                id: Uuid::new_v4(),
                sender_id: ASSISTANT_SENDER_ID.to_string(),
                body: reply.clone(),
                created_at: Utc::now(),
            },
            reminders: ctx.pending_writes,
        };
        let reminder_count = write_set.reminders.len();
        self.store.commit_turn(write_set).await?;
        info!(%user_id, reminder_count, "turn committed");

        // Delivery problems are logged inside the dispatcher; a missing
        // token list is the only store error worth noting here.
        match self.store.push_tokens(user_id).await {
            Ok(tokens) => {
                let body = truncate_notification_body(&reply);
                self.push.dispatch(&tokens, NOTIFICATION_TITLE, &body).await;
            }
            Err(err) => {
                warn!(%user_id, "skipping notification, could not load push tokens: {err}");
            }
        }

        Ok(())
    }
}

/// Notification previews are capped at 100 characters with a `...`
/// suffix. The cut respects character boundaries, not byte offsets.
pub fn truncate_notification_body(reply: &str) -> String {
    if reply.chars().count() <= NOTIFICATION_BODY_LIMIT {
        return reply.to_string();
    }
    let mut preview: String = reply.chars().take(NOTIFICATION_BODY_LIMIT).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::truncate_notification_body;

    #[test]
    fn short_reply_is_untouched() {
        assert_eq!(truncate_notification_body("See you at 9!"), "See you at 9!");
    }

    #[test]
    fn reply_at_the_limit_is_untouched() {
        let reply = "x".repeat(100);
        assert_eq!(truncate_notification_body(&reply), reply);
    }

    #[test]
    fn long_reply_is_cut_with_ellipsis() {
        let reply = "y".repeat(140);
        let preview = truncate_notification_body(&reply);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn multibyte_reply_is_cut_on_character_boundaries() {
        let reply = "é".repeat(120);
        let preview = truncate_notification_body(&reply);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.starts_with("é"));
    }
}
