use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use shared::agent::{FALLBACK_RESPONSE, ResponseAgent};
use shared::llm::{
    ChatCompletion, ChatCompletionRequest, ChatGateway, ChatGatewayFuture, LlmGatewayError,
    ProviderFunctionCall, ProviderToolCall,
};
use shared::models::{
    ASSISTANT_SENDER_ID, ReminderStatus, ScheduledReminder, StoredMessage, UserProfile,
};
use shared::push::{PushDispatcher, PushTransport, PushTransportFuture, TokenOutcome};
use shared::repos::{ChatStore, StoreError, StoreFuture, TurnWriteSet};
use shared::turn::{NOTIFICATION_TITLE, TurnOrchestrator};

struct FakeStore {
    time_zone: String,
    history: Vec<StoredMessage>,
    push_tokens: Vec<String>,
    fail_commit: bool,
    committed: Mutex<Vec<TurnWriteSet>>,
}

impl FakeStore {
    fn new(time_zone: &str) -> Self {
        Self {
            time_zone: time_zone.to_string(),
            history: Vec::new(),
            push_tokens: Vec::new(),
            fail_commit: false,
            committed: Mutex::new(Vec::new()),
        }
    }

    fn committed(&self) -> Vec<TurnWriteSet> {
        self.committed.lock().unwrap().clone()
    }
}

impl ChatStore for FakeStore {
    fn user_profile(&self, user_id: Uuid) -> StoreFuture<'_, UserProfile> {
        let profile = UserProfile {
            user_id,
            time_zone: self.time_zone.clone(),
        };
        Box::pin(async move { Ok(profile) })
    }

    fn message_history(&self, _user_id: Uuid) -> StoreFuture<'_, Vec<StoredMessage>> {
        let history = self.history.clone();
        Box::pin(async move { Ok(history) })
    }

    fn commit_turn(&self, write_set: TurnWriteSet) -> StoreFuture<'_, ()> {
        if self.fail_commit {
            return Box::pin(async {
                Err(StoreError::InvalidData("commit rejected".to_string()))
            });
        }
        self.committed.lock().unwrap().push(write_set);
        Box::pin(async { Ok(()) })
    }

    fn push_tokens(&self, _user_id: Uuid) -> StoreFuture<'_, Vec<String>> {
        let tokens = self.push_tokens.clone();
        Box::pin(async move { Ok(tokens) })
    }
}

struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ChatCompletion, LlmGatewayError>>>,
}

impl ScriptedGateway {
    fn new(script: Vec<Result<ChatCompletion, LlmGatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

impl ChatGateway for ScriptedGateway {
    fn complete<'a>(&'a self, _request: ChatCompletionRequest) -> ChatGatewayFuture<'a> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted gateway ran out of responses");
        Box::pin(async move { next })
    }
}

fn text_completion(content: &str) -> ChatCompletion {
    ChatCompletion {
        model: "test-model".to_string(),
        provider_request_id: None,
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
        usage: None,
    }
}

fn reminder_call_completion(datetime_phrase: &str, reminder_content: &str) -> ChatCompletion {
    let arguments = json!({
        "datetime_phrase": datetime_phrase,
        "reminder_content": reminder_content,
    })
    .to_string();
    ChatCompletion {
        model: "test-model".to_string(),
        provider_request_id: None,
        content: None,
        tool_calls: vec![ProviderToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: ProviderFunctionCall {
                name: "schedule_reminder".to_string(),
                arguments,
            },
        }],
        usage: None,
    }
}

#[derive(Clone)]
struct SentBatch {
    tokens: Vec<String>,
    title: String,
    body: String,
}

struct RecordingTransport {
    sent: Mutex<Vec<SentBatch>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<SentBatch> {
        self.sent.lock().unwrap().clone()
    }
}

impl PushTransport for RecordingTransport {
    fn send_batch<'a>(
        &'a self,
        tokens: &'a [String],
        title: &'a str,
        body: &'a str,
    ) -> PushTransportFuture<'a> {
        self.sent.lock().unwrap().push(SentBatch {
            tokens: tokens.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
        });
        let outcomes: Vec<TokenOutcome> = tokens
            .iter()
            .map(|token| TokenOutcome {
                token: token.clone(),
                success: true,
                error_code: None,
            })
            .collect();
        Box::pin(async move { Ok(outcomes) })
    }
}

fn orchestrator(
    store: Arc<FakeStore>,
    gateway: Arc<ScriptedGateway>,
    transport: Arc<RecordingTransport>,
) -> TurnOrchestrator {
    TurnOrchestrator::new(
        store,
        ResponseAgent::new(gateway),
        PushDispatcher::new(transport),
    )
}

#[tokio::test]
async fn plain_turn_commits_exactly_two_messages() {
    let store = Arc::new(FakeStore::new("UTC"));
    let gateway = ScriptedGateway::new(vec![Ok(text_completion("Sounds like a great plan."))]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store.clone(), gateway, transport);

    let user_id = Uuid::new_v4();
    let message_id = Uuid::new_v4();
    pipeline
        .run_turn(user_id, "I want to start journaling.", message_id, Utc::now())
        .await
        .unwrap();

    let committed = store.committed();
    assert_eq!(committed.len(), 1);
    let turn = &committed[0];
    assert_eq!(turn.user_id, user_id);
    assert_eq!(turn.user_message.id, message_id);
    assert_eq!(turn.user_message.sender_id, user_id.to_string());
    assert_eq!(turn.user_message.body, "I want to start journaling.");
    assert_eq!(turn.assistant_message.sender_id, ASSISTANT_SENDER_ID);
    assert_eq!(turn.assistant_message.body, "Sounds like a great plan.");
    assert!(turn.reminders.is_empty());
}

#[tokio::test]
async fn reminder_turn_commits_messages_and_staged_reminder() {
    let store = Arc::new(FakeStore::new("America/Los_Angeles"));
    let gateway = ScriptedGateway::new(vec![
        Ok(reminder_call_completion(
            "tomorrow at 9am",
            "Call the pharmacy",
        )),
        Ok(text_completion("Done! I'll remind you tomorrow at 9:00am.")),
    ]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store.clone(), gateway, transport);

    let user_id = Uuid::new_v4();
    pipeline
        .run_turn(
            user_id,
            "Remind me to call the pharmacy tomorrow at 9am",
            Uuid::new_v4(),
            Utc::now(),
        )
        .await
        .unwrap();

    let committed = store.committed();
    assert_eq!(committed.len(), 1);
    let reminders: &[ScheduledReminder] = &committed[0].reminders;
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].user_id, user_id);
    assert_eq!(reminders[0].title, "Your Reminder");
    assert_eq!(reminders[0].body, "Call the pharmacy");
    assert_eq!(reminders[0].time_zone, "America/Los_Angeles");
    assert_eq!(reminders[0].status, ReminderStatus::Pending);
    assert!(reminders[0].scheduled_at > Utc::now());
    assert_eq!(
        committed[0].assistant_message.body,
        "Done! I'll remind you tomorrow at 9:00am."
    );
}

#[tokio::test]
async fn past_phrase_commits_turn_without_reminder() {
    let store = Arc::new(FakeStore::new("UTC"));
    let gateway = ScriptedGateway::new(vec![
        Ok(reminder_call_completion("yesterday", "Water the plants")),
        Ok(text_completion(
            "I can't schedule that in the past. When should I remind you instead?",
        )),
    ]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store.clone(), gateway, transport);

    pipeline
        .run_turn(
            Uuid::new_v4(),
            "Remind me yesterday to water the plants",
            Uuid::new_v4(),
            Utc::now(),
        )
        .await
        .unwrap();

    let committed = store.committed();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].reminders.is_empty());
    assert!(
        committed[0]
            .assistant_message
            .body
            .contains("in the past")
    );
}

#[tokio::test]
async fn generation_failure_commits_fallback_reply() {
    let store = Arc::new(FakeStore::new("UTC"));
    let gateway = ScriptedGateway::new(vec![Err(LlmGatewayError::Timeout)]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store.clone(), gateway, transport);

    pipeline
        .run_turn(Uuid::new_v4(), "Hello?", Uuid::new_v4(), Utc::now())
        .await
        .unwrap();

    let committed = store.committed();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].assistant_message.body, FALLBACK_RESPONSE);
    assert!(committed[0].reminders.is_empty());
}

#[tokio::test]
async fn commit_failure_fails_the_turn_and_skips_notification() {
    let mut store = FakeStore::new("UTC");
    store.fail_commit = true;
    store.push_tokens = vec!["tok-1".to_string()];
    let store = Arc::new(store);
    let gateway = ScriptedGateway::new(vec![Ok(text_completion("Hi there!"))]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store.clone(), gateway, transport.clone());

    let result = pipeline
        .run_turn(Uuid::new_v4(), "Hi", Uuid::new_v4(), Utc::now())
        .await;

    assert!(result.is_err());
    assert!(store.committed().is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn notification_carries_title_and_truncated_preview() {
    let long_reply = "a".repeat(160);
    let mut store = FakeStore::new("UTC");
    store.push_tokens = vec!["tok-1".to_string(), "tok-2".to_string()];
    let store = Arc::new(store);
    let gateway = ScriptedGateway::new(vec![Ok(text_completion(&long_reply))]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store, gateway, transport.clone());

    pipeline
        .run_turn(Uuid::new_v4(), "Tell me everything", Uuid::new_v4(), Utc::now())
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tokens, vec!["tok-1", "tok-2"]);
    assert_eq!(sent[0].title, NOTIFICATION_TITLE);
    assert_eq!(sent[0].body.chars().count(), 103);
    assert!(sent[0].body.ends_with("..."));
}

#[tokio::test]
async fn user_with_no_devices_triggers_no_delivery() {
    let store = Arc::new(FakeStore::new("UTC"));
    let gateway = ScriptedGateway::new(vec![Ok(text_completion("Hello!"))]);
    let transport = RecordingTransport::new();
    let pipeline = orchestrator(store, gateway, transport.clone());

    pipeline
        .run_turn(Uuid::new_v4(), "Hi", Uuid::new_v4(), Utc::now())
        .await
        .unwrap();

    assert!(transport.sent().is_empty());
}
