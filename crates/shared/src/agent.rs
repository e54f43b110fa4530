use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{ChatCompletionRequest, ChatGateway, ProviderMessage, ProviderToolCall};
use crate::models::{ChatTurn, TurnContext};
use crate::tools::{self, ToolInvocation, ToolParseError};

/// Returned whenever the generative call cannot produce text. The turn
/// still commits with this as the assistant message.
pub const FALLBACK_RESPONSE: &str =
    "I'm having a little trouble connecting right now. Please try again in a moment.";

const SYSTEM_PROMPT: &str = "\
You are a supportive, non-judgmental companion and coach. Be empathetic, \
patient, and encouraging. Help the user set achievable goals, offer gentle \
accountability, and celebrate small wins. Ask open-ended questions rather \
than giving unsolicited advice, keep replies concise and easy to digest, and \
never diagnose or give medical advice. When the user asks to be reminded of \
something, schedule it with the schedule_reminder tool and confirm the \
resolved time back to them.";

// A cooperative model needs one round per tool call plus one to phrase
// its reply; anything past this is the model looping.
const MAX_TOOL_ROUNDS: usize = 4;

/// Wraps the generative capability behind a single text-in/text-out
/// operation, transparently driving any tool invocations the model
/// makes along the way.
#[derive(Clone)]
pub struct ResponseAgent {
    gateway: Arc<dyn ChatGateway>,
}

impl ResponseAgent {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    pub async fn generate(&self, history: &[ChatTurn], ctx: &mut TurnContext) -> String {
        let mut messages: Vec<ProviderMessage> = history
            .iter()
            .map(|turn| ProviderMessage::text(turn.role.as_str(), turn.content.clone()))
            .collect();

        for round in 0..MAX_TOOL_ROUNDS {
            // The last permitted round withholds the tool declarations so
            // the model has to answer in text.
            let final_round = round + 1 == MAX_TOOL_ROUNDS;
            let tools = if final_round {
                Vec::new()
            } else {
                tools::declared_tools()
            };

            let request = ChatCompletionRequest::new(SYSTEM_PROMPT, messages.clone())
                .with_tools(tools)
                .with_requester_id(ctx.user_id.to_string());

            let completion = match self.gateway.complete(request).await {
                Ok(completion) => completion,
                Err(err) => {
                    warn!(user_id = %ctx.user_id, "generation call failed: {err}");
                    return FALLBACK_RESPONSE.to_string();
                }
            };

            if let Some(usage) = &completion.usage {
                debug!(
                    user_id = %ctx.user_id,
                    model = %completion.model,
                    total_tokens = usage.total_tokens,
                    "generation round completed"
                );
            }

            if completion.tool_calls.is_empty() {
                return completion
                    .content
                    .unwrap_or_else(|| FALLBACK_RESPONSE.to_string());
            }

            messages.push(ProviderMessage::assistant_tool_calls(
                completion.tool_calls.clone(),
            ));
            for call in completion.tool_calls {
                let result = run_tool(&call, ctx);
                messages.push(ProviderMessage::tool_result(call.id, result));
            }
        }

        warn!(user_id = %ctx.user_id, "model kept requesting tools past the round cap");
        FALLBACK_RESPONSE.to_string()
    }
}

/// Dispatches one provider tool call into the closed tool set. Always
/// yields text; a bad call becomes a conversational correction the
/// model can recover from.
fn run_tool(call: &ProviderToolCall, ctx: &mut TurnContext) -> String {
    match ToolInvocation::parse(&call.function.name, &call.function.arguments) {
        Ok(invocation) => tools::execute(invocation, ctx),
        Err(ToolParseError::UnknownTool(name)) => {
            warn!(user_id = %ctx.user_id, tool = %name, "model called an undeclared tool");
            format!("Tool '{name}' is not available.")
        }
        Err(ToolParseError::InvalidArguments { tool, message }) => {
            warn!(user_id = %ctx.user_id, tool = %tool, "invalid tool arguments: {message}");
            format!("The arguments for '{tool}' were invalid. Call it again with corrected arguments.")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::llm::{
        ChatCompletion, ChatCompletionRequest, ChatGateway, ChatGatewayFuture, LlmGatewayError,
        ProviderFunctionCall, ProviderToolCall,
    };
    use crate::models::{ChatRole, ChatTurn, TurnContext};

    use super::{FALLBACK_RESPONSE, ResponseAgent};

    struct ScriptedGateway {
        script: Mutex<VecDeque<Result<ChatCompletion, LlmGatewayError>>>,
        requests: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<ChatCompletion, LlmGatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn recorded_requests(&self) -> Vec<ChatCompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl ChatGateway for ScriptedGateway {
        fn complete<'a>(&'a self, request: ChatCompletionRequest) -> ChatGatewayFuture<'a> {
            self.requests.lock().expect("requests lock").push(request);
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(LlmGatewayError::ProviderFailure(
                        "script exhausted".to_string(),
                    ))
                });
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

    fn tool_call_completion(name: &str, arguments: &str) -> ChatCompletion {
        ChatCompletion {
            model: "test-model".to_string(),
            provider_request_id: None,
            content: None,
            tool_calls: vec![ProviderToolCall {
                id: "call_1".to_string(),
                call_type: "function".to_string(),
                function: ProviderFunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }],
            usage: None,
        }
    }

    fn context() -> TurnContext {
        TurnContext::new(
            Uuid::new_v4(),
            "America/Los_Angeles".to_string(),
            DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .expect("timestamp should parse")
                .with_timezone(&Utc),
        )
    }

    fn history(content: &str) -> Vec<ChatTurn> {
        vec![ChatTurn {
            role: ChatRole::User,
            content: content.to_string(),
        }]
    }

    #[tokio::test]
    async fn returns_model_text_when_no_tools_are_called() {
        let gateway = ScriptedGateway::new(vec![Ok(text_completion("Hello there!"))]);
        let agent = ResponseAgent::new(gateway.clone());
        let mut ctx = context();

        let reply = agent.generate(&history("hi"), &mut ctx).await;

        assert_eq!(reply, "Hello there!");
        assert!(ctx.pending_writes.is_empty());
        let requests = gateway.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].messages.last().unwrap().role, "user");
    }

    #[tokio::test]
    async fn tool_call_round_trip_stages_reminder_and_feeds_result_back() {
        let gateway = ScriptedGateway::new(vec![
            Ok(tool_call_completion(
                "schedule_reminder",
                r#"{"datetime_phrase": "tomorrow at 9am", "reminder_content": "drink water"}"#,
            )),
            Ok(text_completion(
                "Done! I'll remind you tomorrow at 9am to drink water.",
            )),
        ]);
        let agent = ResponseAgent::new(gateway.clone());
        let mut ctx = context();

        let reply = agent
            .generate(&history("remind me tomorrow at 9am to drink water"), &mut ctx)
            .await;

        assert_eq!(reply, "Done! I'll remind you tomorrow at 9am to drink water.");
        assert_eq!(ctx.pending_writes.len(), 1);

        let requests = gateway.recorded_requests();
        assert_eq!(requests.len(), 2);
        let tool_message = requests[1]
            .messages
            .iter()
            .find(|message| message.role == "tool")
            .expect("tool result should be fed back");
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_message.content.as_deref().unwrap().contains("SUCCESS"));
    }

    #[tokio::test]
    async fn gateway_failure_yields_the_fixed_fallback() {
        let gateway = ScriptedGateway::new(vec![Err(LlmGatewayError::Timeout)]);
        let agent = ResponseAgent::new(gateway);
        let mut ctx = context();

        let reply = agent.generate(&history("hi"), &mut ctx).await;

        assert_eq!(reply, FALLBACK_RESPONSE);
        assert!(ctx.pending_writes.is_empty());
    }

    #[tokio::test]
    async fn undeclared_tool_calls_become_conversational_corrections() {
        let gateway = ScriptedGateway::new(vec![
            Ok(tool_call_completion("send_email", "{}")),
            Ok(text_completion("I can't send emails, sorry.")),
        ]);
        let agent = ResponseAgent::new(gateway.clone());
        let mut ctx = context();

        let reply = agent.generate(&history("email my boss"), &mut ctx).await;

        assert_eq!(reply, "I can't send emails, sorry.");
        assert!(ctx.pending_writes.is_empty());
        let requests = gateway.recorded_requests();
        let tool_message = requests[1]
            .messages
            .iter()
            .find(|message| message.role == "tool")
            .expect("correction should be fed back");
        assert!(
            tool_message
                .content
                .as_deref()
                .unwrap()
                .contains("not available")
        );
    }

    #[tokio::test]
    async fn round_cap_withholds_tools_and_falls_back_if_the_model_loops() {
        let looping_call = || {
            Ok(tool_call_completion(
                "schedule_reminder",
                r#"{"datetime_phrase": "tomorrow", "reminder_content": "loop"}"#,
            ))
        };
        let gateway = ScriptedGateway::new(vec![
            looping_call(),
            looping_call(),
            looping_call(),
            looping_call(),
        ]);
        let agent = ResponseAgent::new(gateway.clone());
        let mut ctx = context();

        let reply = agent.generate(&history("remind me"), &mut ctx).await;

        assert_eq!(reply, FALLBACK_RESPONSE);
        let requests = gateway.recorded_requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.last().unwrap().tools.is_empty());
    }
}
