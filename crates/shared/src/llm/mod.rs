pub mod gateway;
pub mod openrouter;

pub use gateway::{
    ChatCompletion, ChatCompletionRequest, ChatGateway, ChatGatewayFuture, LlmGatewayError,
    LlmTokenUsage, ProviderFunctionCall, ProviderMessage, ProviderToolCall, ToolDefinition,
};
pub use openrouter::{
    OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig, OpenRouterModelRoute,
};
