//! services/api/src/adapters/completion_llm.rs
//!
//! This module contains the adapter for the tutor's completion LLM.
//! It implements the `CompletionService` port from the `core` crate against any
//! OpenAI-compatible chat completions endpoint (OpenRouter by default).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};
use tutor_core::ports::{CompletionRequest, CompletionService, PortError, PortResult};

/// Returned when the provider answers successfully but with no text.
pub const EMPTY_REPLY: &str =
    "I apologize, but I could not generate a response. Please try again.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenRouterCompletionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenRouterCompletionAdapter {
    /// Creates a new `OpenRouterCompletionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Builds a client for an OpenAI-compatible base URL such as OpenRouter's.
    pub fn client_for(api_base: &str, api_key: &str) -> Client<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Client::with_config(config)
    }

    fn build_messages(request: &CompletionRequest) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_instruction.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_message.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ])
    }
}

fn reply_or_default(content: Option<String>) -> String {
    match content {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            warn!("Completion provider returned no content.");
            EMPTY_REPLY.to_string()
        }
    }
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenRouterCompletionAdapter {
    async fn complete(&self, request: CompletionRequest) -> PortResult<String> {
        let messages = Self::build_messages(&request)?;

        #[allow(deprecated)]
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Map the error manually, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        debug!(model = %self.model, choices = response.choices.len(), "Completion received.");

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        Ok(reply_or_default(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_gets_the_apology() {
        assert_eq!(reply_or_default(None), EMPTY_REPLY);
        assert_eq!(reply_or_default(Some("  \n".to_string())), EMPTY_REPLY);
        assert_eq!(reply_or_default(Some("Hi!".to_string())), "Hi!");
    }

    #[test]
    fn request_becomes_system_then_user_message() {
        let request = CompletionRequest {
            system_instruction: "be a tutor".to_string(),
            user_message: "what is pi".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        };
        let messages = OpenRouterCompletionAdapter::build_messages(&request).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
    }
}
