use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest, ContentPart};
use genai::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::cache::ResponseCache;
use crate::llm::prompts;
use crate::llm::types::{
    ActCommand, ActRequest, ExtractRequest, ExtractResponse, ObserveRequest, ObserveResponse,
    VerifyRequest,
};

/// LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
    Gemini,
}

impl LlmProvider {
    /// Environment variable carrying the API key for this provider.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Detect the provider from a model name prefix.
    pub fn from_model(model: &str) -> Option<Self> {
        if model.starts_with("claude") {
            Some(LlmProvider::Anthropic)
        } else if model.starts_with("gpt") || model.starts_with("o1") {
            Some(LlmProvider::OpenAi)
        } else if model.starts_with("gemini") {
            Some(LlmProvider::Gemini)
        } else {
            None
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "openai" | "gpt" => Ok(LlmProvider::OpenAi),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            _ => Err(anyhow!("Unknown LLM provider: {}", s)),
        }
    }
}

/// The four prompt functions the loops close over, plus the vision
/// capability query. Implementations parse the model's JSON for the caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Next elementary command for the goal, or `None` when the current
    /// chunk offers no actionable element.
    async fn act(&self, request: ActRequest) -> Result<Option<ActCommand>>;

    async fn extract(&self, request: ExtractRequest) -> Result<ExtractResponse>;

    async fn observe(&self, request: ObserveRequest) -> Result<ObserveResponse>;

    async fn verify_act_completion(&self, request: VerifyRequest) -> Result<bool>;

    fn supports_vision(&self, model: &str) -> bool;
}

/// genai-backed client. Provider is auto-detected from the model name
/// prefix; API keys come from the provider's environment variable.
pub struct GenAiClient {
    client: Client,
    cache: Option<Arc<ResponseCache>>,
}

impl GenAiClient {
    pub fn new(cache: Option<Arc<ResponseCache>>) -> Self {
        Self {
            client: Client::default(),
            cache,
        }
    }

    /// Export an API key into the provider's environment variable so genai
    /// picks it up on the first request.
    pub fn with_api_key(self, provider: LlmProvider, api_key: &str) -> Self {
        std::env::set_var(provider.api_key_env_var(), api_key);
        self
    }

    /// One prompt round: cache lookup, chat exchange, JSON parse, cache fill.
    async fn chat_json(
        &self,
        kind: &str,
        system: &str,
        user_text: String,
        screenshot: Option<&str>,
        model: &str,
        payload: &Value,
        request_id: &str,
    ) -> Result<Value> {
        let key = ResponseCache::key(kind, payload);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!(kind, "LLM cache hit");
                return Ok(hit);
            }
        }

        let mut parts = vec![ContentPart::from_text(user_text)];
        if let Some(b64) = screenshot {
            parts.push(ContentPart::from_binary_base64(
                "image/jpeg",
                b64.to_string(),
                Some("screenshot.jpg".to_string()),
            ));
        }

        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(parts)]);

        let response = self
            .client
            .exec_chat(model, request, None)
            .await
            .map_err(|e| anyhow!("LLM request failed: {}", e))?;

        let text = response
            .first_text()
            .ok_or_else(|| anyhow!("No text in LLM response"))?;

        let json = prompts::strip_code_fences(text);
        let value: Value = serde_json::from_str(json)
            .map_err(|e| anyhow!("Malformed {} response from model: {} ({})", kind, e, json))?;

        if let Some(cache) = &self.cache {
            cache.put(key, request_id, value.clone());
        }
        Ok(value)
    }
}

#[async_trait]
impl LlmClient for GenAiClient {
    async fn act(&self, request: ActRequest) -> Result<Option<ActCommand>> {
        let payload = serde_json::to_value(&request)?;
        let user = prompts::format_act_message(&request.action, &request.dom_elements, &request.steps);
        let value = self
            .chat_json(
                "act",
                prompts::ACT_SYSTEM_PROMPT,
                user,
                request.screenshot.as_deref(),
                &request.model_name,
                &payload,
                &request.request_id,
            )
            .await?;

        // null, or any shape without an element ID, means "nothing to do here"
        if value.is_null() || value.get("element").is_none() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn extract(&self, request: ExtractRequest) -> Result<ExtractResponse> {
        let payload = serde_json::to_value(&request)?;
        let user = prompts::format_extract_message(
            &request.instruction,
            &request.progress,
            &request.previously_extracted_content,
            &request.dom_elements,
            &request.schema,
            request.chunks_seen,
            request.chunks_total,
        );
        let value = self
            .chat_json(
                "extract",
                prompts::EXTRACT_SYSTEM_PROMPT,
                user,
                None,
                &request.model_name,
                &payload,
                &request.request_id,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn observe(&self, request: ObserveRequest) -> Result<ObserveResponse> {
        let payload = serde_json::to_value(&request)?;
        let user = prompts::format_observe_message(&request.instruction, &request.dom_elements);
        let value = self
            .chat_json(
                "observe",
                prompts::OBSERVE_SYSTEM_PROMPT,
                user,
                request.screenshot.as_deref(),
                &request.model_name,
                &payload,
                &request.request_id,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn verify_act_completion(&self, request: VerifyRequest) -> Result<bool> {
        let payload = serde_json::to_value(&request)?;
        let user = prompts::format_verify_message(
            &request.goal,
            &request.steps,
            request.dom_elements.as_deref(),
        );
        let value = self
            .chat_json(
                "verifyActCompletion",
                prompts::VERIFY_SYSTEM_PROMPT,
                user,
                request.screenshot.as_deref(),
                &request.model_name,
                &payload,
                &request.request_id,
            )
            .await?;

        Ok(match &value {
            Value::Bool(b) => *b,
            Value::Object(map) => map
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            _ => false,
        })
    }

    fn supports_vision(&self, model: &str) -> bool {
        const VISION_PREFIXES: &[&str] = &[
            "gpt-4o",
            "gpt-4.1",
            "gpt-4-turbo",
            "claude-3",
            "claude-sonnet",
            "claude-opus",
            "gemini",
        ];
        VISION_PREFIXES.iter().any(|p| model.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_model_prefix() {
        assert_eq!(
            LlmProvider::from_model("claude-sonnet-4-20250514"),
            Some(LlmProvider::Anthropic)
        );
        assert_eq!(LlmProvider::from_model("gpt-4o"), Some(LlmProvider::OpenAi));
        assert_eq!(
            LlmProvider::from_model("gemini-2.5-flash"),
            Some(LlmProvider::Gemini)
        );
        assert_eq!(LlmProvider::from_model("llama-3"), None);
    }

    #[test]
    fn vision_support_is_prefix_based() {
        let client = GenAiClient::new(None);
        assert!(client.supports_vision("gpt-4o"));
        assert!(client.supports_vision("claude-3-5-sonnet-20241022"));
        assert!(!client.supports_vision("gpt-3.5-turbo"));
    }
}
