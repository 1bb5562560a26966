use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::llm_types::{
    ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse, Message, ModelList,
};

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends the full outgoing message list and returns the assistant text.
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String, RelayError>;

    async fn list_models(&self) -> Result<ModelList, RelayError> {
        Err(RelayError::RemoteService(
            "model listing is not supported by this provider".into(),
        ))
    }
}

pub fn create_provider(config: &Config) -> Result<Box<dyn CompletionProvider>, RelayError> {
    Ok(Box::new(OpenAiProvider::new(config)?))
}

/// Shared reqwest client honouring the configured request timeout.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| RelayError::StartupConfig(format!("Failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible provider
// ---------------------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    chat_url: String,
    models_url: String,
}

impl OpenAiProvider {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let root = config.api_root();
        Ok(OpenAiProvider {
            http: build_http_client(config)?,
            api_key: config.api_key.clone(),
            chat_url: format!("{root}/chat/completions"),
            models_url: format!("{root}/models"),
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

fn remote_error(status: reqwest::StatusCode, body: &str) -> RelayError {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(err) => RelayError::RemoteService(err.error.message),
        Err(_) => RelayError::RemoteService(format!("HTTP {status}: {body}")),
    }
}

fn send_failed(e: reqwest::Error) -> RelayError {
    RelayError::RemoteService(format!("Request to provider failed: {e}"))
}

/// Picks the first choice's content; a missing or null content is an empty reply.
fn reply_text(resp: ChatCompletionResponse) -> Result<String, RelayError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::RemoteService("Provider returned no choices".into()))?;
    if let Some(role) = choice.message.role.as_deref() {
        if role != "assistant" {
            warn!("Completion choice has unexpected role '{role}'");
        }
    }
    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String, RelayError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
        };
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .authorize(self.http.post(&self.chat_url).json(&request))
            .send()
            .await
            .map_err(send_failed)?;
        let status = response.status();
        let text = response.text().await.map_err(send_failed)?;

        if !status.is_success() {
            return Err(remote_error(status, &text));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            RelayError::RemoteService(format!("Failed to parse completion response: {e}"))
        })?;
        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }
        reply_text(parsed)
    }

    async fn list_models(&self) -> Result<ModelList, RelayError> {
        let response = self
            .authorize(self.http.get(&self.models_url))
            .send()
            .await
            .map_err(send_failed)?;
        let status = response.status();
        let text = response.text().await.map_err(send_failed)?;
        if !status.is_success() {
            return Err(remote_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| {
            RelayError::RemoteService(format!("Failed to parse model list: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn response(value: serde_json::Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_reply_text_first_choice() {
        let resp = response(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        }));
        assert_eq!(reply_text(resp).unwrap(), "first");
    }

    #[test]
    fn test_reply_text_null_content_is_empty() {
        let resp = response(json!({"choices": [{"message": {"role": "assistant", "content": null}}]}));
        assert_eq!(reply_text(resp).unwrap(), "");
    }

    #[test]
    fn test_reply_text_no_choices_is_remote_error() {
        let err = reply_text(response(json!({"choices": []}))).unwrap_err();
        assert!(matches!(err, RelayError::RemoteService(_)));
    }

    #[test]
    fn test_remote_error_unwraps_provider_message() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let err = remote_error(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.to_string(), "Rate limit reached");
    }

    #[test]
    fn test_remote_error_plain_body() {
        let err = remote_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(err.to_string().starts_with("HTTP 502"));
    }

    #[test]
    fn test_provider_urls_use_api_version() {
        let mut config = Config::test_defaults();
        config.api_base_url = "http://localhost:9999".into();
        config.api_version = "v2".into();
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.chat_url, "http://localhost:9999/v2/chat/completions");
        assert_eq!(provider.models_url, "http://localhost:9999/v2/models");
    }

    #[tokio::test]
    async fn test_complete_unreachable_provider_is_remote_error() {
        let mut config = Config::test_defaults();
        config.api_base_url = "http://127.0.0.1:9".into();
        let provider = OpenAiProvider::new(&config).unwrap();
        let err = provider
            .complete("gpt-4o-mini", vec![Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::RemoteService(_)));
    }
}
