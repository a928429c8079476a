//! OpenAI-compatible chat-completions client, used as the best-effort
//! explainer behind [`memoria_core::llm::LlmClient`].
//!
//! Request/response shapes follow the OpenAI chat-completions contract,
//! which `LLM_ENDPOINT` is documented to point at (any compatible gateway).
//! Retry/backoff parameters (30s timeout, 2 retries, 250ms initial backoff
//! doubling) come from this daemon's resource model.

use std::time::Duration;

use async_trait::async_trait;
use memoria_core::error::CoreError;
use memoria_core::llm::LlmClient;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT_SECONDS: u64 = 30;
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MILLIS: u64 = 250;

pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .expect("reqwest client construction with static TLS config cannot fail");
        Self { client, endpoint, model, api_key }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage { role: "user", content: prompt.to_string() }],
        };

        let mut attempt = 0;
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MILLIS);

        loop {
            let mut req = self.client.post(&self.endpoint).json(&request);
            if let Some(key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }

            match req.send().await {
                Ok(response) if response.status().is_success() => {
                    let body: ChatResponse = response
                        .json()
                        .await
                        .map_err(|e| CoreError::LlmFailed(format!("malformed LLM response: {e}")))?;
                    return body
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| CoreError::LlmFailed("LLM response had no choices".into()));
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt >= MAX_RETRIES || !status.is_server_error() {
                        return Err(CoreError::LlmFailed(format!("LLM endpoint returned {status}")));
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(CoreError::LlmFailed(format!("LLM request failed: {e}")));
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_prompt_as_single_user_message() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage { role: "user", content: "explain".to_string() }],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"explain\""));
    }

    #[test]
    fn chat_response_extracts_first_choice_content() {
        let json = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, "hello");
    }
}
