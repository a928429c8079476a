//! LLM provider: an external capability `complete(prompt) -> text`,
//! used only to enrich contradiction explanations.
//!
//! The explainer is best-effort: its contract is "runs without throwing,
//! produces a string explanation" — nothing about prompt content is
//! specified, so this module only defines the seam.

use async_trait::async_trait;

use crate::error::CoreError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError>;
}

/// No-op client: returns the heuristic explanation verbatim rather than
/// calling out to a model. Used whenever `LLM_ENDPOINT` is unset.
pub struct NullLlmClient;

#[async_trait]
impl LlmClient for NullLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_client_echoes_prompt() {
        let out = NullLlmClient.complete("explain this").await.unwrap();
        assert_eq!(out, "explain this");
    }
}
