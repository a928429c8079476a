//! Voyage AI embeddings client.
//!
//! Request/response shapes and the query-vs-document `input_type` split are
//! grounded on Voyage's own embeddings endpoint as used by the corpus's
//! `dashflow-voyage` crate. Retry/backoff parameters (15s timeout, 2 retries,
//! 250ms initial backoff doubling) come from this daemon's own resource
//! model rather than that crate's defaults.

use std::time::Duration;

use async_trait::async_trait;
use memoria_core::embedding::{EmbedRole, Embedder};
use memoria_core::error::CoreError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const VOYAGE_API_BASE: &str = "https://api.voyageai.com/v1";
const REQUEST_TIMEOUT_SECONDS: u64 = 15;
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MILLIS: u64 = 250;

/// voyage-3 and voyage-3.5 both default to 1024-dimensional output.
const VOYAGE_3_DIMENSION: usize = 1024;

pub struct VoyageEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimension: usize,
}

impl VoyageEmbedder {
    pub fn new(api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .expect("reqwest client construction with static TLS config cannot fail");
        Self {
            client,
            api_key,
            model,
            dimension: VOYAGE_3_DIMENSION,
        }
    }

    async fn embed_texts(&self, texts: &[String], input_type: &'static str) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
            input_type,
        };

        let url = format!("{VOYAGE_API_BASE}/embeddings");
        let mut attempt = 0;
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MILLIS);

        loop {
            let result = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let body: EmbedResponse = response
                        .json()
                        .await
                        .map_err(|e| CoreError::EmbedderFailed(format!("malformed Voyage response: {e}")))?;
                    return Ok(body.data.into_iter().map(|d| d.embedding).collect());
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt >= MAX_RETRIES || !status.is_server_error() {
                        return Err(CoreError::EmbedderFailed(format!("Voyage API returned {status}")));
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(CoreError::EmbedderFailed(format!("Voyage API request failed: {e}")));
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>, CoreError> {
        let input_type = match role {
            EmbedRole::Document => "document",
            EmbedRole::Query => "query",
        };
        self.embed_texts(texts, input_type).await
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    input: Vec<String>,
    model: String,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
