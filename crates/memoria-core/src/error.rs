//! Core error taxonomy.
//!
//! Every fallible operation in this crate returns a [`CoreError`]. The HTTP
//! transport (outside this crate) maps variants to status codes; nothing in
//! here knows about HTTP.

/// Error taxonomy for the reliability engine.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Request-shape or value-range errors. Maps to 400.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown id/slug. Maps to 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or bad API key. Maps to 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Document store connection or command failure. Maps to 500.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding provider failed after retries. Maps to 503 synchronously,
    /// stage-failed in the pipeline.
    #[error("embedder failed: {0}")]
    EmbedderFailed(String),

    /// LLM provider failed after retries. Maps to 503 synchronously,
    /// stage-failed in the pipeline.
    #[error("llm failed: {0}")]
    LlmFailed(String),

    /// A soft deadline or per-call timeout was exceeded. Maps to 504
    /// synchronously, stage-failed in the pipeline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// In-flight work cancelled by graceful shutdown.
    #[error("shutdown in progress")]
    Shutdown,
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Whether the scheduler should keep retrying an operation that failed
    /// with this error rather than treat it as fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::StoreUnavailable(_) | CoreError::EmbedderFailed(_) | CoreError::LlmFailed(_) | CoreError::Timeout(_)
        )
    }
}

impl From<crate::model::MemoryValidationError> for CoreError {
    fn from(e: crate::model::MemoryValidationError) -> Self {
        CoreError::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
