//! Process configuration, read once from the environment at startup.

const DEFAULT_PORT: u16 = 7654;
const DEFAULT_MONGODB_DB_NAME: &str = "openclaw_memory";
const DEFAULT_VOYAGE_MODEL: &str = "voyage-3";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: Option<String>,
    pub mongodb_db_name: String,
    pub port: u16,
    pub voyage_api_key: Option<String>,
    pub voyage_mock: bool,
    pub voyage_model: String,
    pub llm_endpoint: Option<String>,
    pub llm_model: String,
    pub memory_api_key: Option<String>,
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl Config {
    /// Reads every variable documented for this daemon. Never fails on a
    /// missing optional value — only a malformed `MEMORY_DAEMON_PORT` is
    /// rejected, since silently falling back there would mask a typo.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match std::env::var("MEMORY_DAEMON_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("MEMORY_DAEMON_PORT must be a valid port number, got '{raw}'"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            mongodb_uri: std::env::var("MONGODB_URI").ok(),
            mongodb_db_name: std::env::var("MONGODB_DB_NAME").unwrap_or_else(|_| DEFAULT_MONGODB_DB_NAME.to_string()),
            port,
            voyage_api_key: std::env::var("VOYAGE_API_KEY").ok(),
            voyage_mock: env_bool("VOYAGE_MOCK"),
            voyage_model: std::env::var("VOYAGE_MODEL").unwrap_or_else(|_| DEFAULT_VOYAGE_MODEL.to_string()),
            llm_endpoint: std::env::var("LLM_ENDPOINT").ok(),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            memory_api_key: std::env::var("MEMORY_API_KEY").ok(),
        })
    }

    /// Whether the daemon should attempt a MongoDB connection rather than
    /// fall back to the in-process store.
    pub fn wants_mongodb(&self) -> bool {
        self.mongodb_uri.is_some()
    }

    /// Whether a real Voyage client should be constructed rather than the
    /// deterministic mock embedder.
    pub fn wants_real_embedder(&self) -> bool {
        !self.voyage_mock && self.voyage_api_key.is_some()
    }
}
