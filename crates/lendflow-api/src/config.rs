use config::{Config as ConfigLoader, ConfigError, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub agent: AgentConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: Option<String>,
    #[serde(default)]
    pub agent_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Built-in scripted walkthrough, no external service
    Demo,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub mode: AgentMode,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub token_delay_ms: u64,
    pub channel_capacity: usize,
    pub result_preview_chars: usize,
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_agent_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Environment variable → config key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("PORT", "server.port"),
    ("AGENT_MODE", "agent.mode"),
    ("AGENT_ENDPOINT", "agent.endpoint"),
    ("AGENT_TOKEN_DELAY_MS", "agent.token_delay_ms"),
    ("AGENT_CHANNEL_CAPACITY", "agent.channel_capacity"),
    ("AGENT_RESULT_PREVIEW_CHARS", "agent.result_preview_chars"),
    ("AGENT_TIMEOUT_SECS", "agent.timeout_secs"),
    ("STORE_BACKEND", "store.backend"),
    ("STORE_DATABASE", "store.database"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
];

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (SERVER_, AGENT_, STORE_, LOG_ prefixes)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Secrets never come from TOML
        cfg.mongodb_uri = std::env::var("MONGODB_URI").ok().filter(|v| !v.is_empty());
        cfg.agent_api_key = std::env::var("AGENT_API_KEY").ok().filter(|v| !v.is_empty());

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Secrets are only required by the backends that use them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Mongodb && self.mongodb_uri.is_none() {
            return Err(ConfigError::Message(
                "MONGODB_URI environment variable is required for the mongodb store".to_string(),
            ));
        }
        if self.agent.mode == AgentMode::Remote && self.agent.endpoint.is_empty() {
            return Err(ConfigError::Message(
                "agent.endpoint is required in remote mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for tests and embedding: demo agent, in-memory store
    pub fn local() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cors: CorsConfig {
                enabled: false,
                origins: Vec::new(),
            },
            agent: AgentConfig {
                mode: AgentMode::Demo,
                endpoint: String::new(),
                token_delay_ms: 0,
                channel_capacity: 1000,
                result_preview_chars: 100,
                timeout_secs: default_agent_timeout(),
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                database: "lendflow".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            mongodb_uri: None,
            agent_api_key: None,
        }
    }
}
