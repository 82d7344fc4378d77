use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Per-call timeout for provider/summarizer/vision HTTP requests (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Top-level config (maestro.toml + MAESTRO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// The one project this deployment serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Root of the pre-ingested knowledge store.
    pub knowledge_path: String,
    /// Identity + experience directory (soul.json, tone.json, experience/).
    #[serde(default = "default_identity_path")]
    pub identity_path: String,
    /// Scratch directory: heartbeat state, highlight artifacts, thumb cache.
    #[serde(default = "default_workspaces_path")]
    pub workspaces_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiConfig>,
    pub google: Option<GoogleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub api_key: String,
    #[serde(default = "default_google_base_url")]
    pub base_url: String,
}

/// Outbound text-message service (Sendblue-compatible REST API).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagingConfig {
    #[serde(default = "default_messaging_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key_id: String,
    #[serde(default)]
    pub api_secret_key: String,
    /// Our own send number — inbound echoes from it are dropped.
    #[serde(default)]
    pub from_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_name")]
    pub default: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default: default_engine_name(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    "maestro.db".to_string()
}
fn default_identity_path() -> String {
    "identity".to_string()
}
fn default_workspaces_path() -> String {
    "workspaces".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_google_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_messaging_base_url() -> String {
    "https://api.sendblue.co/api".to_string()
}
fn default_engine_name() -> String {
    crate::engines::DEFAULT_ENGINE.to_string()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl MaestroConfig {
    /// Load config from a TOML file with MAESTRO_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("maestro.toml");

        let config: MaestroConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MAESTRO_").split("_"))
            .extract()
            .map_err(|e| crate::error::MaestroError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Startup validation — fail before opening ports when the deployment
    /// cannot possibly work.
    pub fn validate(&self, engine: &crate::engines::EngineSpec) -> crate::error::Result<()> {
        if !std::path::Path::new(&self.project.knowledge_path).is_dir() {
            return Err(crate::error::MaestroError::Config(format!(
                "knowledge store not found at '{}'",
                self.project.knowledge_path
            )));
        }
        let has_key = match engine.provider {
            crate::engines::ProviderKind::Anthropic => self.providers.anthropic.is_some(),
            crate::engines::ProviderKind::OpenAi => self.providers.openai.is_some(),
            crate::engines::ProviderKind::Google => self.providers.google.is_some(),
        };
        if !has_key {
            return Err(crate::error::MaestroError::Config(format!(
                "no API key configured for provider '{}' (engine '{}')",
                engine.provider, engine.name
            )));
        }
        Ok(())
    }
}
