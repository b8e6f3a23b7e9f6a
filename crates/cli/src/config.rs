//! Configuration loading from relay.toml.

use runtime::BridgeLimits;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "relay.toml";

/// Top-level configuration. Every field has a default.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Sse,
    Stdio,
}

/// Where the MCP tool host lives.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub transport: TransportKind,

    /// SSE endpoint, used with `transport = "sse"`.
    pub url: String,

    /// Program to spawn, used with `transport = "stdio"`.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,

    /// Prompt fetched to seed each conversation. Empty disables seeding.
    pub seed_prompt: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            url: "http://localhost:8080/sse".to_string(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            seed_prompt: "get_initial_prompts".to_string(),
        }
    }
}

/// Ollama connection settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: runtime::providers::ollama::DEFAULT_BASE_URL.to_string(),
            model: runtime::providers::ollama::DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub connect_timeout_secs: u64,
    pub turn_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let limits = BridgeLimits::default();
        Self {
            connect_timeout_secs: limits.connect.as_secs(),
            turn_timeout_secs: limits.turn.as_secs(),
        }
    }
}

/// Values from flags or the environment that win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub model: Option<String>,
    pub ollama_url: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load an explicit file, or `relay.toml` when present, or defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.url {
            self.host.url = url;
        }
        if let Some(model) = overrides.model {
            self.provider.model = model;
        }
        if let Some(base_url) = overrides.ollama_url {
            self.provider.base_url = with_scheme(base_url);
        }
    }

    /// The tool host endpoint described by `[host]`.
    pub fn endpoint(&self) -> Result<mcp::Endpoint, ConfigError> {
        match self.host.transport {
            TransportKind::Sse => {
                let url = self.host.url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "host.url must be an http(s) URL, got {url:?}"
                    )));
                }
                Ok(mcp::Endpoint::Sse {
                    url: url.to_string(),
                })
            }
            TransportKind::Stdio => {
                let command = self
                    .host
                    .command
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::Invalid(
                            "host.command is required for the stdio transport".into(),
                        )
                    })?;
                Ok(mcp::Endpoint::Stdio {
                    command: command.to_string(),
                    args: self.host.args.clone(),
                    env: self.host.env.clone(),
                })
            }
        }
    }

    pub fn provider_timeouts(&self) -> Result<(Duration, Duration), ConfigError> {
        Ok((
            seconds("provider.timeout_secs", self.provider.timeout_secs)?,
            seconds(
                "provider.connect_timeout_secs",
                self.provider.connect_timeout_secs,
            )?,
        ))
    }

    pub fn bridge_limits(&self) -> Result<BridgeLimits, ConfigError> {
        Ok(BridgeLimits {
            connect: seconds("bridge.connect_timeout_secs", self.bridge.connect_timeout_secs)?,
            turn: seconds("bridge.turn_timeout_secs", self.bridge.turn_timeout_secs)?,
        })
    }
}

/// Longest timeout accepted for any setting (one day).
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn seconds(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    if value > MAX_TIMEOUT_SECS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be at most {MAX_TIMEOUT_SECS} seconds"
        )));
    }
    Ok(Duration::from_secs(value))
}

/// `OLLAMA_HOST` is often given as `host:port`.
fn with_scheme(url: String) -> String {
    if url.contains("://") {
        url
    } else {
        format!("http://{url}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
