//! Configuration parsing and validation for thinkgate.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
///
/// Constructed once in `main` and passed into the server; there is no
/// ambient global configuration state.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    /// Model-name overrides and additions, merged over the built-in table.
    pub models: HashMap<String, String>,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

/// Upstream chat-completion provider configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the provider API (e.g., "https://integrate.api.nvidia.com/v1")
    pub url: String,
    /// Bearer token sent on every upstream call
    pub api_key: ApiKey,
    /// Outbound request timeout in seconds
    pub timeout_secs: u64,
    /// Interval between `: keep-alive` comments on streaming responses.
    /// Zero turns the comments off.
    pub heartbeat_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

fn default_upstream_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_heartbeat_secs() -> u64 {
    10
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The inner `SecretString` ensures the key value is:
/// - Zeroized in memory when dropped
/// - Never exposed via Debug or Display
/// - Only accessible via `.expose_secret()` (grep-auditable)
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter applied when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Built-in client-facing name to upstream identifier mappings.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    ("gpt-4o", "z-ai/glm4.7"),
    ("glm-4", "z-ai/glm4.7"),
    ("gpt-4", "deepseek-ai/deepseek-v3.2"),
    ("gpt-3.5-turbo", "moonshotai/kimi-k2-thinking"),
    ("deepseek-v3.2", "deepseek-ai/deepseek-v3.2"),
    ("kimi-k2-thinking", "moonshotai/kimi-k2-thinking"),
];

/// Static model-name mapping table. Read-only at request time.
#[derive(Debug, Clone)]
pub struct ModelMap {
    map: HashMap<String, String>,
}

impl ModelMap {
    /// Build the table from the defaults plus config-supplied overrides.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut map: HashMap<String, String> = DEFAULT_MAPPINGS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in overrides {
            map.insert(k.clone(), v.clone());
        }
        Self { map }
    }

    /// Resolve a client-facing model name to the upstream identifier.
    ///
    /// Exact, case-sensitive match. Unknown names pass through unchanged
    /// rather than being rejected.
    pub fn resolve<'a>(&'a self, requested: &'a str) -> &'a str {
        self.map
            .get(requested)
            .map(String::as_str)
            .unwrap_or(requested)
    }

    /// Client-facing model names, sorted, for the /v1/models listing.
    pub fn client_models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self::with_overrides(&HashMap::new())
    }
}

/// Raw upstream config deserialized directly from TOML.
/// api_key is a plain String so it may contain `${VAR}` references not yet expanded.
#[derive(Deserialize)]
struct RawUpstreamConfig {
    #[serde(default = "default_upstream_url")]
    url: String,
    api_key: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_server")]
    server: ServerConfig,
    upstream: RawUpstreamConfig,
    #[serde(default)]
    models: HashMap<String, String>,
    #[serde(default)]
    logging: LoggingConfig,
}

fn default_server() -> ServerConfig {
    ServerConfig {
        listen: default_listen(),
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// The closure-based design makes this testable without touching global env
/// state. Supports multiple `${VAR}` in one string. Fails on first missing
/// variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in '{}')",
                var_name, field
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

impl Config {
    /// Load configuration from a TOML file with environment variable expansion.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_with(&content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string, resolving `${VAR}` references
    /// through the supplied lookup.
    pub fn parse_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

        let api_key = expand_env_vars_with(&raw.upstream.api_key, "upstream.api_key", &lookup)?;
        let url = expand_env_vars_with(&raw.upstream.url, "upstream.url", &lookup)?;

        let config = Config {
            server: raw.server,
            upstream: UpstreamConfig {
                url,
                api_key: ApiKey::from(api_key),
                timeout_secs: raw.upstream.timeout_secs,
                heartbeat_secs: raw.upstream.heartbeat_secs,
            },
            models: raw.models,
            logging: raw.logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.is_empty() {
            return Err(ConfigError::Validation(
                "upstream.url must not be empty".to_string(),
            ));
        }
        if self.server.listen.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the model mapping table (defaults merged with overrides).
    pub fn model_map(&self) -> ModelMap {
        ModelMap::with_overrides(&self.models)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}
