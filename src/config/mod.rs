pub mod overrides;
pub mod validation;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use self::overrides::apply_env_overrides;
use self::validation::validate_config;

/// Model used for code completions when none is configured.
pub const DEFAULT_INSTRUCT_MODEL: &str = "gpt-3.5-turbo-instruct";
/// Locale appended to chat prompts when `chat_locale` is empty.
pub const DEFAULT_CHAT_LOCALE: &str = "zh_CN";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Process-wide proxy configuration, immutable once loaded.
///
/// Field names double as the JSON keys and as the suffix of the
/// `OVERRIDE_<KEY>` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub proxy_url: String,
    /// Upstream request timeout in seconds; `0` disables it.
    #[serde(default)]
    pub timeout: u64,

    #[serde(default)]
    pub codex_api_base: String,
    #[serde(default)]
    pub codex_api_key: String,
    #[serde(default)]
    pub codex_api_organization: String,
    #[serde(default)]
    pub codex_api_project: String,
    #[serde(default = "default_codex_api_path")]
    pub codex_api_path: String,
    #[serde(default)]
    pub code_instruct_model: String,

    #[serde(default)]
    pub chat_api_base: String,
    #[serde(default)]
    pub chat_api_key: String,
    #[serde(default)]
    pub chat_api_organization: String,
    #[serde(default)]
    pub chat_api_project: String,
    /// Upper bound for `max_tokens` on chat requests. Applied at every value,
    /// so `0` forwards `max_tokens: 0` whenever the client sends the field.
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u64,
    #[serde(default)]
    pub chat_model_default: String,
    #[serde(default)]
    pub chat_model_map: FxHashMap<String, String>,
    #[serde(default)]
    pub chat_locale: String,

    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_codex_api_path() -> String {
    "/completions".to_string()
}
fn default_chat_max_tokens() -> u64 {
    4096
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            proxy_url: String::new(),
            timeout: 0,
            codex_api_base: String::new(),
            codex_api_key: String::new(),
            codex_api_organization: String::new(),
            codex_api_project: String::new(),
            codex_api_path: default_codex_api_path(),
            code_instruct_model: DEFAULT_INSTRUCT_MODEL.to_string(),
            chat_api_base: String::new(),
            chat_api_key: String::new(),
            chat_api_organization: String::new(),
            chat_api_project: String::new(),
            chat_max_tokens: default_chat_max_tokens(),
            chat_model_default: String::new(),
            chat_model_map: FxHashMap::default(),
            chat_locale: String::new(),
            auth_token: String::new(),
            log_level: default_log_level(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
        }
    }
}

impl ProxyConfig {
    /// Upstream model name for a client-requested chat model.
    ///
    /// Unknown or missing names resolve to `chat_model_default`.
    #[must_use]
    pub fn resolve_chat_model(&self, requested: Option<&str>) -> &str {
        requested
            .and_then(|model| self.chat_model_map.get(model))
            .map_or(self.chat_model_default.as_str(), String::as_str)
    }

    #[must_use]
    pub fn chat_locale_or_default(&self) -> &str {
        if self.chat_locale.is_empty() {
            DEFAULT_CHAT_LOCALE
        } else {
            &self.chat_locale
        }
    }

    /// Listen address, accepting the `:port` shorthand for all interfaces.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.bind.starts_with(':') {
            format!("0.0.0.0{}", self.bind)
        } else {
            self.bind.clone()
        }
    }

    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        join_url(&self.chat_api_base, "/chat/completions")
    }

    #[must_use]
    pub fn code_completions_url(&self) -> String {
        join_url(&self.codex_api_base, &self.codex_api_path)
    }

    fn apply_defaults(&mut self) {
        if self.code_instruct_model.is_empty() {
            self.code_instruct_model = DEFAULT_INSTRUCT_MODEL.to_string();
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let mut out = String::with_capacity(base.len() + path.len() + 1);
    out.push_str(base.trim_end_matches('/'));
    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    out
}

/// Parse configuration text, choosing the format from the file extension.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Json`] when parsing fails.
pub fn parse_config(path: &str, contents: &str) -> Result<ProxyConfig, ConfigError> {
    let is_yaml = path.ends_with(".yaml") || path.ends_with(".yml");
    if is_yaml {
        Ok(serde_yaml::from_str(contents)?)
    } else {
        Ok(serde_json::from_str(contents)?)
    }
}

/// Load configuration from a file, apply `OVERRIDE_*` environment variables
/// and validate the result.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, a parse error when
/// the contents are malformed, or [`ConfigError::Validation`] when semantic
/// validation fails.
pub fn load_config(path: &str) -> Result<ProxyConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config = parse_config(path, &contents)?;
    apply_env_overrides(&mut config);
    config.apply_defaults();
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.json");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.code_instruct_model, "stable-code-3b");
        assert_eq!(config.chat_max_tokens, 4096);
        assert_eq!(config.chat_model_map.len(), 2);
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = "chat_api_base: https://api.example.com/v1\n\
                    codex_api_base: https://code.example.com/v1\n\
                    chat_model_default: gpt-4o-mini\n\
                    chat_model_map:\n  gpt-4: gpt-4o\n";
        let config = parse_config("config.yaml", yaml).unwrap();
        assert_eq!(config.chat_model_map.get("gpt-4").unwrap(), "gpt-4o");
        assert_eq!(config.codex_api_path, "/completions");
    }

    #[test]
    fn test_empty_instruct_model_falls_back() {
        let mut config: ProxyConfig =
            serde_json::from_str(r#"{"code_instruct_model":""}"#).unwrap();
        config.apply_defaults();
        assert_eq!(config.code_instruct_model, DEFAULT_INSTRUCT_MODEL);
    }

    #[test]
    fn test_resolve_chat_model() {
        let mut config = ProxyConfig {
            chat_model_default: "fallback".to_string(),
            ..ProxyConfig::default()
        };
        config
            .chat_model_map
            .insert("gpt-4".to_string(), "gpt-4o".to_string());

        assert_eq!(config.resolve_chat_model(Some("gpt-4")), "gpt-4o");
        assert_eq!(config.resolve_chat_model(Some("unknown")), "fallback");
        assert_eq!(config.resolve_chat_model(None), "fallback");
    }

    #[test]
    fn test_bind_addr_shorthand() {
        let config = ProxyConfig {
            bind: ":9090".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn test_upstream_urls() {
        let config = ProxyConfig {
            chat_api_base: "https://api.example.com/v1/".to_string(),
            codex_api_base: "https://code.example.com/v1".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(
            config.chat_completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            config.code_completions_url(),
            "https://code.example.com/v1/completions"
        );
    }
}
