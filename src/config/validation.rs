use super::{ConfigError, ProxyConfig};

/// Validate the loaded proxy config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    validate_upstream_base("chat_api_base", &config.chat_api_base)?;
    validate_upstream_base("codex_api_base", &config.codex_api_base)?;
    validate_chat_settings(config)?;
    validate_http_settings(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_upstream_base(field: &str, base: &str) -> Result<(), ConfigError> {
    if base.trim().is_empty() {
        return Err(validation_err(format!("{field} cannot be empty")));
    }
    let parsed = url::Url::parse(base)
        .map_err(|e| validation_err(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "{field} must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

fn validate_chat_settings(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.chat_model_default.trim().is_empty() {
        return Err(validation_err("chat_model_default cannot be empty"));
    }
    for (from, to) in &config.chat_model_map {
        if to.trim().is_empty() {
            return Err(validation_err(format!(
                "chat_model_map entry '{from}' maps to an empty model"
            )));
        }
    }
    Ok(())
}

fn validate_http_settings(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if !config.proxy_url.is_empty() {
        url::Url::parse(&config.proxy_url)
            .map_err(|e| validation_err(format!("proxy_url is not a valid URL: {e}")))?;
    }
    if !config.codex_api_path.is_empty() && !config.codex_api_path.starts_with('/') {
        return Err(validation_err("codex_api_path must start with '/'"));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_log_level(config: &ProxyConfig) -> Result<(), ConfigError> {
    let level = config.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {VALID_LOG_LEVELS:?}, got '{}'",
            config.log_level
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ProxyConfig {
        ProxyConfig {
            chat_api_base: "https://api.example.com/v1".to_string(),
            codex_api_base: "https://code.example.com/v1".to_string(),
            chat_model_default: "gpt-4o-mini".to_string(),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_chat_base_rejected() {
        let config = ProxyConfig {
            chat_api_base: String::new(),
            ..valid_config()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("chat_api_base"));
    }

    #[test]
    fn test_non_http_base_rejected() {
        let config = ProxyConfig {
            codex_api_base: "ftp://code.example.com".to_string(),
            ..valid_config()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_default_model_rejected() {
        let config = ProxyConfig {
            chat_model_default: " ".to_string(),
            ..valid_config()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let config = ProxyConfig {
            log_level: "warning".to_string(),
            ..valid_config()
        };
        assert!(validate_config(&config).is_ok());

        let config = ProxyConfig {
            log_level: "verbose".to_string(),
            ..valid_config()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_proxy_url_rejected() {
        let config = ProxyConfig {
            proxy_url: "not a url".to_string(),
            ..valid_config()
        };
        assert!(validate_config(&config).is_err());
    }
}
