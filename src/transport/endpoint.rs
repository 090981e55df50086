use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::HeaderMap;

use crate::config::ProxyConfig;
use crate::error::ProxyError;

const OPENAI_ORGANIZATION: HeaderName = HeaderName::from_static("openai-organization");
const OPENAI_PROJECT: HeaderName = HeaderName::from_static("openai-project");

/// Precomputed URL and static headers for one upstream backend.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    name: &'static str,
    url: url::Url,
    headers: HeaderMap,
}

impl UpstreamEndpoint {
    /// Chat backend: `chat_api_base` + `/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the URL or a credential header is invalid.
    pub fn chat(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::new(
            "chat",
            &config.chat_completions_url(),
            &config.chat_api_key,
            &config.chat_api_organization,
            &config.chat_api_project,
        )
    }

    /// Code backend: `codex_api_base` + `codex_api_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the URL or a credential header is invalid.
    pub fn code(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::new(
            "code",
            &config.code_completions_url(),
            &config.codex_api_key,
            &config.codex_api_organization,
            &config.codex_api_project,
        )
    }

    fn new(
        name: &'static str,
        url: &str,
        api_key: &str,
        organization: &str,
        project: &str,
    ) -> Result<Self, ProxyError> {
        let url = url::Url::parse(url)
            .map_err(|e| ProxyError::Internal(format!("invalid {name} upstream URL: {e}")))?;

        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(name, &format!("Bearer {api_key}"))?);
        if !organization.is_empty() {
            headers.insert(OPENAI_ORGANIZATION, header_value(name, organization)?);
        }
        if !project.is_empty() {
            headers.insert(OPENAI_PROJECT, header_value(name, project)?);
        }

        Ok(Self { name, url, headers })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::Internal(format!("invalid {name} upstream header value: {e}")))
}
