mod request_id;

use crate::auth::PathAuth;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::transport::{HttpTransport, UpstreamEndpoint};

use request_id::{RequestIdGenerator, RESPONSE_ID_PREFIX};

/// Shared application state accessible to all handlers.
///
/// Read-only after construction apart from the request id counter.
pub struct AppState {
    pub config: ProxyConfig,
    pub transport: HttpTransport,
    pub chat_endpoint: UpstreamEndpoint,
    pub code_endpoint: UpstreamEndpoint,
    auth: PathAuth,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// Build the shared HTTP client and both upstream endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the HTTP client or an endpoint
    /// cannot be built from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(&config)?;
        let chat_endpoint = UpstreamEndpoint::chat(&config)?;
        let code_endpoint = UpstreamEndpoint::code(&config)?;
        let auth = PathAuth::from_config(&config);

        Ok(Self {
            config,
            transport,
            chat_endpoint,
            code_endpoint,
            auth,
            request_ids: RequestIdGenerator::new(),
        })
    }

    #[must_use]
    pub fn auth(&self) -> &PathAuth {
        &self.auth
    }

    /// Correlation id from `X-Oneapi-Request-Id`, or a generated one.
    #[must_use]
    pub fn request_id(&self, headers: &http::HeaderMap) -> String {
        self.request_ids.request_id(headers)
    }

    /// `chatcmpl-<request id>`, used as the synthetic finish chunk id.
    #[must_use]
    pub fn response_id(request_id: &str) -> String {
        let mut out = String::with_capacity(RESPONSE_ID_PREFIX.len() + request_id.len());
        out.push_str(RESPONSE_ID_PREFIX);
        out.push_str(request_id);
        out
    }
}
