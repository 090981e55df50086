use std::time::Duration;

use crate::config::ProxyConfig;
use crate::error::ProxyError;

use super::UpstreamEndpoint;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(config: &ProxyConfig) -> Result<reqwest::Client, ProxyError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    if config.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout));
    }

    if config.proxy_url.is_empty() {
        builder = builder.no_proxy();
    } else {
        let proxy = reqwest::Proxy::all(&config.proxy_url)
            .map_err(|err| ProxyError::Internal(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| ProxyError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client shared by every in-flight request.
///
/// There is deliberately no retry loop: a failed upstream call is reported to
/// the client straight away.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport from the proxy config (pool sizing, proxy, timeout).
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the proxy URL is invalid or the
    /// client cannot be constructed.
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
        })
    }

    /// POST `body` to `endpoint` and return the response with its body unread.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UpstreamTimeout`] when the configured timeout
    /// elapses and [`ProxyError::UpstreamTransport`] for any other failure to
    /// obtain a response.
    pub async fn send(
        &self,
        endpoint: &UpstreamEndpoint,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = reqwest::Request::new(http::Method::POST, endpoint.url().clone());
        *request.headers_mut() = endpoint.headers().clone();
        *request.body_mut() = Some(reqwest::Body::from(body));

        self.client.execute(request).await.map_err(ProxyError::from)
    }
}

/// Drain a non-success upstream response into [`ProxyError::UpstreamApplication`],
/// logging the upstream body.
pub async fn read_upstream_error(
    endpoint: &UpstreamEndpoint,
    response: reqwest::Response,
) -> ProxyError {
    let status = response.status();
    let content_type = response.headers().get(http::header::CONTENT_TYPE).cloned();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(
                upstream = endpoint.name(),
                error = %err,
                "failed to read upstream error body"
            );
            bytes::Bytes::new()
        }
    };

    tracing::error!(
        upstream = endpoint.name(),
        status = status.as_u16(),
        body = %String::from_utf8_lossy(&body),
        "upstream request failed"
    );

    ProxyError::UpstreamApplication {
        status,
        content_type,
        body,
    }
}
