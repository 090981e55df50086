use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Error type shared by the chat and code-completion paths.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    ClientInput(String),
    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),
    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),
    #[error("Upstream error: status={status}")]
    UpstreamApplication {
        status: StatusCode,
        content_type: Option<http::HeaderValue>,
        body: bytes::Bytes,
    },
    #[error("Failed to decode stream frame: {0}")]
    FrameDecode(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status reported to the client for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ClientInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ProxyError::UpstreamApplication { status, .. } => *status,
            ProxyError::UpstreamTransport(_)
            | ProxyError::FrameDecode(_)
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout(err.to_string())
        } else {
            ProxyError::UpstreamTransport(err.to_string())
        }
    }
}

/// Chat-path rendering: application errors relay the upstream status, content
/// type and body verbatim; everything else is a bare status code.
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::UpstreamApplication {
                status,
                content_type,
                body,
            } => {
                let mut response = Response::new(axum::body::Body::from(body));
                *response.status_mut() = status;
                if let Some(content_type) = content_type {
                    response
                        .headers_mut()
                        .insert(http::header::CONTENT_TYPE, content_type);
                }
                response
            }
            other => other.status().into_response(),
        }
    }
}
