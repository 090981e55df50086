use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderMap;

use crate::error::ProxyError;
use crate::rewrite::rewrite_chat_body;
use crate::state::AppState;
use crate::transport::read_upstream_error;

/// `POST /v1/chat/completions`: rewrite, forward, relay whatever comes back.
pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = state.request_id(&headers);

    match forward(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            if !matches!(err, ProxyError::UpstreamApplication { .. }) {
                tracing::error!(
                    request_id = %request_id,
                    status = err.status().as_u16(),
                    error = %err,
                    "chat completion request failed"
                );
            }
            err.into_response()
        }
    }
}

async fn forward(state: &AppState, raw: &[u8]) -> Result<Response, ProxyError> {
    let upstream_body = rewrite_chat_body(raw, &state.config)?;
    let upstream = state
        .transport
        .send(&state.chat_endpoint, upstream_body)
        .await?;
    if !upstream.status().is_success() {
        return Err(read_upstream_error(&state.chat_endpoint, upstream).await);
    }
    Ok(relay_response(upstream))
}

/// Stream the upstream body through unchanged, keeping status and content type.
fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}
