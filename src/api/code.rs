use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use http::HeaderMap;

use crate::error::ProxyError;
use crate::rewrite::fim::blanks_end_of_sentence;
use crate::rewrite::rewrite_code_body;
use crate::state::AppState;
use crate::stream::{
    sse_abort_response, sse_ok_response, spawn_frame_reader, translated_body, StreamTranslator,
};
use crate::transport::read_upstream_error;

use super::REQUEST_BODY_LIMIT_BYTES;

/// Fixed pause before any work on a code completion. Editors fire one request
/// per keystroke and cancel the previous one.
const CODE_DEBOUNCE: Duration = Duration::from_millis(100);

/// `POST /v1/engines/copilot-codex/completions`.
///
/// Always answers with an event stream. Failures before the stream starts use
/// the mapped status and the body `data: [DONE]\n`. A client disconnect drops
/// this future, which cancels the upstream call.
pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: Body) -> Response {
    tokio::time::sleep(CODE_DEBOUNCE).await;

    let request_id = state.request_id(&headers);
    match start_stream(&state, &request_id, body).await {
        Ok(response) => response,
        Err(err) => abort_codex(&request_id, &err),
    }
}

async fn start_stream(
    state: &AppState,
    request_id: &str,
    body: Body,
) -> Result<Response, ProxyError> {
    let raw = axum::body::to_bytes(body, REQUEST_BODY_LIMIT_BYTES)
        .await
        .map_err(|err| ProxyError::ClientInput(format!("failed to read request body: {err}")))?;

    let upstream_body = rewrite_code_body(&raw, &state.config)?;
    let upstream = state
        .transport
        .send(&state.code_endpoint, upstream_body)
        .await?;
    if !upstream.status().is_success() {
        return Err(read_upstream_error(&state.code_endpoint, upstream).await);
    }

    let model = state.config.code_instruct_model.clone();
    let blank_end_of_sentence = blanks_end_of_sentence(&model);
    let translator = StreamTranslator::new(
        AppState::response_id(request_id),
        model,
        blank_end_of_sentence,
    );
    let signals = spawn_frame_reader(upstream.bytes_stream());
    let events = translated_body(signals, translator);

    tracing::debug!(request_id, "code completion stream started");
    Ok(sse_ok_response(Body::from_stream(events)))
}

fn abort_codex(request_id: &str, err: &ProxyError) -> Response {
    let status = err.status();
    if !matches!(err, ProxyError::UpstreamApplication { .. }) {
        tracing::error!(
            request_id,
            status = status.as_u16(),
            error = %err,
            "code completion request failed"
        );
    }
    sse_abort_response(status)
}
