use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::{chat, code, REQUEST_BODY_LIMIT_BYTES};
use crate::auth::PathAuthOutcome;
use crate::state::AppState;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const CODE_COMPLETIONS_PATH: &str = "/v1/engines/copilot-codex/completions";

enum RouteMatch {
    ChatCompletions,
    CodeCompletions,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();

    let (path, authorized) = match state.auth().check(parts.uri.path()) {
        PathAuthOutcome::Route(path) => (path, true),
        PathAuthOutcome::Unauthorized(path) => (path, false),
        PathAuthOutcome::NotFound => return Ok(StatusCode::NOT_FOUND.into_response()),
    };
    let route = match_route(&parts.method, path);
    if !authorized && matches!(route, RouteMatch::ChatCompletions | RouteMatch::CodeCompletions) {
        return Ok(unauthorized_response());
    }

    let response = match route {
        RouteMatch::ChatCompletions => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            chat::handler(state, parts.headers, body_bytes).await
        }
        RouteMatch::CodeCompletions => code::handler(state, parts.headers, body).await,
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, REQUEST_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

fn match_route(method: &Method, path: &str) -> RouteMatch {
    let route = match path {
        CHAT_COMPLETIONS_PATH => RouteMatch::ChatCompletions,
        CODE_COMPLETIONS_PATH => RouteMatch::CodeCompletions,
        _ => return RouteMatch::NotFound,
    };
    if method == Method::POST {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}
