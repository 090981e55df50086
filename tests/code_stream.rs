use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use codex_bridge::config::ProxyConfig;
use codex_bridge::routing::dispatch::dispatch_request;
use codex_bridge::state::AppState;
use serde_json::{json, Value};

const CODE_PATH: &str = "/v1/engines/copilot-codex/completions";

fn build_state(base_url: String, code_model: &str) -> Arc<AppState> {
    let config = ProxyConfig {
        chat_api_base: base_url.clone(),
        codex_api_base: base_url,
        codex_api_key: "code-secret".to_string(),
        code_instruct_model: code_model.to_string(),
        chat_model_default: "gpt-4o-mini".to_string(),
        timeout: 2,
        ..ProxyConfig::default()
    };
    Arc::new(AppState::new(config).expect("build state"))
}

async fn spawn_upstream(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v1"), server)
}

fn sse_upstream(chunks: Vec<&'static str>, seen: Arc<Mutex<Option<Bytes>>>) -> Router {
    Router::new().route(
        "/v1/completions",
        post(move |body: Bytes| {
            let chunks = chunks.clone();
            let seen = Arc::clone(&seen);
            async move {
                *seen.lock().unwrap() = Some(body);
                let stream = futures_util::stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))),
                );
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }
        }),
    )
}

fn code_request(body: &Value, request_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(CODE_PATH)
        .header("content-type", "application/json");
    if let Some(request_id) = request_id {
        builder = builder.header("x-oneapi-request-id", request_id);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request")
}

fn copilot_body() -> Value {
    json!({
        "model": "copilot-codex",
        "prompt": "fn add(a: i32, b: i32) -> i32 {\n",
        "suffix": "}\n",
        "max_tokens": 500,
        "stream": true,
        "extra": {"language": "rust"},
        "nwo": "octo/repo"
    })
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn events(text: &str) -> Vec<&str> {
    text.split_terminator("\n\n").collect()
}

fn event_json(event: &str) -> Value {
    serde_json::from_str(event.strip_prefix("data: ").expect("data prefix")).expect("json event")
}

#[tokio::test]
async fn test_stream_translated_with_single_finish_and_done() {
    let seen = Arc::new(Mutex::new(None));
    let upstream = sse_upstream(
        vec![
            "data: {\"id\":\"x\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n",
            "data: [DONE]\n",
        ],
        Arc::clone(&seen),
    );
    let (base_url, server) = spawn_upstream(upstream).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), Some("req-1")))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
    assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
    assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");

    let text = body_text(response).await;
    let events = events(&text);
    assert_eq!(events.len(), 3, "unexpected events: {text:?}");

    let first = event_json(events[0]);
    assert_eq!(first["id"], "x");
    assert_eq!(first["choices"][0]["delta"]["content"], "hi");

    let finish = event_json(events[1]);
    assert_eq!(finish["id"], "chatcmpl-req-1");
    assert_eq!(finish["object"], "chat.completion.chunk");
    assert_eq!(finish["model"], "stable-code-3b");
    assert_eq!(finish["choices"][0]["finish_reason"], "stop");
    assert_eq!(finish["choices"][0]["delta"], json!({}));
    assert!(finish["created"].as_i64().is_some_and(|t| t > 0));

    assert_eq!(events[2], "data: [DONE]");
    assert_eq!(text.matches("[DONE]").count(), 1);

    server.abort();
}

#[tokio::test]
async fn test_upstream_body_carries_literal_fim_tokens() {
    let seen = Arc::new(Mutex::new(None));
    let upstream = sse_upstream(vec!["data: [DONE]\n"], Arc::clone(&seen));
    let (base_url, server) = spawn_upstream(upstream).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert_eq!(events(&text).len(), 2);

    let raw = seen.lock().unwrap().clone().expect("upstream saw a body");
    let raw_text = std::str::from_utf8(&raw).expect("utf8 upstream body");
    assert!(raw_text.contains("<fim_prefix>"));
    assert!(!raw_text.contains("\\u003c"));

    let sent: Value = serde_json::from_slice(&raw).expect("json upstream body");
    assert_eq!(sent["model"], "stable-code-3b");
    assert!(sent.get("extra").is_none());
    assert!(sent.get("nwo").is_none());
    assert_eq!(sent["max_tokens"], 500);
    assert_eq!(
        sent["messages"],
        json!([{
            "role": "user",
            "content": "<fim_prefix>fn add(a: i32, b: i32) -> i32 {\n<fim_suffix>}\n<fim_middle>"
        }])
    );

    server.abort();
}

#[tokio::test]
async fn test_end_of_sentence_blanked_for_at_models() {
    let seen = Arc::new(Mutex::new(None));
    let upstream = sse_upstream(
        vec![
            "data: {\"id\":\"a\",\"created\":7,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"let\"}}]}\r\n",
            "data: {\"id\":\"a\",\"created\":7,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"<｜end▁of▁sentence｜>\"}}]}\r\n",
        ],
        Arc::clone(&seen),
    );
    let (base_url, server) = spawn_upstream(upstream).await;
    let state = build_state(base_url, "@hf/thebloke/deepseek-coder-6.7b-base-awq");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    let text = body_text(response).await;
    let events = events(&text);
    assert_eq!(events.len(), 4, "unexpected events: {text:?}");

    assert_eq!(event_json(events[0])["choices"][0]["delta"]["content"], "let");
    let blanked = event_json(events[1]);
    assert_eq!(blanked["choices"][0]["delta"]["content"], "");
    assert_eq!(blanked["id"], "a");
    assert_eq!(blanked["created"], 7);
    assert_eq!(blanked["model"], "m");
    assert_eq!(event_json(events[2])["choices"][0]["finish_reason"], "stop");
    assert_eq!(events[3], "data: [DONE]");

    let raw = seen.lock().unwrap().clone().expect("upstream saw a body");
    let sent: Value = serde_json::from_slice(&raw).expect("json upstream body");
    assert!(sent["messages"][0]["content"]
        .as_str()
        .is_some_and(|content| content.starts_with("<｜fim▁begin｜>")));

    server.abort();
}

#[tokio::test]
async fn test_end_of_sentence_blanked_for_at_prefixed_stable_code() {
    let seen = Arc::new(Mutex::new(None));
    let upstream = sse_upstream(
        vec![
            "data: {\"id\":\"b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"fn\"}}]}\n",
            "data: {\"id\":\"b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"<｜end▁of▁sentence｜>\"}}]}\n",
        ],
        Arc::clone(&seen),
    );
    let (base_url, server) = spawn_upstream(upstream).await;
    let state = build_state(base_url, "@cf/stabilityai/stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    let text = body_text(response).await;
    let events = events(&text);
    assert_eq!(events.len(), 4, "unexpected events: {text:?}");
    assert_eq!(event_json(events[0])["choices"][0]["delta"]["content"], "fn");
    assert_eq!(event_json(events[1])["choices"][0]["delta"]["content"], "");
    assert_eq!(event_json(events[2])["choices"][0]["finish_reason"], "stop");
    assert_eq!(events[3], "data: [DONE]");

    let raw = seen.lock().unwrap().clone().expect("upstream saw a body");
    let sent: Value = serde_json::from_slice(&raw).expect("json upstream body");
    assert!(sent["messages"][0]["content"]
        .as_str()
        .is_some_and(|content| content.starts_with("<fim_prefix>")));

    server.abort();
}

#[tokio::test]
async fn test_frames_split_across_reads_and_malformed_skipped() {
    let seen = Arc::new(Mutex::new(None));
    let upstream = sse_upstream(
        vec![
            ": keep-alive\n\ndata: {\"id\":\"s\",\"choi",
            "ces\":[{\"index\":0,\"delta\":{\"content\":\"one\"}}]}\n",
            "data: {broken\n",
            "data: {\"id\":\"s\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"two\"}}]}",
        ],
        Arc::clone(&seen),
    );
    let (base_url, server) = spawn_upstream(upstream).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    let text = body_text(response).await;
    let events = events(&text);
    assert_eq!(events.len(), 4, "unexpected events: {text:?}");
    assert_eq!(event_json(events[0])["choices"][0]["delta"]["content"], "one");
    assert_eq!(event_json(events[1])["choices"][0]["delta"]["content"], "two");
    assert_eq!(event_json(events[2])["choices"][0]["finish_reason"], "stop");
    assert_eq!(events[3], "data: [DONE]");

    server.abort();
}

#[tokio::test]
async fn test_upstream_error_aborts_with_event_stream_body() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({"error": "boom"})),
            )
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(body_text(response).await, "data: [DONE]\n");

    server.abort();
}

#[tokio::test]
async fn test_upstream_status_is_kept_on_abort() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "data: [DONE]\n");

    server.abort();
}

#[tokio::test]
async fn test_unreachable_upstream_aborts_with_server_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let state = build_state(format!("http://{addr}/v1"), "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert_eq!(body_text(response).await, "data: [DONE]\n");
}

#[tokio::test]
async fn test_upstream_timeout_aborts_with_request_timeout() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "late"
        }),
    );
    let (base_url, server) = spawn_upstream(app).await;
    let state = build_state(base_url, "stable-code-3b");

    let response = dispatch_request(state, code_request(&copilot_body(), None))
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body_text(response).await, "data: [DONE]\n");

    server.abort();
}

#[tokio::test]
async fn test_malformed_code_body_aborts_with_bad_request() {
    let state = build_state("http://127.0.0.1:9/v1".to_string(), "stable-code-3b");
    let request = Request::builder()
        .method("POST")
        .uri(CODE_PATH)
        .body(Body::from("not json"))
        .expect("build request");

    let response = dispatch_request(state, request).await.expect("dispatch");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "data: [DONE]\n");
}
