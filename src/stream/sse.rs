use axum::body::Body;
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use memchr::memchr2;

/// Literal terminator payload.
pub const DONE_PAYLOAD: &str = "[DONE]";
/// Terminator as a complete client SSE event.
pub const DONE_EVENT: &[u8] = b"data: [DONE]\n\n";
/// Body written when a code completion is aborted before streaming starts.
pub const ABORT_BODY: &[u8] = b"data: [DONE]\n";

const EVENT_STREAM: &str = "text/event-stream";
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Encode one payload as a client SSE event: `data: <payload>\n\n`.
///
/// Embedded `\n` continue the event on a new `data:` line and `\r` is written
/// as the two characters `\r`, so a payload can never terminate the event early.
#[must_use]
pub fn encode_sse_event(payload: &str) -> Bytes {
    let bytes = payload.as_bytes();
    let mut out = BytesMut::with_capacity(8 + bytes.len());
    out.put_slice(b"data: ");

    let mut rest = bytes;
    while let Some(pos) = memchr2(b'\n', b'\r', rest) {
        out.put_slice(&rest[..pos]);
        if rest[pos] == b'\n' {
            out.put_slice(b"\ndata:");
        } else {
            out.put_slice(b"\\r");
        }
        rest = &rest[pos + 1..];
    }
    out.put_slice(rest);
    out.put_slice(b"\n\n");
    out.freeze()
}

#[must_use]
pub fn done_event() -> Bytes {
    Bytes::from_static(DONE_EVENT)
}

/// Headers sent on every successful code completion stream.
pub fn insert_event_stream_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        http::header::TRANSFER_ENCODING,
        HeaderValue::from_static("chunked"),
    );
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
}

#[must_use]
pub fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    insert_event_stream_headers(response.headers_mut());
    response
}

/// Event-stream shaped error: `status`, `text/event-stream`, body `data: [DONE]\n`.
#[must_use]
pub fn sse_abort_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::from(Bytes::from_static(ABORT_BODY)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain_payload() {
        assert_eq!(
            encode_sse_event(r#"{"id":"x"}"#).as_ref(),
            b"data: {\"id\":\"x\"}\n\n"
        );
    }

    #[test]
    fn test_encode_escapes_line_breaks() {
        assert_eq!(encode_sse_event("a\nb").as_ref(), b"data: a\ndata:b\n\n");
        assert_eq!(encode_sse_event("a\rb").as_ref(), b"data: a\\rb\n\n");
        assert_eq!(
            encode_sse_event("x\r\ny").as_ref(),
            b"data: x\\r\ndata:y\n\n"
        );
    }

    #[test]
    fn test_done_event_matches_encoder() {
        assert_eq!(encode_sse_event(DONE_PAYLOAD), done_event());
    }

    #[test]
    fn test_stream_headers() {
        let response = sse_ok_response(Body::empty());
        let headers = response.headers();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/event-stream");
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(CONNECTION).unwrap(), "keep-alive");
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    }

    #[tokio::test]
    async fn test_abort_response() {
        let response = sse_abort_response(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"data: [DONE]\n");
    }
}
