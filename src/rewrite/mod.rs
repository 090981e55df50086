//! Request body rewriting for the two client protocols.
//!
//! Both entry points are pure: they take the inbound JSON body and the proxy
//! config and produce the body forwarded upstream.

pub mod chat;
pub mod fim;

use serde_json::{Map, Value};

use crate::config::ProxyConfig;
use crate::error::ProxyError;

pub use chat::rewrite_chat;
pub use fim::{rewrite_code, FimStrategy};

/// Parse an inbound request body as a JSON object.
///
/// # Errors
///
/// Returns [`ProxyError::ClientInput`] when the body is not a JSON object.
pub fn parse_request_object(raw: &[u8]) -> Result<Map<String, Value>, ProxyError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProxyError::ClientInput(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(ProxyError::ClientInput(format!(
            "request body is not valid JSON: {e}"
        ))),
    }
}

fn serialize_body(body: &Map<String, Value>) -> Result<bytes::Bytes, ProxyError> {
    serde_json::to_vec(body)
        .map(bytes::Bytes::from)
        .map_err(|e| ProxyError::Internal(format!("failed to serialize upstream body: {e}")))
}

/// Parse, rewrite and re-serialize a chat completion request.
///
/// # Errors
///
/// Returns [`ProxyError::ClientInput`] for malformed bodies.
pub fn rewrite_chat_body(raw: &[u8], config: &ProxyConfig) -> Result<bytes::Bytes, ProxyError> {
    let mut body = parse_request_object(raw)?;
    rewrite_chat(&mut body, config);
    serialize_body(&body)
}

/// Parse, rewrite and re-serialize a code completion request.
///
/// `serde_json` never escapes `<` or `>`, so fill-in-middle tokens reach the
/// upstream as literal angle brackets without any post-processing.
///
/// # Errors
///
/// Returns [`ProxyError::ClientInput`] for malformed bodies.
pub fn rewrite_code_body(raw: &[u8], config: &ProxyConfig) -> Result<bytes::Bytes, ProxyError> {
    let mut body = parse_request_object(raw)?;
    rewrite_code(&mut body, config);
    serialize_body(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            parse_request_object(b"[1,2]"),
            Err(ProxyError::ClientInput(_))
        ));
        assert!(matches!(
            parse_request_object(b"{not json"),
            Err(ProxyError::ClientInput(_))
        ));
    }

    #[test]
    fn test_code_body_keeps_literal_angle_brackets() {
        let config = ProxyConfig {
            code_instruct_model: "stable-code-3b".to_string(),
            ..ProxyConfig::default()
        };
        let out = rewrite_code_body(br#"{"prompt":"abc","suffix":"def"}"#, &config).unwrap();
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.contains("<fim_prefix>abc<fim_suffix>def<fim_middle>"));
        assert!(!text.contains("\\u003c"));
        assert!(!text.contains("\\u003e"));
    }

    #[test]
    fn test_client_escaped_brackets_are_restored() {
        let config = ProxyConfig {
            code_instruct_model: "stable-code-3b".to_string(),
            ..ProxyConfig::default()
        };
        let out = rewrite_code_body(
            br#"{"prompt":"if a \u003c b","suffix":"\u003e"}"#,
            &config,
        )
        .unwrap();
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.contains("<fim_prefix>if a < b<fim_suffix>><fim_middle>"));
    }
}
