use serde_json::{Map, Value};

use crate::config::ProxyConfig;

/// Marker that identifies a message already carrying the locale instruction.
pub const LOCALE_MARKER: &str = "Respond in the following locale";

const STRIPPED_FIELDS: [&str; 3] = ["intent", "intent_threshold", "intent_content"];

/// Rewrite a chat completion request in place for the chat backend.
///
/// - `model` is always replaced: mapped names use the mapping, everything else
///   falls back to `chat_model_default`.
/// - Without `function_call`, the last message gets a locale instruction
///   unless it already carries one.
/// - Copilot `intent*` fields are dropped.
/// - `max_tokens` above `chat_max_tokens` is clamped.
pub fn rewrite_chat(body: &mut Map<String, Value>, config: &ProxyConfig) {
    let model = config
        .resolve_chat_model(body.get("model").and_then(Value::as_str))
        .to_owned();
    body.insert("model".to_string(), Value::String(model));

    if !body.contains_key("function_call") {
        let last_message = body
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .and_then(|messages| messages.last_mut());
        if let Some(message) = last_message {
            append_locale_instruction(message, config.chat_locale_or_default());
        }
    }

    for field in STRIPPED_FIELDS {
        body.shift_remove(field);
    }

    clamp_max_tokens(body, config.chat_max_tokens);
}

fn locale_instruction(locale: &str) -> String {
    format!("{LOCALE_MARKER}: {locale}.")
}

/// Append the locale instruction to a message's content.
///
/// Idempotent: content that already contains [`LOCALE_MARKER`] is left alone.
pub fn append_locale_instruction(message: &mut Value, locale: &str) {
    let Some(message) = message.as_object_mut() else {
        return;
    };

    match message.get_mut("content") {
        Some(Value::String(content)) => {
            if !content.contains(LOCALE_MARKER) {
                content.push(' ');
                content.push_str(&locale_instruction(locale));
            }
        }
        Some(Value::Array(parts)) => {
            let already_tagged = parts.iter().any(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .is_some_and(|text| text.contains(LOCALE_MARKER))
            });
            if !already_tagged {
                parts.push(serde_json::json!({
                    "type": "text",
                    "text": locale_instruction(locale),
                }));
            }
        }
        Some(Value::Null) | None => {
            message.insert(
                "content".to_string(),
                Value::String(locale_instruction(locale)),
            );
        }
        Some(_) => {}
    }
}

fn max_tokens_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Clamp `max_tokens` down to `cap`. An absent field stays absent.
pub fn clamp_max_tokens(body: &mut Map<String, Value>, cap: u64) {
    let Some(requested) = body.get("max_tokens").and_then(max_tokens_value) else {
        return;
    };
    if requested > cap as f64 {
        body.insert("max_tokens".to_string(), Value::from(cap));
    }
}
