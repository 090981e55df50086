use serde_json::{Map, Value};

use crate::config::ProxyConfig;

/// Substring identifying Stability AI `stable-code` models.
pub const STABLE_CODE_MARKER: &str = "stable-code";
/// End-of-text token leaked into content by `@`-prefixed (Workers AI style) backends.
pub const END_OF_SENTENCE_TOKEN: &str = "<｜end▁of▁sentence｜>";

const CODE_ONLY_FIELDS: [&str; 2] = ["extra", "nwo"];

/// Prompt construction strategy, selected from the code model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FimStrategy {
    /// `<fim_prefix>…<fim_suffix>…<fim_middle>`
    StableCode,
    /// `<｜fim▁begin｜>…<｜fim▁hole｜>…<｜fim▁end｜>`, used by `@`-prefixed
    /// (Workers AI style) DeepSeek-Coder identifiers.
    DeepSeekCoder,
    /// No prompt construction; the body is forwarded as-is.
    Passthrough,
}

impl FimStrategy {
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        if model.contains(STABLE_CODE_MARKER) {
            FimStrategy::StableCode
        } else if model.starts_with('@') {
            FimStrategy::DeepSeekCoder
        } else {
            FimStrategy::Passthrough
        }
    }

    /// Wrap prefix and suffix in this strategy's fill-in-middle tokens.
    #[must_use]
    pub fn wrap(self, prompt: &str, suffix: &str) -> Option<String> {
        let (begin, hole, end) = match self {
            FimStrategy::StableCode => ("<fim_prefix>", "<fim_suffix>", "<fim_middle>"),
            FimStrategy::DeepSeekCoder => ("<｜fim▁begin｜>", "<｜fim▁hole｜>", "<｜fim▁end｜>"),
            FimStrategy::Passthrough => return None,
        };
        let mut out =
            String::with_capacity(begin.len() + prompt.len() + hole.len() + suffix.len() + end.len());
        out.push_str(begin);
        out.push_str(prompt);
        out.push_str(hole);
        out.push_str(suffix);
        out.push_str(end);
        Some(out)
    }
}

/// Whether streamed content from `model` must have [`END_OF_SENTENCE_TOKEN`]
/// blanked. Keyed on the `@` prefix alone, whatever prompt format is used.
#[must_use]
pub fn blanks_end_of_sentence(model: &str) -> bool {
    model.starts_with('@')
}

fn field_text(body: &Map<String, Value>, key: &str) -> String {
    match body.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Rewrite a Copilot code completion request in place for the code backend.
///
/// Strips editor metadata, pins `model` to `code_instruct_model` and, when the
/// model has a known prompt format, replaces `messages` with a single user
/// message carrying the wrapped fill-in-middle prompt. Models without a known
/// format pass through with only those field edits.
pub fn rewrite_code(body: &mut Map<String, Value>, config: &ProxyConfig) {
    for field in CODE_ONLY_FIELDS {
        body.shift_remove(field);
    }
    body.insert(
        "model".to_string(),
        Value::String(config.code_instruct_model.clone()),
    );

    let strategy = FimStrategy::for_model(&config.code_instruct_model);
    let prompt = field_text(body, "prompt");
    let suffix = field_text(body, "suffix");
    if let Some(content) = strategy.wrap(&prompt, &suffix) {
        body.insert(
            "messages".to_string(),
            serde_json::json!([{ "role": "user", "content": content }]),
        );
    }
}
