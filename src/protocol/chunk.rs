use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const FINISH_REASON_STOP: &str = "stop";

/// One streamed chat completion chunk.
///
/// Fields the proxy does not inspect (`usage`, `system_fingerprint`, ...) are
/// kept in `extra` so re-encoding does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A choice within a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial message carried by a choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamChunk {
    /// Terminal chunk: one choice with an empty delta and `finish_reason: "stop"`.
    #[must_use]
    pub fn finish(id: &str, created: i64, model: &str) -> Self {
        Self {
            id: id.to_owned(),
            object: CHUNK_OBJECT.to_owned(),
            created,
            model: model.to_owned(),
            choices: vec![ChunkChoice {
                finish_reason: Some(FINISH_REASON_STOP.to_owned()),
                ..ChunkChoice::default()
            }],
            extra: Map::new(),
        }
    }

    /// Blank the first choice's delta content when it equals `token`.
    ///
    /// Returns `true` when the content was replaced.
    pub fn blank_first_content_if(&mut self, token: &str) -> bool {
        let Some(content) = self
            .choices
            .first_mut()
            .and_then(|choice| choice.delta.content.as_mut())
        else {
            return false;
        };
        if content.as_str() == Some(token) {
            *content = Value::String(String::new());
            true
        } else {
            false
        }
    }
}
