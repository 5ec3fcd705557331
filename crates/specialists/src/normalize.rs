//! Response normalization.
//!
//! Backends return text in several layouts. Everything funnels through
//! [`normalize`] into a content string plus [`MessageMetadata`].

use compass_core::{CompletionPayload, CompletionResponse, MessageMetadata};
use serde_json::Value;

/// Normalized response content, before attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub content: String,
    pub metadata: MessageMetadata,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Flatten a response into text and structured metadata.
///
/// Metadata comes from the response's own `metadata` field and, for JSON
/// payloads, from a `metadata` object inside the document. The response
/// field wins on conflicts.
pub fn normalize(response: &CompletionResponse) -> Normalized {
    let content = extract_text(&response.payload).unwrap_or_default();

    let mut metadata = MessageMetadata::default();
    if let CompletionPayload::Json(doc) = &response.payload
        && let Some(embedded) = doc.get("metadata")
    {
        merge_metadata(embedded, &mut metadata);
    }
    if let Some(meta) = &response.metadata {
        merge_metadata(meta, &mut metadata);
    }

    Normalized {
        content: content.trim().to_string(),
        metadata,
    }
}

/// Pull the text out of a payload, if there is any.
pub fn extract_text(payload: &CompletionPayload) -> Option<String> {
    match payload {
        CompletionPayload::Text(text) => Some(text.clone()),
        CompletionPayload::Parts(parts) => Some(parts.concat()),
        CompletionPayload::Json(value) => text_from_json(value),
    }
}

fn text_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let joined: String = items.iter().filter_map(text_from_json).collect();
            (!joined.is_empty()).then_some(joined)
        }
        Value::Object(map) => {
            // {"content": ...} / {"text": ...} / {"response": ...}
            for key in ["content", "text", "response", "output"] {
                if let Some(text) = map.get(key).and_then(text_from_json) {
                    return Some(text);
                }
            }
            // {"message": {"content": ...}}
            if let Some(text) = map.get("message").and_then(text_from_json) {
                return Some(text);
            }
            // {"choices": [{"message": {"content": ...}}]}
            map.get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first())
                .and_then(text_from_json)
        }
        _ => None,
    }
}

fn merge_metadata(value: &Value, meta: &mut MessageMetadata) {
    let Some(map) = value.as_object() else {
        return;
    };
    for (key, v) in map {
        match key.as_str() {
            "tools_used" => meta.tools_used = strings(v),
            "sources" => meta.sources = strings(v),
            "confidence" => meta.confidence = v.as_f64().map(|c| c as f32),
            "ready_for_specialist" => meta.ready_for_specialist = v.as_bool(),
            "handoff_requested" => meta.handoff_requested = v.as_bool(),
            _ => {
                meta.extra.insert(key.clone(), v.clone());
            }
        }
    }
}

fn strings(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
