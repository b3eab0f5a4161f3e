//! typed view of the payloads carried by `data:` frames.

use serde_json::Value;

use crate::extract::extract_error;
use crate::types::ConversationId;

/// what one decoded payload means for the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// text to append to the streaming buffer.
    Delta(String),
    /// backend assigned an id to the (previously unsaved) conversation.
    Metadata { conversation_id: ConversationId },
    /// application error inside a successful response; fatal for the session.
    Error(String),
}

/// classify a payload. `None` means "nothing to apply" (role-only deltas,
/// empty keep-alive payloads, json without content).
///
/// a payload that is not json is not an error: it is shown as-is.
pub fn classify_payload(payload: &str) -> Option<StreamEvent> {
    if let Some(message) = extract_error(payload) {
        let message = if message.is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        return Some(StreamEvent::Error(message));
    }

    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(_) if payload.is_empty() => return None,
        Err(_) => return Some(StreamEvent::Delta(payload.to_string())),
    };

    if let Some(id) = value
        .pointer("/metadata/conversationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
    {
        return Some(StreamEvent::Metadata {
            conversation_id: ConversationId::from(id),
        });
    }

    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| StreamEvent::Delta(text.to_string()))
}
