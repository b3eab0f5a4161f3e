//! finds application errors embedded in payloads and error bodies.

use serde_json::Value;

use crate::frame::{Frame, FrameDecoder};

/// `Some(message)` when `payload` is json carrying a string `error.message`.
///
/// an unparseable payload, or one without that field, is "no error" and is
/// never conflated with an error whose message happens to be empty.
pub fn extract_error(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    nested_error_message(&value)
}

fn nested_error_message(value: &Value) -> Option<String> {
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_owned)
}

/// describe a non-success completion response.
///
/// order: an error inside any `data:` line of the body, then the body as a
/// single json object (`error.message`, then `detail`), then `HTTP <status>`.
pub fn resolve_http_error(status: u16, body: &str) -> String {
    let framed = FrameDecoder::decode_all(body.as_bytes())
        .into_iter()
        .find_map(|frame| match frame {
            Frame::Data(payload) => extract_error(&payload).filter(|m| !m.is_empty()),
            Frame::Done => None,
        });
    if let Some(message) = framed {
        return message;
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = nested_error_message(&value)
            .or_else(|| value.get("detail").and_then(Value::as_str).map(str::to_owned))
            .filter(|m| !m.is_empty());
        if let Some(message) = message {
            return message;
        }
    }

    format!("HTTP {status}")
}

/// describe a non-success collaborator response (`error`, `detail` or
/// `message` at the top level; short plain-text bodies are appended).
pub fn api_error_message(status: u16, body: &str) -> String {
    let fallback = format!("HTTP {status}");
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ["error", "detail", "message"]
            .iter()
            .find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned)
            })
            .or_else(|| nested_error_message(&value))
            .unwrap_or(fallback),
        Err(_) if !body.is_empty() && body.len() < 200 => format!("{fallback}: {body}"),
        Err(_) => fallback,
    }
}
