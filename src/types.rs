use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// backend-assigned conversation identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// one committed chat message. never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// synthetic message describing a failed turn; client-side only.
    #[serde(default, skip)]
    pub error: bool,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            created_at: Utc::now(),
            token_count: None,
            error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// assistant message standing in for a turn that failed.
    pub fn failure(description: impl fmt::Display) -> Self {
        Self {
            error: true,
            ..Self::new(Role::Assistant, format!("Error: {description}"))
        }
    }
}

/// sidebar row as listed by the conversation store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub model: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_summary: Option<bool>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// a conversation with its messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// body of the streaming completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_body_wire_shape() {
        let body = ChatRequestBody {
            message: "hello".into(),
            conversation_id: None,
            model: "m".into(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"message": "hello", "conversationId": null, "model": "m"})
        );
    }

    #[test]
    fn detail_from_backend_json() {
        let json = r#"{
            "id": "c1", "title": "Greeting", "model": "m",
            "createdAt": "2026-01-02T03:04:05.123+09:00",
            "updatedAt": "2026-01-02T03:04:06Z",
            "totalTokens": 12,
            "messages": [{
                "id": "0b9c1f3e-8a8e-4c55-9a53-3b8a5a0d2f11",
                "role": "assistant", "content": "hi", "tokenCount": 3,
                "createdAt": "2026-01-02T03:04:06Z"
            }]
        }"#;
        let detail: ConversationDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.summary.id, ConversationId::from("c1"));
        assert_eq!(detail.summary.total_tokens, Some(12));
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].role, Role::Assistant);
        assert_eq!(detail.messages[0].token_count, Some(3));
        assert!(!detail.messages[0].error);
    }

    #[test]
    fn failure_message_is_flagged() {
        let m = Message::failure("HTTP 500");
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.content, "Error: HTTP 500");
        assert!(m.error);
    }
}
