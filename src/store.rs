//! the single source of truth a ui observes.

use bevy::log::{debug, warn};

use crate::session::SessionId;
use crate::types::{ConversationId, ConversationSummary, Message};

/// streaming status. the buffer only exists while a session is streaming,
/// so "text buffered while idle" cannot be expressed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming { session: SessionId, buffer: String },
}

#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    conversation_id: Option<ConversationId>,
    messages: Vec<Message>,
    stream: StreamState,
    conversations: Vec<ConversationSummary>,
}

impl ConversationStore {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn stream(&self) -> &StreamState {
        &self.stream
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.stream, StreamState::Streaming { .. })
    }

    /// text accumulated so far for the message being produced.
    pub fn streaming_text(&self) -> &str {
        match &self.stream {
            StreamState::Streaming { buffer, .. } => buffer,
            StreamState::Idle => "",
        }
    }

    /// sidebar listing from the last successful refresh.
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn begin_stream(&mut self, session: SessionId) {
        self.stream = StreamState::Streaming {
            session,
            buffer: String::new(),
        };
    }

    /// append a delta for `session`; deltas of any other session are dropped.
    pub(crate) fn append_delta(&mut self, session: SessionId, text: &str) -> bool {
        match &mut self.stream {
            StreamState::Streaming { session: current, buffer } if *current == session => {
                buffer.push_str(text);
                true
            }
            _ => {
                debug!(target: "bevy_chat_stream", "delta for {} dropped: not streaming it", session);
                false
            }
        }
    }

    /// end streaming for `session`, handing back the buffered text.
    pub(crate) fn take_stream(&mut self, session: SessionId) -> Option<String> {
        match std::mem::take(&mut self.stream) {
            StreamState::Streaming { session: current, buffer } if current == session => Some(buffer),
            other => {
                self.stream = other;
                None
            }
        }
    }

    /// drop whatever is buffered and stop streaming.
    pub(crate) fn discard_stream(&mut self) {
        self.stream = StreamState::Idle;
    }

    /// adopt an id reported in-band. only an unsaved conversation takes one.
    pub(crate) fn adopt_conversation_id(&mut self, id: ConversationId) -> bool {
        match &self.conversation_id {
            None => {
                self.conversation_id = Some(id);
                true
            }
            Some(current) if *current == id => false,
            Some(current) => {
                warn!(target: "bevy_chat_stream",
                    "ignoring conversation id {} reported for conversation {}", id, current
                );
                false
            }
        }
    }

    /// start over with an unsaved, empty conversation.
    pub(crate) fn reset_conversation(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.stream = StreamState::Idle;
    }

    /// show a conversation loaded from the remote store.
    pub(crate) fn replace_conversation(&mut self, id: ConversationId, messages: Vec<Message>) {
        self.conversation_id = Some(id);
        self.messages = messages;
        self.stream = StreamState::Idle;
    }

    pub(crate) fn set_conversations(&mut self, conversations: Vec<ConversationSummary>) {
        self.conversations = conversations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn buffer_lives_only_while_streaming() {
        let mut store = ConversationStore::default();
        assert!(!store.is_streaming());
        assert!(!store.append_delta(SessionId(1), "lost"));
        assert_eq!(store.streaming_text(), "");

        store.begin_stream(SessionId(1));
        assert!(store.append_delta(SessionId(1), "He"));
        assert!(store.append_delta(SessionId(1), "llo"));
        assert!(!store.append_delta(SessionId(2), "other"));
        assert_eq!(store.streaming_text(), "Hello");

        assert_eq!(store.take_stream(SessionId(2)), None);
        assert!(store.is_streaming());
        assert_eq!(store.take_stream(SessionId(1)), Some("Hello".to_string()));
        assert!(!store.is_streaming());
        assert_eq!(store.take_stream(SessionId(1)), None);
    }

    #[test]
    fn conversation_id_is_adopted_once() {
        let mut store = ConversationStore::default();
        assert!(store.adopt_conversation_id("abc".into()));
        assert!(!store.adopt_conversation_id("abc".into()));
        assert!(!store.adopt_conversation_id("xyz".into()));
        assert_eq!(store.conversation_id(), Some(&ConversationId::from("abc")));
    }

    #[test]
    fn navigation_resets_everything() {
        let mut store = ConversationStore::default();
        store.push_message(Message::user("hi"));
        store.begin_stream(SessionId(4));
        store.append_delta(SessionId(4), "partial");

        store.replace_conversation("c2".into(), vec![Message::assistant("old")]);
        assert!(!store.is_streaming());
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].role, Role::Assistant);

        store.reset_conversation();
        assert_eq!(store.conversation_id(), None);
        assert!(store.messages().is_empty());
    }
}
