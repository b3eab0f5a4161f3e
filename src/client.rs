//! session orchestrator: binds stream sessions to the conversation store.
//!
//! every method runs on the thread that owns the client; background work
//! (the stream worker and collaborator calls) only ever talks back through
//! the inbox, which `pump` drains in arrival order.

use std::sync::Arc;
use std::time::Instant;

use bevy::log::{debug, info, trace, warn};
use bevy::prelude::Resource;
use flume::{Receiver, Sender, TryRecvError};
use tokio::runtime::Handle;

use crate::api::{ConversationApi, UreqApi};
use crate::config::ChatClientConfig;
use crate::error::{ApiError, ChatError};
use crate::session::{InboxMsg, SessionEvent, SessionId, SessionState, StreamSession};
use crate::store::ConversationStore;
use crate::transport::{ChatTransport, UreqTransport};
use crate::types::{ChatRequestBody, ConversationDetail, ConversationId, ConversationSummary, Message};

/// results of background collaborator calls.
pub(crate) enum ApiReply {
    Listed(Result<Vec<ConversationSummary>, ApiError>),
    Loaded {
        ticket: u64,
        id: ConversationId,
        result: Result<ConversationDetail, ApiError>,
    },
    Deleted {
        id: ConversationId,
        result: Result<(), ApiError>,
    },
    Renamed(Result<ConversationSummary, ApiError>),
}

/// what changed, for whoever renders the store.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatNotice {
    Started { session: SessionId },
    Delta { session: SessionId, text: String },
    /// `message` is `None` when the stream completed without any text.
    Completed { session: SessionId, message: Option<Message> },
    Cancelled { session: SessionId },
    Failed { session: SessionId, error: ChatError, message: Message },
    ConversationAssigned(ConversationId),
    ConversationLoaded(ConversationId),
    ConversationCleared,
    ConversationsRefreshed,
}

/// chat client: conversation store plus at most one active stream session.
#[derive(Resource)]
pub struct ChatClient {
    config: ChatClientConfig,
    transport: Arc<dyn ChatTransport>,
    api: Option<Arc<dyn ConversationApi>>,
    runtime: Handle,
    store: ConversationStore,
    session: Option<StreamSession>,
    next_session: u64,
    load_ticket: u64,
    model: String,
    inbox_tx: Sender<InboxMsg>,
    inbox_rx: Receiver<InboxMsg>,
    notices: Vec<ChatNotice>,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig, transport: Arc<dyn ChatTransport>, runtime: Handle) -> Self {
        let (inbox_tx, inbox_rx) = flume::bounded(config.inbox_capacity.max(1));
        Self {
            model: config.model.clone(),
            config,
            transport,
            api: None,
            runtime,
            store: ConversationStore::default(),
            session: None,
            next_session: 0,
            load_ticket: 0,
            inbox_tx,
            inbox_rx,
            notices: Vec::new(),
        }
    }

    /// ureq transport and collaborator api against `config.base_url`.
    pub fn from_config(config: ChatClientConfig, runtime: Handle) -> Self {
        let transport = Arc::new(UreqTransport::new(&config));
        let api = Arc::new(UreqApi::new(&config));
        Self::new(config, transport, runtime).with_api(api)
    }

    pub fn with_api(mut self, api: Arc<dyn ConversationApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// the current (or most recent) session.
    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.store.is_streaming()
    }

    /// send a user message: cancel any active session, append the message
    /// optimistically and start streaming the reply.
    pub fn submit(&mut self, text: impl Into<String>) -> Result<SessionId, ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.cancel_active();
        // a load still in flight would clobber this turn
        self.load_ticket += 1;

        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.store.push_message(Message::user(text.clone()));
        self.store.begin_stream(id);

        let request = ChatRequestBody {
            message: text,
            conversation_id: self.store.conversation_id().cloned(),
            model: self.model.clone(),
        };
        let mut session = StreamSession::new(id);
        session.start(&self.runtime, self.transport.clone(), request, self.inbox_tx.clone());
        self.session = Some(session);
        self.notices.push(ChatNotice::Started { session: id });
        Ok(id)
    }

    /// user stop: drop the partial reply without committing anything.
    pub fn stop(&mut self) -> bool {
        self.cancel_active()
    }

    fn cancel_active(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.cancel() {
            return false;
        }
        let id = session.id();
        self.store.discard_stream();
        self.notices.push(ChatNotice::Cancelled { session: id });
        true
    }

    /// leave the current conversation for a fresh, unsaved one.
    pub fn new_conversation(&mut self) {
        self.cancel_active();
        self.load_ticket += 1;
        self.store.reset_conversation();
        self.notices.push(ChatNotice::ConversationCleared);
    }

    /// switch to a stored conversation. the active session is cancelled
    /// now; messages are replaced once the fetch returns.
    pub fn open_conversation(&mut self, id: ConversationId) {
        self.cancel_active();
        self.load_ticket += 1;
        let ticket = self.load_ticket;
        self.spawn_api(move |api| ApiReply::Loaded {
            result: api.get_conversation(&id),
            ticket,
            id,
        });
    }

    pub fn delete_conversation(&mut self, id: ConversationId) {
        self.spawn_api(move |api| ApiReply::Deleted {
            result: api.delete_conversation(&id),
            id,
        });
    }

    pub fn rename_conversation(&mut self, id: ConversationId, title: impl Into<String>) {
        let title = title.into();
        self.spawn_api(move |api| ApiReply::Renamed(api.update_conversation(&id, &title)));
    }

    /// reload the sidebar listing in the background. failures are logged.
    pub fn refresh_conversations(&mut self) {
        self.spawn_api(|api| ApiReply::Listed(api.list_conversations()));
    }

    fn spawn_api<F>(&self, call: F)
    where
        F: FnOnce(&dyn ConversationApi) -> ApiReply + Send + 'static,
    {
        let Some(api) = self.api.clone() else {
            debug!(target: "bevy_chat_stream", "no conversation api configured; skipping call");
            return;
        };
        let tx = self.inbox_tx.clone();
        self.runtime.spawn_blocking(move || {
            let reply = call(api.as_ref());
            let _ = tx.send(InboxMsg::Api(reply));
        });
    }

    /// apply pending background results in arrival order and expire an idle
    /// session. returns everything that changed since the last call.
    pub fn pump(&mut self) -> Vec<ChatNotice> {
        self.pump_at(Instant::now())
    }

    pub fn pump_at(&mut self, now: Instant) -> Vec<ChatNotice> {
        for _ in 0..self.config.max_events_per_pump.max(1) {
            match self.inbox_rx.try_recv() {
                Ok(InboxMsg::Session { session, event }) => self.apply_session_event(session, event, now),
                Ok(InboxMsg::Api(reply)) => self.apply_api_reply(reply),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.expire_idle(now);
        std::mem::take(&mut self.notices)
    }

    fn apply_session_event(&mut self, id: SessionId, event: SessionEvent, now: Instant) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id && s.is_active()) else {
            trace!(target: "bevy_chat_stream", "dropping event of inactive session {}", id);
            return;
        };
        session.touch(now);

        match event {
            SessionEvent::Activity => {}
            SessionEvent::Metadata(conversation_id) => {
                if self.store.adopt_conversation_id(conversation_id.clone()) {
                    info!(target: "bevy_chat_stream", "conversation assigned: {}", conversation_id);
                    self.notices.push(ChatNotice::ConversationAssigned(conversation_id));
                }
            }
            SessionEvent::Delta(text) => {
                if self.store.append_delta(id, &text) {
                    self.notices.push(ChatNotice::Delta { session: id, text });
                }
            }
            SessionEvent::Completed => {
                session.finish(SessionState::Completed);
                let message = self
                    .store
                    .take_stream(id)
                    .filter(|text| !text.is_empty())
                    .map(Message::assistant);
                if let Some(message) = &message {
                    self.store.push_message(message.clone());
                }
                info!(target: "bevy_chat_stream",
                    "session {} completed: committed={}", id, message.is_some()
                );
                self.notices.push(ChatNotice::Completed { session: id, message });
                self.refresh_conversations();
            }
            SessionEvent::Failed(error) => {
                session.finish(SessionState::Errored);
                self.commit_failure(id, error);
            }
        }
    }

    fn commit_failure(&mut self, id: SessionId, error: ChatError) {
        self.store.discard_stream();
        let message = Message::failure(&error);
        self.store.push_message(message.clone());
        self.notices.push(ChatNotice::Failed { session: id, error, message });
    }

    fn expire_idle(&mut self, now: Instant) {
        let Some(limit) = self.config.idle_timeout() else {
            return;
        };
        let Some(session) = self.session.as_mut().filter(|s| s.is_active()) else {
            return;
        };
        let idle = now.saturating_duration_since(session.last_activity());
        if idle < limit {
            return;
        }
        let id = session.id();
        warn!(target: "bevy_chat_stream", "session {} idle for {:?}; giving up", id, idle);
        session.cancel();
        self.commit_failure(id, ChatError::IdleTimeout(limit));
    }

    fn apply_api_reply(&mut self, reply: ApiReply) {
        match reply {
            ApiReply::Listed(Ok(conversations)) => {
                debug!(target: "bevy_chat_stream", "conversations refreshed: {}", conversations.len());
                self.store.set_conversations(conversations);
                self.notices.push(ChatNotice::ConversationsRefreshed);
            }
            ApiReply::Listed(Err(err)) => {
                warn!(target: "bevy_chat_stream", "failed to refresh conversations: {}", err);
            }
            ApiReply::Loaded { ticket, id, result } => {
                if ticket != self.load_ticket {
                    debug!(target: "bevy_chat_stream", "stale load of {} ignored", id);
                    return;
                }
                match result {
                    Ok(detail) => {
                        // a submit in between bumps the ticket, so this only
                        // guards against a session started some other way
                        self.cancel_active();
                        info!(target: "bevy_chat_stream",
                            "conversation {} loaded: {} messages", id, detail.messages.len()
                        );
                        self.store.replace_conversation(id.clone(), detail.messages);
                        self.notices.push(ChatNotice::ConversationLoaded(id));
                    }
                    Err(err) => {
                        warn!(target: "bevy_chat_stream", "failed to load conversation {}: {}", id, err);
                    }
                }
            }
            ApiReply::Deleted { id, result } => match result {
                Ok(()) => {
                    info!(target: "bevy_chat_stream", "conversation {} deleted", id);
                    if self.store.conversation_id() == Some(&id) {
                        self.new_conversation();
                    }
                    self.refresh_conversations();
                }
                Err(err) => {
                    warn!(target: "bevy_chat_stream", "failed to delete conversation {}: {}", id, err);
                }
            },
            ApiReply::Renamed(Ok(summary)) => {
                debug!(target: "bevy_chat_stream", "conversation {} renamed", summary.id);
                self.refresh_conversations();
            }
            ApiReply::Renamed(Err(err)) => {
                warn!(target: "bevy_chat_stream", "failed to rename conversation: {}", err);
            }
        }
    }
}
