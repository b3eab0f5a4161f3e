//! lifecycle of one completion request.
//!
//! the worker half runs on a blocking tokio thread: it opens the request,
//! decodes frames one chunk at a time and forwards typed events into the
//! inbox. the handle half stays with the orchestrator and carries the
//! tagged state plus the cancellation token.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy::log::{debug, error, info, trace};
use flume::Sender;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::extract::resolve_http_error;
use crate::frame::{Frame, FrameReader};
use crate::protocol::{StreamEvent, classify_payload};
use crate::transport::ChatTransport;
use crate::types::{ChatRequestBody, ConversationId};

/// minimum spacing of `SessionEvent::Activity` reports from one worker.
const ACTIVITY_INTERVAL: Duration = Duration::from_millis(50);

/// identifies one session within a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Cancelled,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

/// what a worker reports. a cancelled worker reports nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// bytes arrived but nothing in them applies to the store (keep-alive
    /// comments, blank or role-only lines). keeps the idle timer fresh.
    Activity,
    Delta(String),
    Metadata(ConversationId),
    Completed,
    Failed(ChatError),
}

/// everything the background side of the client sends to the main thread.
pub(crate) enum InboxMsg {
    Session { session: SessionId, event: SessionEvent },
    Api(crate::client::ApiReply),
}

/// orchestrator-owned handle of a session.
pub struct StreamSession {
    id: SessionId,
    state: SessionState,
    token: CancellationToken,
    last_activity: Instant,
}

impl StreamSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            token: CancellationToken::new(),
            last_activity: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Idle -> Active: spawn the worker with a token attached.
    pub(crate) fn start(
        &mut self,
        runtime: &Handle,
        transport: Arc<dyn ChatTransport>,
        request: ChatRequestBody,
        inbox: Sender<InboxMsg>,
    ) {
        if self.state != SessionState::Idle {
            return;
        }
        self.state = SessionState::Active;
        self.last_activity = Instant::now();
        let worker = Worker {
            id: self.id,
            token: self.token.clone(),
            inbox,
        };
        info!(target: "bevy_chat_stream",
            "session {} start: model={} conversation={:?} len={}",
            self.id, request.model, request.conversation_id, request.message.len()
        );
        runtime.spawn_blocking(move || worker.run(transport.as_ref(), &request));
    }

    /// Active -> Cancelled. returns false when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.token.cancel();
        self.state = SessionState::Cancelled;
        info!(target: "bevy_chat_stream", "session {} cancelled", self.id);
        true
    }

    /// Active -> Completed / Errored. terminal states stay put.
    pub(crate) fn finish(&mut self, outcome: SessionState) -> bool {
        if !self.is_active() || !outcome.is_terminal() {
            return false;
        }
        if outcome == SessionState::Cancelled {
            return self.cancel();
        }
        self.state = outcome;
        if outcome == SessionState::Errored {
            // an errored worker has usually stopped already; make sure it does
            self.token.cancel();
        }
        true
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Worker {
    id: SessionId,
    token: CancellationToken,
    inbox: Sender<InboxMsg>,
}

impl Worker {
    /// false once the receiving side is gone or the session was cancelled.
    fn emit(&self, event: SessionEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.inbox
            .send(InboxMsg::Session { session: self.id, event })
            .is_ok()
    }

    fn fail(&self, err: ChatError) {
        if self.token.is_cancelled() {
            debug!(target: "bevy_chat_stream", "session {} failure after cancel ignored: {}", self.id, err);
            return;
        }
        error!(target: "bevy_chat_stream", "session {} failed: {}", self.id, err);
        self.emit(SessionEvent::Failed(err));
    }

    fn run(self, transport: &dyn ChatTransport, request: &ChatRequestBody) {
        let response = match transport.open(request) {
            Ok(response) => response,
            Err(err) => return self.fail(err.into()),
        };
        if self.token.is_cancelled() {
            return;
        }

        if !response.is_success() {
            let status = response.status;
            let mut raw = Vec::new();
            let mut body = response.body;
            if let Err(err) = body.read_to_end(&mut raw) {
                debug!(target: "bevy_chat_stream", "session {} error body unreadable: {}", self.id, err);
            }
            let message = resolve_http_error(status, &String::from_utf8_lossy(&raw));
            return self.fail(ChatError::Http { status, message });
        }

        let mut frames = FrameReader::new(response.body);
        let mut deltas = 0usize;
        let mut reported = Instant::now();
        loop {
            // cancellation is checked between reads; a read already blocked on
            // a stalled server holds this thread and its connection until the
            // next byte, a transport error or the server closing.
            if self.token.is_cancelled() {
                debug!(target: "bevy_chat_stream", "session {} stopped reading after cancel", self.id);
                return;
            }
            let chunk = match frames.next_chunk() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => return self.fail(ChatError::Transport(err.to_string())),
            };
            trace!(target: "bevy_chat_stream", "session {} chunk: {} frames", self.id, chunk.len());
            let mut emitted = false;
            for frame in chunk {
                let payload = match frame {
                    Frame::Done => {
                        info!(target: "bevy_chat_stream", "session {} done sentinel: deltas={}", self.id, deltas);
                        self.emit(SessionEvent::Completed);
                        return;
                    }
                    Frame::Data(payload) => payload,
                };
                let event = match classify_payload(&payload) {
                    None => continue,
                    Some(StreamEvent::Error(message)) => {
                        return self.fail(ChatError::Application(message));
                    }
                    Some(StreamEvent::Metadata { conversation_id }) => {
                        SessionEvent::Metadata(conversation_id)
                    }
                    Some(StreamEvent::Delta(text)) => {
                        deltas += 1;
                        SessionEvent::Delta(text)
                    }
                };
                if !self.emit(event) {
                    return;
                }
                emitted = true;
            }
            if emitted {
                reported = Instant::now();
            } else if reported.elapsed() >= ACTIVITY_INTERVAL {
                if !self.emit(SessionEvent::Activity) {
                    return;
                }
                reported = Instant::now();
            }
        }

        info!(target: "bevy_chat_stream", "session {} stream ended: deltas={}", self.id, deltas);
        self.emit(SessionEvent::Completed);
    }
}
