//! bevy_chat_stream: an incremental chat streaming client as a bevy plugin.
//!
//! - opens one completion request at a time and decodes its sse body
//!   (`data:` lines, `[DONE]` sentinel, embedded `error.message` payloads).
//! - keeps a conversation store (messages, streaming buffer, streaming flag)
//!   that only the main thread mutates, inside `Update`.
//! - never blocks the main thread: requests run on blocking threads of a tiny
//!   tokio runtime and report back through a bounded inbox drained each frame.
//! - a new message or a conversation switch cancels the in-flight stream;
//!   cancellation is silent, errors become a visible assistant message.
//!
//! drive it with `ChatCommand` events and read `Chat*` events, or use
//! `ChatClient` directly outside bevy.

use bevy::prelude::*;
use std::sync::Arc;

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

pub use api::{AuthStatus, ConversationApi, ModelInfo, SettingsStatus, UreqApi, UsageSummary};
pub use client::{ChatClient, ChatNotice};
pub use config::ChatClientConfig;
pub use error::{ApiError, ChatError, ConfigError, TransportError};
pub use frame::{Frame, FrameDecoder, FrameReader};
pub use session::{SessionId, SessionState};
pub use store::{ConversationStore, StreamState};
pub use transport::{ChatTransport, TransportResponse, UreqTransport};
pub use types::{ChatRequestBody, ConversationDetail, ConversationId, ConversationSummary, Message, Role};

/// tokio runtime whose blocking pool carries the network work, so neither
/// the main thread nor bevy's task pools block on sockets.
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_chat_stream", "ChatClientPlugin: initializing Tokio multi-thread runtime");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// commands are applied and `Chat*` events emitted here (in `Update`)
    Pump,
}

/// requests for the chat client.
#[derive(Event, Clone, Debug)]
pub enum ChatCommand {
    Send(String),
    Stop,
    NewConversation,
    Open(ConversationId),
    Delete(ConversationId),
    Rename { id: ConversationId, title: String },
    RefreshConversations,
    SelectModel(String),
}

/// helper to enqueue a user message.
pub fn send_user_text(commands: &mut Commands, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_chat_stream", "send_user_text -> (len={})", text.len());
    commands.send_event(ChatCommand::Send(text));
}

#[derive(Event, Debug)]
pub struct ChatStarted {
    pub session: SessionId,
}
#[derive(Event, Debug)]
pub struct ChatDeltaEvt {
    pub session: SessionId,
    pub text: String,
}
#[derive(Event, Debug)]
pub struct ChatCompletedEvt {
    pub session: SessionId,
    /// the committed assistant message, if the stream produced any text.
    pub message: Option<Message>,
}
#[derive(Event, Debug)]
pub struct ChatCancelledEvt {
    pub session: SessionId,
}
#[derive(Event, Debug)]
pub struct ChatErrorEvt {
    /// `None` when a command was rejected before any session started.
    pub session: Option<SessionId>,
    pub error: ChatError,
}

/// conversation-level changes (sidebar, navigation, id assignment).
#[derive(Event, Debug, Clone, PartialEq)]
pub enum ConversationEvt {
    Assigned(ConversationId),
    Loaded(ConversationId),
    Cleared,
    ListRefreshed,
}

/// bevy plugin: wires systems, events, resources.
///
/// inserts a ureq-backed `ChatClient` built from `ChatClientConfig` unless a
/// client resource is already present (insert your own to swap transports).
pub struct ChatClientPlugin;

impl Plugin for ChatClientPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_chat_stream", "ChatClientPlugin: build()");
        app.add_event::<ChatCommand>()
            .add_event::<ChatStarted>()
            .add_event::<ChatDeltaEvt>()
            .add_event::<ChatCompletedEvt>()
            .add_event::<ChatCancelledEvt>()
            .add_event::<ChatErrorEvt>()
            .add_event::<ConversationEvt>()
            .configure_sets(Update, ChatSet::Pump)
            .add_systems(
                Update,
                (apply_chat_commands, pump_chat_client)
                    .chain()
                    .in_set(ChatSet::Pump),
            );

        if app.world().get_resource::<ChatClient>().is_none() {
            if app.world().get_resource::<TokioRt>().is_none() {
                app.insert_resource(TokioRt::default());
            }
            let config = app
                .world()
                .get_resource::<ChatClientConfig>()
                .cloned()
                .unwrap_or_default();
            let handle = app.world().resource::<TokioRt>().0.handle().clone();
            app.insert_resource(ChatClient::from_config(config.clone(), handle));
            app.insert_resource(config);
        }
    }
}

/// turns `ChatCommand` events into client calls.
fn apply_chat_commands(
    mut client: ResMut<ChatClient>,
    mut commands: EventReader<ChatCommand>,
    mut ev_err: EventWriter<ChatErrorEvt>,
) {
    for command in commands.read() {
        debug!(target: "bevy_chat_stream", "command: {:?}", command);
        match command {
            ChatCommand::Send(text) => {
                if let Err(error) = client.submit(text.clone()) {
                    warn!(target: "bevy_chat_stream", "send rejected: {}", error);
                    ev_err.write(ChatErrorEvt { session: None, error });
                }
            }
            ChatCommand::Stop => {
                client.stop();
            }
            ChatCommand::NewConversation => client.new_conversation(),
            ChatCommand::Open(id) => client.open_conversation(id.clone()),
            ChatCommand::Delete(id) => client.delete_conversation(id.clone()),
            ChatCommand::Rename { id, title } => client.rename_conversation(id.clone(), title.clone()),
            ChatCommand::RefreshConversations => client.refresh_conversations(),
            ChatCommand::SelectModel(model) => client.set_model(model.clone()),
        }
    }
}

/// drains the client's inbox and emits user-facing events.
fn pump_chat_client(
    mut client: ResMut<ChatClient>,
    mut ev_start: EventWriter<ChatStarted>,
    mut ev_delta: EventWriter<ChatDeltaEvt>,
    mut ev_done: EventWriter<ChatCompletedEvt>,
    mut ev_cancel: EventWriter<ChatCancelledEvt>,
    mut ev_err: EventWriter<ChatErrorEvt>,
    mut ev_conv: EventWriter<ConversationEvt>,
) {
    for notice in client.pump() {
        match notice {
            ChatNotice::Started { session } => {
                ev_start.write(ChatStarted { session });
            }
            ChatNotice::Delta { session, text } => {
                ev_delta.write(ChatDeltaEvt { session, text });
            }
            ChatNotice::Completed { session, message } => {
                ev_done.write(ChatCompletedEvt { session, message });
            }
            ChatNotice::Cancelled { session } => {
                ev_cancel.write(ChatCancelledEvt { session });
            }
            ChatNotice::Failed { session, error, .. } => {
                ev_err.write(ChatErrorEvt { session: Some(session), error });
            }
            ChatNotice::ConversationAssigned(id) => {
                ev_conv.write(ConversationEvt::Assigned(id));
            }
            ChatNotice::ConversationLoaded(id) => {
                ev_conv.write(ConversationEvt::Loaded(id));
            }
            ChatNotice::ConversationCleared => {
                ev_conv.write(ConversationEvt::Cleared);
            }
            ChatNotice::ConversationsRefreshed => {
                ev_conv.write(ConversationEvt::ListRefreshed);
            }
        }
    }
}
