//! headless console chat on top of bevy_chat_stream.
//! - type a message and press enter; the reply streams in as it arrives.
//! - `/stop`, `/new`, `/list`, `/open <id>`, `/rename <id> <title>`,
//!   `/delete <id>`, `/model <name>`, `/status`, `/quit`.
//! - backend from `CHAT_BASE_URL` (default `http://localhost:8080/api`), or a
//!   json config file passed as the first argument.
//!
//! run with `RUST_LOG=bevy_chat_stream=debug` to follow the sessions.

use std::io::{BufRead, Write};
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_chat_stream::{
    ChatCancelledEvt, ChatClient, ChatClientConfig, ChatClientPlugin, ChatCommand, ChatCompletedEvt,
    ChatDeltaEvt, ChatErrorEvt, ChatSet, ConversationEvt, ConversationId, Role, UreqApi,
};

/// lines typed on stdin, read on their own thread so the app loop never blocks.
#[derive(Resource)]
struct StdinLines(flume::Receiver<String>);

/// set by `/list`; the listing also refreshes after every turn.
#[derive(Resource, Default)]
struct ListRequested(bool);

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => ChatClientConfig::from_json_file(&path).unwrap_or_else(|err| {
            eprintln!("{path}: {err}; using defaults");
            ChatClientConfig::default()
        }),
        None => ChatClientConfig::default(),
    }
    .with_env_overrides();

    let (tx, rx) = flume::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("chatting with {} ({}); /quit to leave", config.base_url, config.model);
    prompt();

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(16))),
        )
        .add_plugins(LogPlugin::default())
        .insert_resource(config)
        .insert_resource(StdinLines(rx))
        .init_resource::<ListRequested>()
        .add_plugins(ChatClientPlugin)
        .add_systems(Update, read_stdin.before(ChatSet::Pump))
        .add_systems(
            Update,
            (on_delta, on_done, on_cancel, on_error, on_conversation).after(ChatSet::Pump),
        )
        .run();
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn read_stdin(
    lines: Res<StdinLines>,
    client: Res<ChatClient>,
    mut list_requested: ResMut<ListRequested>,
    mut commands: EventWriter<ChatCommand>,
    mut exit: EventWriter<AppExit>,
) {
    for line in lines.0.try_iter() {
        let line = line.trim();
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match head {
            "" => prompt(),
            "/quit" => {
                exit.write(AppExit::Success);
            }
            "/stop" => {
                commands.write(ChatCommand::Stop);
                prompt();
            }
            "/new" => {
                commands.write(ChatCommand::NewConversation);
            }
            "/list" => {
                list_requested.0 = true;
                commands.write(ChatCommand::RefreshConversations);
            }
            "/open" if !rest.is_empty() => {
                commands.write(ChatCommand::Open(ConversationId::from(rest)));
            }
            "/delete" if !rest.is_empty() => {
                commands.write(ChatCommand::Delete(ConversationId::from(rest)));
            }
            "/rename" => match rest.split_once(' ') {
                Some((id, title)) => {
                    commands.write(ChatCommand::Rename {
                        id: id.into(),
                        title: title.trim().to_string(),
                    });
                }
                None => {
                    println!("usage: /rename <id> <title>");
                    prompt();
                }
            },
            "/model" if !rest.is_empty() => {
                commands.write(ChatCommand::SelectModel(rest.to_string()));
                println!("model: {rest}");
                prompt();
            }
            "/status" => {
                // plain request/response calls; keep them off the app loop
                let api = UreqApi::new(client.config());
                std::thread::spawn(move || {
                    match api.auth_status() {
                        Ok(auth) => println!("\nlogged in: {} ({})", auth.logged_in, auth.auth_method),
                        Err(err) => println!("\nauth status unavailable: {err}"),
                    }
                    if let Ok(usage) = api.usage_summary(7) {
                        println!(
                            "last 7 days: {} requests, {} tokens, {:.0}ms avg",
                            usage.total_requests, usage.total_tokens, usage.avg_response_time_ms
                        );
                    }
                    if let Ok(models) = api.models() {
                        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
                        println!("models: {}", ids.join(", "));
                    }
                    prompt();
                });
            }
            cmd if cmd.starts_with('/') => {
                println!("unknown command: {line}");
                prompt();
            }
            _ => {
                commands.write(ChatCommand::Send(line.to_string()));
                print!("assistant: ");
                let _ = std::io::stdout().flush();
            }
        }
    }
}

fn on_delta(mut ev: EventReader<ChatDeltaEvt>) {
    let mut out = std::io::stdout().lock();
    for ChatDeltaEvt { text, .. } in ev.read() {
        let _ = out.write_all(text.as_bytes());
    }
    let _ = out.flush();
}

fn on_done(mut ev: EventReader<ChatCompletedEvt>) {
    for ChatCompletedEvt { session, message } in ev.read() {
        debug!(target: "chat", "session {} done (committed={})", session, message.is_some());
        println!();
        prompt();
    }
}

fn on_cancel(mut ev: EventReader<ChatCancelledEvt>) {
    for ChatCancelledEvt { session } in ev.read() {
        println!("\n[stopped {}]", session);
    }
}

fn on_error(mut ev: EventReader<ChatErrorEvt>) {
    for ChatErrorEvt { session, error } in ev.read() {
        warn!(target: "chat", "chat error (session={:?}): {}", session, error);
        println!("\nError: {error}");
        prompt();
    }
}

fn on_conversation(
    mut ev: EventReader<ConversationEvt>,
    mut list_requested: ResMut<ListRequested>,
    client: Res<ChatClient>,
) {
    for evt in ev.read() {
        match evt {
            ConversationEvt::Assigned(id) => {
                debug!(target: "chat", "conversation {}", id);
            }
            ConversationEvt::Cleared => {
                println!("(new conversation)");
                prompt();
            }
            ConversationEvt::Loaded(id) => {
                println!("conversation {id}:");
                for message in client.store().messages() {
                    let who = match message.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    println!("{who}: {}", message.content);
                }
                prompt();
            }
            ConversationEvt::ListRefreshed => {
                if !std::mem::take(&mut list_requested.0) {
                    continue;
                }
                for c in client.store().conversations() {
                    println!("  {}  {}", c.id, c.title);
                }
                println!("{} conversation(s)", client.store().conversations().len());
                prompt();
            }
        }
    }
}
