//! Console frontend for the lobbychat matchmaking client.
//!
//! Spawns the session runtime over a seeded loopback backend, folds runtime
//! events into [`state::ConsoleState`], and drives the client from stdin
//! commands: `refresh`, `select <n>`, `join`, `create`, `ok`, `leave`,
//! `say <text>`, `help`, `quit`.

mod config;
mod logging;
mod state;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use lobby_core::{ClientCommand, ClientEvent, MemberId};
use lobby_platform::LoopbackBackend;
use lobby_runtime::spawn_runtime_with_config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

use crate::{
    config::ConsoleConfig,
    state::{ConsoleSnapshot, ConsoleState},
};

/// Input parsed from one stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleInput {
    Command(ClientCommand),
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };

    match verb {
        "refresh" => ConsoleInput::Command(ClientCommand::Refresh),
        "select" => match rest.parse::<usize>() {
            Ok(index) => ConsoleInput::Command(ClientCommand::Select { index }),
            Err(_) => ConsoleInput::Unknown(trimmed.to_owned()),
        },
        "join" => ConsoleInput::Command(ClientCommand::Join),
        "create" => ConsoleInput::Command(ClientCommand::Create),
        "ok" => ConsoleInput::Command(ClientCommand::AcknowledgeJoinFailure),
        "leave" => ConsoleInput::Command(ClientCommand::Leave),
        "say" if !rest.is_empty() => ConsoleInput::Command(ClientCommand::SubmitChat {
            text: rest.to_owned(),
        }),
        "help" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        _ => ConsoleInput::Unknown(trimmed.to_owned()),
    }
}

fn print_help() {
    println!("commands: refresh | select <n> | join | create | ok | leave | say <text> | quit");
}

fn render(snapshot: &ConsoleSnapshot) {
    println!();
    println!("== {}", snapshot.status_text);
    if snapshot.session_panel_visible {
        println!("   {}", snapshot.session_text);
        for line in &snapshot.chat_lines {
            println!("   {line}");
        }
        return;
    }

    for row in &snapshot.lobby_rows {
        let marker = if row.is_selected { ">" } else { " " };
        println!(" {marker} {}", row.text);
    }
    if !snapshot.detail_text.is_empty() {
        println!("   [{}]", snapshot.detail_text);
    }
}

fn seed_demo_lobbies(backend: &LoopbackBackend) {
    backend.seed_lobby(
        4,
        vec![MemberId(201), MemberId(202)],
        vec![
            ("map".to_owned(), "dust".to_owned()),
            ("region".to_owned(), "eu".to_owned()),
        ],
    );
    backend.seed_lobby(
        8,
        vec![MemberId(301)],
        vec![("mode".to_owned(), "coop".to_owned())],
    );
    info!("seeded demo lobbies");
}

#[tokio::main]
async fn main() {
    logging::init();

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let backend = Arc::new(LoopbackBackend::new(MemberId(config.member_id)));
    // A little latency makes the Refreshing/Joining states visible.
    backend.set_call_delay(Duration::from_millis(150));
    seed_demo_lobbies(&backend);

    let handle = spawn_runtime_with_config(Arc::clone(&backend), config.runtime());
    let mut events = handle.subscribe();
    let console = Arc::new(Mutex::new(ConsoleState::new(config.chat_max_lines)));

    let console_for_events = Arc::clone(&console);
    let event_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "event stream lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let mut console = console_for_events
                .lock()
                .expect("console state lock poisoned");
            console.apply(&event);
            match &event {
                ClientEvent::ChatLine { .. } | ClientEvent::InviteReceived { .. } => {
                    if let Some(line) = console.snapshot().chat_lines.last() {
                        println!("   {line}");
                    }
                }
                ClientEvent::CallFailed { .. } | ClientEvent::CommandRejected { .. } => {
                    if let Some(text) = console.snapshot().error_text {
                        println!(" ! {text}");
                    }
                    console.clear_error();
                }
                _ => render(&console.snapshot()),
            }
        }
        debug!("event task exiting");
    });

    if handle.send(ClientCommand::Activate).await.is_err() {
        error!("runtime stopped before activation");
        std::process::exit(1);
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_input(&line) {
            ConsoleInput::Command(command) => {
                if handle.send(command).await.is_err() {
                    error!("runtime stopped; exiting");
                    break;
                }
            }
            ConsoleInput::Help => print_help(),
            ConsoleInput::Quit => break,
            ConsoleInput::Unknown(input) => {
                if !input.is_empty() {
                    println!(" ! unknown command: '{input}'");
                    print_help();
                }
            }
        }
    }

    handle.shutdown().await;
    let _ = event_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_input("select 3"),
            ConsoleInput::Command(ClientCommand::Select { index: 3 })
        );
        assert_eq!(
            parse_input("say hello there"),
            ConsoleInput::Command(ClientCommand::SubmitChat {
                text: "hello there".to_owned()
            })
        );
    }

    #[test]
    fn rejects_malformed_select() {
        assert_eq!(
            parse_input("select abc"),
            ConsoleInput::Unknown("select abc".to_owned())
        );
    }

    #[test]
    fn maps_bare_verbs() {
        assert_eq!(
            parse_input("refresh"),
            ConsoleInput::Command(ClientCommand::Refresh)
        );
        assert_eq!(
            parse_input("ok"),
            ConsoleInput::Command(ClientCommand::AcknowledgeJoinFailure)
        );
        assert_eq!(parse_input("quit"), ConsoleInput::Quit);
        assert_eq!(parse_input("  "), ConsoleInput::Unknown(String::new()));
    }
}
