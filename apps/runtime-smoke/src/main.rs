use std::{env, sync::Arc, time::Duration};

use lobby_core::{ClientCommand, ClientEvent, ClientState, MemberId};
use lobby_platform::LoopbackBackend;
use lobby_runtime::spawn_runtime;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let member_id = env::var("LOBBYCHAT_MEMBER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let backend = Arc::new(LoopbackBackend::new(MemberId(member_id)));
    backend.seed_lobby(
        4,
        vec![MemberId(2)],
        vec![("map".to_owned(), "dust".to_owned())],
    );

    let handle = spawn_runtime(Arc::clone(&backend));
    let mut events = handle.subscribe();
    if handle.send(ClientCommand::Activate).await.is_err() {
        eprintln!("Runtime stopped before activation.");
        std::process::exit(1);
    }

    loop {
        let event = match timeout(WAIT, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(_)) | Err(_) => {
                eprintln!("Runtime produced no refresh result in time.");
                std::process::exit(1);
            }
        };

        match event {
            ClientEvent::DirectoryUpdated { lobbies } => {
                println!("Refresh completed with {} lobbies.", lobbies.len());
            }
            ClientEvent::StateChanged {
                state: ClientState::ResultsReady,
            } => {
                println!("Runtime reached ResultsReady. Wiring looks good.");
                break;
            }
            ClientEvent::StateChanged {
                state: ClientState::NoResultsFound,
            } => {
                eprintln!("Seeded lobby was not listed.");
                std::process::exit(1);
            }
            _ => {}
        }
    }

    handle.shutdown().await;
}
