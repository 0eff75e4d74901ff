//! Console stand-in for a game's lobby UI.
//!
//! Runs a host and a client in one process against in-memory services:
//! the host creates "Arena", the client lists lobbies, joins by id, and
//! both print their status lines. Each side keeps a "menu visible" flag
//! that flips to the in-game HUD on `MatchFound`, which is all a real
//! menu screen does with these notifications.
//!
//! `RUST_LOG=debug cargo run -p lobby-console` shows the library's logs.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use matchlink::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// What the menu screen tracks for one player.
struct Screen {
    label: &'static str,
    menu_visible: AtomicBool,
}

impl Screen {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            menu_visible: AtomicBool::new(true),
        })
    }

    fn on_notification(&self, notification: &Notification) {
        match notification {
            Notification::StateChanged(status) => println!("[{}] {status}", self.label),
            Notification::MatchFound => {
                self.menu_visible.store(false, Ordering::SeqCst);
                println!("[{}] -- menu hidden, HUD shown --", self.label);
            }
        }
    }

    fn in_game(&self) -> bool {
        !self.menu_visible.load(Ordering::SeqCst)
    }
}

async fn player<D, R>(
    directory: D,
    relay: R,
    network: &LoopbackNetwork,
    screen: &Arc<Screen>,
) -> Result<SessionOrchestrator<D, R, LoopbackTransport>, MatchlinkError>
where
    D: SessionDirectory,
    R: RelayService,
{
    let orchestrator = OrchestratorBuilder::new()
        .build(directory, relay, network.transport(), &AnonymousAuthenticator)
        .await?;

    let screen = Arc::clone(screen);
    orchestrator.subscribe(move |n| screen.on_notification(n));
    Ok(orchestrator)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let directory = InMemoryDirectory::default();
    let relay = InMemoryRelay::default();
    let network = LoopbackNetwork::new();

    let host_screen = Screen::new("host");
    let client_screen = Screen::new("client");

    let host = player(directory.clone(), relay.clone(), &network, &host_screen).await?;
    let client = player(directory.clone(), relay.clone(), &network, &client_screen).await?;

    host.create_lobby("Arena").await?;

    let lobbies = client.refresh_list().await?;
    println!("[client] lobbies:\n{}", serde_json::to_string_pretty(&lobbies)?);

    let Some(arena) = lobbies.first() else {
        println!("[client] nothing to join");
        return Ok(());
    };
    client.join_lobby(&arena.id).await?;

    // The host hears about the client through its transport events.
    let started = tokio::time::Instant::now();
    while !host_screen.in_game() && started.elapsed() < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!(
        "host in game: {}, client in game: {}",
        host_screen.in_game(),
        client_screen.in_game()
    );

    client.leave().await?;
    host.shutdown().await;
    network.close();
    tracing::info!(hosts_left = network.host_count(), "demo finished");

    Ok(())
}
