use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::mpsc;

use arena_notify::{
    ArenaEvent, ConfigStore, Credentials, ListenerController, SessionStats,
};

fn config_path() -> PathBuf {
    std::env::var("ARENA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("arena-notify.json"))
}

/// Headless runner: the GUI shell normally drives the listener; this wires
/// it to the terminal instead.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let store = ConfigStore::new(config_path())?;
    let config = store.get();
    let creds = Credentials::from_env();
    let stats = Arc::new(SessionStats::default());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut listener = ListenerController::new(stats.clone());
    listener.start(config, creds, events_tx)?;
    info!("listening for screenshots (ctrl-c to stop)");

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(ArenaEvent::PopDetected { duration_sec }) => {
                    info!("arena queue popped, countdown {duration_sec}s");
                }
                Some(ArenaEvent::StopDetected) => {
                    info!("arena started, countdown cleared");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    listener.stop().await?;
    println!("{}", stats.summary_line());
    Ok(())
}
