// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use tactical_protocols::backends::tactical::{TacticalActionExecutor, TacticalBoard};
use tactical_protocols::config::load_and_validate_config;
use tactical_protocols::engine::{situation_channel, ProtocolEngine, SituationFeed};
use tactical_protocols::protocol::Context;

/// Situation updates relayed to the engine before the run is wound down.
const MAX_SITUATION_UPDATES: usize = 8;

/// How long the relay waits for another situation update before stopping.
const UPDATE_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <protocols.yaml|toml> <protocol_id> [context.yaml|json]", program);
    eprintln!("Example: {} configs/perimeter-watch.yaml perimeter_watch context.yaml", program);
    eprintln!("Events are printed to stdout as JSON lines; logs go to stderr (RUST_LOG).");
    std::process::exit(1);
}

fn load_context(path: &Path) -> Result<Context> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading context file {}", path.display()))?;
    let context = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(context)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        usage(&args[0]);
    }
    let protocols_file = &args[1];
    let protocol_id = &args[2];
    let context = match args.get(3) {
        Some(path) => load_context(Path::new(path))?,
        None => Context::new(),
    };

    let config = load_and_validate_config(protocols_file)
        .with_context(|| format!("loading {}", protocols_file))?;
    if !config.protocols.iter().any(|p| &p.id == protocol_id) {
        bail!("protocol '{}' is not defined in {}", protocol_id, protocols_file);
    }

    let board = Arc::new(TacticalBoard::with_default_layers());
    let (published, mut published_rx) = situation_channel();
    let executor = TacticalActionExecutor::new(board.clone()).with_situation_channel(published);
    let engine = ProtocolEngine::from_config(config, Arc::new(executor))?;

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    printed += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        Ok::<usize, anyhow::Error>(printed)
    });

    let (updates, updates_rx) = situation_channel();
    let feed = SituationFeed::spawn(engine.clone(), updates_rx);

    engine.activate(protocol_id, context).await?;

    // Relay what update_situation publishes back into the engine, bounded so
    // looping protocols terminate.
    let mut relayed = 0;
    while relayed < MAX_SITUATION_UPDATES {
        match tokio::time::timeout(UPDATE_IDLE_TIMEOUT, published_rx.recv()).await {
            Ok(Some(payload)) => {
                updates.send(payload)?;
                relayed += 1;
            }
            Ok(None) | Err(_) => break,
        }
    }
    drop(updates);
    let applied = feed.join().await;

    tracing::info!(
        protocol_id = %protocol_id,
        applied,
        still_active = engine.is_active(protocol_id),
        active_steps = ?engine.active_steps(protocol_id),
        elements = board.all_elements().len(),
        "Run finished"
    );

    drop(engine);
    let printed = printer.await??;
    tracing::debug!(printed, "Event stream closed");
    Ok(())
}
