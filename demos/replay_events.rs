//! Replay a recorded gateway session
//!
//! Feeds an NDJSON recording (one `{"t": ..., "d": ...}` dispatch per line)
//! through a connection state and prints every notification it emits.
//!
//! Run with: cargo run --example replay_events -- session.ndjson

use anyhow::{Context, Result};
use chord_state::gateway::NullGateway;
use chord_state::http::{RestClient, RestConfig};
use chord_state::{ConnectionState, StateConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: replay_events <recording.ndjson>")?;

    println!("Chord State Replay");
    println!("==================\n");
    println!("Replaying {}", path);

    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("failed to open {}", path))?;
    let mut lines = BufReader::new(file).lines();

    let mut dispatches = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame: Value = serde_json::from_str(&line).context("malformed recording line")?;
        let Some(name) = frame.get("t").and_then(Value::as_str) else {
            continue;
        };
        dispatches.push((name.to_owned(), frame.get("d").cloned().unwrap_or(Value::Null)));
    }
    println!("Loaded {} dispatches\n", dispatches.len());

    let config = StateConfig {
        guild_ready_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let http = Arc::new(RestClient::new(RestConfig::default())?);
    let (state, events) = ConnectionState::new(config, Arc::new(NullGateway), http)?;

    state.process_events(futures::stream::iter(dispatches)).await;
    // let the startup sequencer finish before the stream is drained
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(state);

    let mut events = events;
    let mut count = 0;
    while let Some(event) = events.try_next() {
        println!("  {}", event.name());
        count += 1;
    }

    println!("\n{} notifications emitted", count);
    Ok(())
}
