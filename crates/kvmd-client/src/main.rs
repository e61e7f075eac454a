//! kvmd-client: command-line access to a running kvmd daemon.
//!
//! # Usage
//!
//! ```text
//! kvmd-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   watch        Print every event from the daemon as a JSON line
//!   key <NAME>   Press and release one key, then disconnect
//!
//! Options:
//!   --unix-path <PATH>   Daemon socket [default: /run/kvmd/kvmd.sock]
//!   --user <USER>        Sent as X-KVMD-User
//!   --passwd <PASSWD>    Sent as X-KVMD-Passwd
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset [default: warn]
//! ```
//!
//! | Variable          | Description           |
//! |-------------------|-----------------------|
//! | `KVMD_UNIX_PATH`  | Daemon socket path    |
//! | `KVMD_USER`       | User name             |
//! | `KVMD_PASSWD`     | Password              |

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kvmd_client::application::ClientEvent;
use kvmd_client::infrastructure::{KvmdClient, DEFAULT_UNIX_PATH};
use kvmd_core::encode_text;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "kvmd-client", about = "Talk to a kvmd daemon over its unix socket", version)]
struct Cli {
    /// Path of the daemon's unix socket.
    #[arg(long, env = "KVMD_UNIX_PATH", default_value = DEFAULT_UNIX_PATH)]
    unix_path: PathBuf,

    #[arg(long, env = "KVMD_USER", default_value = "")]
    user: String,

    #[arg(long, env = "KVMD_PASSWD", default_value = "", hide_env_values = true)]
    passwd: String,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every event from the daemon until it disconnects or Ctrl+C.
    Watch,
    /// Press and release a key.
    Key {
        /// Key name, e.g. `KeyA` or `Enter`.
        name: String,
    },
}

impl Cli {
    fn client(&self) -> KvmdClient {
        KvmdClient::new(&self.unix_path, &self.user, &self.passwd)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let client = cli.client();
    match cli.command {
        Command::Watch => watch(&client).await,
        Command::Key { name } => press_key(&client, &name).await,
    }
}

/// Prints events to stdout, one JSON document per line.
async fn watch(client: &KvmdClient) -> anyhow::Result<()> {
    let ws = client.ws().await?;
    let writer = ws.writer();
    let (events_tx, mut events_rx) = mpsc::channel::<ClientEvent>(64);
    let mut session = tokio::spawn(ws.communicate(events_tx));

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => println!("{}", encode_text(&event.event_type, &event.payload)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, disconnecting");
                // The loop may already be gone; then there is nothing to close.
                let _ = writer.close();
                break;
            }
            result = &mut session => {
                return result.context("session task failed")?.map_err(Into::into);
            }
        }
    }

    session
        .await
        .context("session task failed")?
        .context("connection failed")
}

/// Sends a press and a release, then closes once both are written.
async fn press_key(client: &KvmdClient, name: &str) -> anyhow::Result<()> {
    let ws = client.ws().await?;
    let writer = ws.writer();
    writer.send_key_event(name, true)?;
    writer.send_key_event(name, false)?;
    writer.close()?;

    let (events_tx, mut events_rx) = mpsc::channel::<ClientEvent>(16);
    let drain = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            debug!(event_type = %event.event_type, "ignoring event");
        }
    });
    ws.communicate(events_tx)
        .await
        .context("connection failed")?;
    drain.await.context("event drain failed")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
