//! kvmd daemon: entry point.
//!
//! Serves the HID API over HTTP and WebSocket on a unix socket.  A front-end
//! proxy is expected to expose the socket to browsers.
//!
//! # Usage
//!
//! ```text
//! kvmd [OPTIONS]
//!
//! Options:
//!   --config     <PATH>  TOML config file
//!   --unix-path  <PATH>  Listening socket [default: /run/kvmd/kvmd.sock]
//!   --unix-rm    <BOOL>  Remove a stale socket before binding [default: true]
//!   --unix-mode  <OCTAL> Socket permissions, 0 to keep [default: 660]
//!   --heartbeat  <SECS>  WebSocket ping period, 0 to disable [default: 15]
//!   --log-level  <LEVEL> Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! Values given on the command line override the config file, which
//! overrides the built-in defaults.
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                |
//! |-------------------|----------------------------|
//! | `KVMD_CONFIG`     | Config file path           |
//! | `KVMD_UNIX_PATH`  | Listening socket path      |
//! | `KVMD_LOG_LEVEL`  | Default log filter         |
//! | `RUST_LOG`        | Full `tracing` filter      |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kvmd_server::application::{
    AllowAll, Exposed, ExposedRegistry, HidApi, HidService, SessionHub, SystemApi,
};
use kvmd_server::domain::{AppConfig, HidBackend};
use kvmd_server::infrastructure::{DummyHid, HttpServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// kvmd remote-control daemon.
#[derive(Debug, Parser)]
#[command(name = "kvmd", about = "KVM daemon: HID control over HTTP and WebSocket", version)]
struct Cli {
    /// TOML config file.  Missing keys use built-in defaults.
    #[arg(long, env = "KVMD_CONFIG")]
    config: Option<PathBuf>,

    /// Path of the listening unix socket.
    #[arg(long, env = "KVMD_UNIX_PATH")]
    unix_path: Option<PathBuf>,

    /// Remove a stale socket file before binding.
    #[arg(long)]
    unix_rm: Option<bool>,

    /// Socket permissions in octal (e.g. `660`).  `0` keeps the umask default.
    #[arg(long, value_parser = parse_octal_mode)]
    unix_mode: Option<u32>,

    /// Seconds between WebSocket pings.  `0` disables the heartbeat.
    #[arg(long)]
    heartbeat: Option<f64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "KVMD_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Parses `660`, `0660` or `0o660`.
fn parse_octal_mode(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {value:?}: {e}"))
}

impl Cli {
    /// Loads the config file (if any) and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged config fails validation.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => AppConfig::default(),
        };

        if let Some(unix_path) = self.unix_path {
            config.server.unix_path = unix_path;
        }
        if let Some(unix_rm) = self.unix_rm {
            config.server.unix_rm = unix_rm;
        }
        if let Some(unix_mode) = self.unix_mode {
            config.server.unix_mode = unix_mode;
        }
        if let Some(heartbeat) = self.heartbeat {
            config.server.heartbeat = heartbeat;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments and the config file are merged into an [`AppConfig`].
/// 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to
///    the configured log level.
/// 3. The HID backend, HID service and API components are created and their
///    routes collected into the registry.  A duplicate route aborts here.
/// 4. The state poller and the mouse jiggler are spawned.
/// 5. The server runs until Ctrl+C, then closes every session and lets the
///    backend clean up.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "kvmd {} starting: socket={}",
        env!("CARGO_PKG_VERSION"),
        config.server.unix_path.display()
    );

    // ── Components ────────────────────────────────────────────────────────────
    let backend: Arc<dyn HidBackend> = Arc::new(DummyHid::new());
    let hid = Arc::new(HidService::new(Arc::clone(&backend), &config.hid));
    let hid_api = Arc::new(HidApi::new(Arc::clone(&hid)));
    let hub = Arc::new(SessionHub::new(hid_api.clone()));
    let system_api = SystemApi::new(Arc::clone(&hub));

    let components: [&dyn Exposed; 2] = [hid_api.as_ref(), &system_api];
    let registry = ExposedRegistry::build(&components).context("invalid route table")?;
    let server = HttpServer::new(
        config.server.clone(),
        registry,
        Arc::clone(&hub),
        Arc::new(AllowAll),
    )
    .context("invalid route table")?;

    // ── Background tasks ──────────────────────────────────────────────────────
    let poller = tokio::spawn({
        let hid_api = Arc::clone(&hid_api);
        let hub = Arc::clone(&hub);
        async move { hid_api.run_state_poller(hub).await }
    });
    let jiggler = tokio::spawn(Arc::clone(&hid).run_jiggler());

    // ── Serve ─────────────────────────────────────────────────────────────────
    let result = server
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl+C, initiating graceful shutdown"),
                Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
            }
        })
        .await;

    poller.abort();
    jiggler.abort();
    hid.cleanup().await;

    info!("kvmd stopped");
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
