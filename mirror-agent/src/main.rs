//! Mirror Agent - Main entry point
//!
//! Runs one mirror session and exits.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use mirror_agent::daemon::shutdown::{join_logged, ShutdownCoordinator};
use mirror_agent::remote::auth::ClientCredentials;
use mirror_agent::remote::http::HttpRemote;
use mirror_agent::{config::Config, events, utils, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "mirror.toml")]
    config: PathBuf,

    /// Backup root directory (overrides config)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration problems are the only fatal errors
    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            utils::logger::init_console(args.log_level.as_deref().unwrap_or("info"))?;
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };
    if let Some(root) = args.root {
        config.backup.root_dir = root;
    }
    if let Err(e) = config.validate() {
        utils::logger::init_console(args.log_level.as_deref().unwrap_or("info"))?;
        tracing::error!("{}", e);
        return Err(e.into());
    }

    let session_id = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    let log_files = utils::logger::init(log_level, &config.log_dir(), &session_id)?;

    tracing::info!(
        "Starting mirror-agent v{} (root: {}, log: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.root_dir.display(),
        log_files.session_log.display()
    );

    let client = reqwest::Client::builder()
        .connect_timeout(config.remote.connect_timeout())
        .timeout(config.remote.request_timeout())
        .build()?;

    let tokens = Arc::new(ClientCredentials::new(
        client.clone(),
        config.remote.auth_url(),
        config.credentials.client_id.clone(),
        config.credentials.client_secret.clone(),
    ));
    let remote = Arc::new(HttpRemote::new(
        client.clone(),
        config.remote.base_url.clone(),
        config.remote.top_folder.clone(),
        tokens,
    ));

    // Ctrl+C / SIGTERM stop the walk between files
    let cancel = CancellationToken::new();
    let signals = ShutdownCoordinator::new(cancel.clone()).spawn();

    let (event_tx, event_rx) = events::channel();
    let reporter = events::spawn_reporter(event_rx);

    let grace = Duration::from_secs(config.session.grace_delay_secs);
    let summary = {
        let session = Session::new(config, remote, client)
            .with_cancel(cancel.clone())
            .with_events(event_tx);
        session.run().await
    };

    join_logged("Event reporter", reporter).await;

    if summary.cancelled {
        tracing::warn!("Session {} was cancelled before completion", summary.set_id);
    }

    // Stop the signal listener, then give buffered log writers time to drain
    cancel.cancel();
    join_logged("Signal listener", signals).await;
    tokio::time::sleep(grace).await;

    Ok(())
}
