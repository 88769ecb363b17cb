use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pylens_relay::Relay;
use pylens_relay::config::{self, FileConfig, Overrides, RelayConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pylens-relay")]
#[command(about = "Relay between an inspected Python runtime and browser sessions")]
struct Args {
    /// Config file (missing file is fine)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Host for the HTTP server
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the HTTP server
    #[arg(short, long)]
    port: Option<u16>,

    /// Host the runtime connects to
    #[arg(long)]
    upstream_host: Option<String>,

    /// Port the runtime connects to
    #[arg(long)]
    upstream_port: Option<u16>,

    /// Directory of extra static assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        "pylens_relay=debug,tower_http=debug"
    } else {
        "pylens_relay=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut file_config: FileConfig = config::load_config(&args.config)
        .extract()
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    Overrides {
        host: args.host,
        port: args.port,
        upstream_host: args.upstream_host,
        upstream_port: args.upstream_port,
        static_dir: args.static_dir,
    }
    .apply(&mut file_config);
    let relay_config = RelayConfig::from_file(&file_config)?;

    let relay = Relay::bind(&relay_config)
        .await
        .context("Failed to start relay")?;
    let metrics = relay.state().metrics.clone();

    info!("HTTP server listening on http://{}", relay.http_addr()?);
    info!(
        "Waiting for the Python runtime on {}",
        relay.upstream_addr()?
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, exiting gracefully");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    relay.run(shutdown).await.context("HTTP server failed")?;

    let snapshot = metrics.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!(metrics = %json, "final relay metrics"),
        Err(_) => info!(?snapshot, "final relay metrics"),
    }
    Ok(())
}
