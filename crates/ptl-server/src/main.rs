//! Projectile server entry point.
//!
//! Serves the demo `api` layer (see [`ptl_server::demo`]) on a single HTTP
//! endpoint.
//!
//! # Usage
//!
//! ```text
//! ptl-server [OPTIONS]
//!
//! Options:
//!   --config <FILE>              TOML config file [default: platform config dir]
//!   --host <ADDR>                Bind address
//!   --port <PORT>                TCP port
//!   --path <PATH>                Endpoint path
//!   --protocol-version <VER>     Protocol version served
//!   --log-level <LEVEL>          Log level when RUST_LOG is unset
//!   --init-config                Write the effective config to --config and exit
//! ```
//!
//! Options left out fall back to the config file, then to built-in defaults.
//!
//! | Variable           | Overrides            |
//! |--------------------|----------------------|
//! | `PTL_CONFIG`       | `--config`           |
//! | `PTL_HOST`         | `--host`             |
//! | `PTL_PORT`         | `--port`             |
//! | `PTL_PATH`         | `--path`             |
//! | `PTL_LOG_LEVEL`    | `--log-level`        |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ptl_server::demo::demo_server;
use ptl_server::infrastructure::http;
use ptl_server::infrastructure::storage::config::{
    config_file_path, load_config, save_config, ServerConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Projectile server.
#[derive(Debug, Parser)]
#[command(
    name = "ptl-server",
    about = "Serves Projectile layers over a single HTTP batch endpoint",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, env = "PTL_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind to.
    #[arg(long, env = "PTL_HOST")]
    host: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "PTL_PORT")]
    port: Option<u16>,

    /// URL path of the batch endpoint.
    #[arg(long, env = "PTL_PATH")]
    path: Option<String>,

    /// Protocol version; requests must carry `req@<version>`.
    #[arg(long)]
    protocol_version: Option<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "PTL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    /// Resolves the config file location.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given"),
        }
    }

    /// Layers the command-line overrides on top of `config`.
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = &self.host {
            config.server.bind_address = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.path {
            config.server.endpoint_path = path.clone();
        }
        if let Some(version) = &self.protocol_version {
            config.server.protocol_version = version.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.log_level = level.clone();
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config_path()?;
    let config = cli.apply(
        load_config(&path).with_context(|| format!("loading {}", path.display()))?,
    );

    if cli.init_config {
        save_config(&config, &path).with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    info!("Projectile server starting (protocol {})", config.server.protocol_version);

    let server = Arc::new(
        demo_server(&config.server.protocol_version)
            .map_err(|e| anyhow::anyhow!("building demo layer: {e}"))?,
    );

    let (listener, addr) = http::bind(&config.server.bind_address, config.server.port).await?;
    info!("bound {addr}");

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    };

    http::serve(listener, server, &config.server.endpoint_path, shutdown).await?;

    info!("Projectile server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
