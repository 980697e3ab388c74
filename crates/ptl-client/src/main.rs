//! Projectile command-line client.
//!
//! # Usage
//!
//! ```text
//! ptl-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   sync                      Print every exposed layer as mirrored after a sync
//!   get   <NAME>              Read "<layer>/<path>"
//!   set   <NAME> <JSON>       Write a JSON value to "<layer>/<path>"
//!   call  <NAME> [JSON]...    Call "<layer>/<method>" with JSON arguments
//!   batch <JSON>              Send a raw JSON array of actions as one batch
//!
//! Options:
//!   --url <URL>                  Endpoint URL [env: PTL_URL]
//!   --protocol-version <VER>     Protocol version spoken
//!   --ctx <JSON>                 JSON object merged into the request context
//!   --log-level <LEVEL>          Log level when RUST_LOG is unset
//! ```
//!
//! Every command prints its result as pretty JSON on stdout.  Logs go to
//! stderr.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ptl_client::{ClientConfig, PtlClient};
use ptl_core::{Action, PROTOCOL_VERSION};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Projectile client.
#[derive(Debug, Parser)]
#[command(
    name = "ptl-client",
    about = "Talks to a Projectile server from the command line",
    version
)]
struct Cli {
    /// Full URL of the batch endpoint.
    #[arg(long, env = "PTL_URL", default_value = "http://127.0.0.1:8080/ptl")]
    url: String,

    /// Protocol version; requests carry `req@<version>`.
    #[arg(long, default_value = PROTOCOL_VERSION)]
    protocol_version: String,

    /// JSON object merged into the request context, e.g. `{"token":"..."}`.
    #[arg(long, global = true)]
    ctx: Option<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "PTL_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync every exposed layer and print the mirror.
    Sync,
    /// Read a property.
    Get {
        /// `<layer>/<path>`
        name: String,
    },
    /// Write a property.
    Set {
        /// `<layer>/<path>`
        name: String,
        /// New value as JSON.
        value: String,
    },
    /// Call a method.
    Call {
        /// `<layer>/<method>`
        name: String,
        /// Arguments, one JSON value each.
        args: Vec<String>,
    },
    /// Send raw actions (`[{"name": ..., "action": ..., "args": [...]}]`).
    Batch {
        /// JSON array of actions.
        actions: String,
    },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.url).with_protocol_version(&self.protocol_version)
    }

    fn context(&self) -> anyhow::Result<Map<String, Value>> {
        match &self.ctx {
            None => Ok(Map::new()),
            Some(raw) => match parse_json(raw, "--ctx")? {
                Value::Object(fields) => Ok(fields),
                other => bail!("--ctx must be a JSON object, got {other}"),
            },
        }
    }
}

fn parse_json(raw: &str, what: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON: {raw}"))
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

    let client = PtlClient::http(cli.client_config());
    client.merge_context(cli.context()?);
    info!(url = client.url(), "Projectile client starting");

    let output = run(&client, &cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    let ctx = client.context();
    if !ctx.is_empty() {
        let ctx = Value::Object(ctx);
        debug!("final context: {ctx}");
    }
    Ok(())
}

async fn run(client: &PtlClient, command: &Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Sync => {
            let layers = client.sync().await.context("sync failed")?;
            Value::Object(
                layers
                    .iter()
                    .map(|layer| (layer.name().to_string(), layer.snapshot()))
                    .collect(),
            )
        }
        Command::Get { name } => client
            .get_property_value(name)
            .await
            .with_context(|| format!("get {name}"))?,
        Command::Set { name, value } => {
            let value = parse_json(value, "value")?;
            client
                .set_property_value(name, value)
                .await
                .with_context(|| format!("set {name}"))?
        }
        Command::Call { name, args } => {
            let args = args
                .iter()
                .map(|raw| parse_json(raw, "argument"))
                .collect::<anyhow::Result<Vec<_>>>()?;
            client
                .call(name, args)
                .await
                .with_context(|| format!("call {name}"))?
        }
        Command::Batch { actions } => {
            let actions: Vec<Action> = serde_json::from_str(actions)
                .context("actions must be a JSON array of {name, action?, args?}")?;
            client.start_buffering();
            for action in actions {
                // Outcomes are read from the flushed result list below.
                drop(client.make_request(action));
            }
            let outcomes = client
                .stop_buffering_and_flush()
                .await
                .context("batch failed")?;
            serde_json::to_value(outcomes)?
        }
    };
    Ok(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
