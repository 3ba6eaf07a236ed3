use crate::config_loader::{load_config, MatchConfig};
use crate::logging::init_logging;
use crate::match_service::{MatchService, ScoringGate};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

/// Top-level CLI for the match scoring service
#[derive(Parser)]
#[command(
    name = "vehicle_match",
    version,
    about = "Vehicle match scoring service"
)]
pub struct Cli {
    /// Log filter, overrides the configured level
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API (scoring, model metadata, health)
    Serve {
        /// Host/IP to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
        /// Checkpoint to load before accepting traffic
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Score one JSON request file and print the response
    Score {
        #[arg(short, long)]
        checkpoint: Option<String>,
        #[arg(short, long)]
        request: String,
    },

    /// Print checkpoint metadata after verifying it against the schema
    Inspect {
        #[arg(short, long)]
        checkpoint: Option<String>,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Serve {
            host,
            port,
            checkpoint,
        } => serve(config, host, port, checkpoint),
        Commands::Score {
            checkpoint,
            request,
        } => {
            let path = checkpoint.unwrap_or(config.checkpoint_path);
            let service = MatchService::load(&path)?;
            let content = std::fs::read_to_string(&request)
                .with_context(|| format!("failed to read request file {request}"))?;
            let payload: serde_json::Value =
                serde_json::from_str(&content).context("request file is not valid JSON")?;
            let response = service.score_json(payload)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Inspect { checkpoint } => {
            let path = checkpoint.unwrap_or(config.checkpoint_path);
            let service = MatchService::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&service.info())?);
            Ok(())
        }
    }
}

fn serve(
    config: MatchConfig,
    host: Option<String>,
    port: Option<u16>,
    checkpoint: Option<String>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);
    let checkpoint = checkpoint.unwrap_or(config.checkpoint_path);

    // The checkpoint is loaded and installed before the listener exists, so
    // no request can observe a closed gate in normal operation.
    let gate = Arc::new(ScoringGate::new());
    let service = MatchService::load(&checkpoint)
        .with_context(|| format!("refusing to start: cannot load checkpoint {checkpoint}"))?;
    gate.install(service)?;

    let app = crate::matchweb::build_match_router(gate);
    let addr = format!("{host}:{port}");
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid bind address {addr}"))?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!("HTTP server listening on http://{addr}");
        axum::serve(listener, app).await.context("server error")?;
        Ok::<(), anyhow::Error>(())
    })
}
