use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use omen::aws::Signer;
use omen::bedrock::client::BedrockClient;
use omen::bedrock::models::ModelCache;
use omen::config::{CliOverrides, Config};
use omen::http_client::{HttpClient, RetryPolicy};
use omen::orchestrator::Orchestrator;
use omen::server::{AppState, Server};

#[derive(Parser)]
#[command(name = "omen")]
#[command(about = "OMEN - OpenAI-to-Bedrock reverse proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<String>,
        /// Bind address override
        #[arg(short, long)]
        bind: Option<String>,
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    omen::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, bind, port } => {
            let config = Config::load(
                config.as_deref(),
                CliOverrides {
                    listen_host: bind,
                    listen_port: port,
                },
            )?;

            info!(version = env!("CARGO_PKG_VERSION"), "starting omen");

            let signer = Signer::new(
                &config.aws_access_key_id,
                &config.aws_secret_access_key,
                config.aws_session_token.as_deref(),
                &config.aws_region,
            );
            let http = HttpClient::new(RetryPolicy::default())?;
            let client = BedrockClient::new(http, signer, config.aws_region.clone());
            let models = Arc::new(ModelCache::new(
                client.clone(),
                Duration::from_secs(config.model_cache_ttl_seconds),
                Duration::from_secs(config.models_timeout_seconds),
            ));
            let orchestrator = Arc::new(Orchestrator::new(
                Arc::clone(&models),
                client,
                Duration::from_secs(config.request_timeout_seconds),
            ));

            let state = AppState { models, orchestrator };
            Server::new(config, state).run().await?;
        }
    }

    Ok(())
}
