mod adapters;
mod config;
mod error;
mod execution;
mod models;
mod reconcile;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::{EthereumClient, HeimdallClient, SubgraphClient};
use crate::config::Config;
use crate::execution::{HeimdallCliConfig, HeimdallCliSubmitter};
use crate::reconcile::{Reconciler, ReconcilerConfig};

#[derive(Parser)]
#[command(
    name = "stake-nonce-sync",
    about = "Relays missing validator stake updates from Ethereum to Heimdall"
)]
struct Cli {
    /// Validator id to keep in sync
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    validator_id: u64,

    /// Load configuration from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log the heimdallcli command instead of running it
    #[arg(long)]
    dry_run: bool,
}

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,stake_nonce_sync=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing();

    if let Err(e) = run(cli).await {
        error!("💥 {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("🚀 Starting stake nonce sync for validator {}", cli.validator_id);

    // Load configuration
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Error loading env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    let config = Config::from_env().context("Error loading configuration")?;

    let ethereum = Arc::new(EthereumClient::new(
        &config.ethereum_rpc_url,
        Duration::from_secs(config.ethereum_rpc_timeout_secs),
    )?);
    let chain_id = ethereum
        .chain_id()
        .await
        .with_context(|| format!("Ethereum RPC {} unreachable", config.ethereum_rpc_url))?;
    info!("✅ Connected to Ethereum RPC (chain id {})", chain_id);

    let subgraph = Arc::new(SubgraphClient::new(
        config.polygon_sub_graph_url.clone(),
        Duration::from_secs(config.graph_timeout_secs),
    )?);
    let heimdall = Arc::new(HeimdallClient::new(
        &config.heimdall_rest_url,
        Duration::from_secs(config.heimdall_timeout_secs),
    )?);

    let dry_run = cli.dry_run || config.dry_run;
    let submitter = Arc::new(HeimdallCliSubmitter::new(HeimdallCliConfig {
        program: config.heimdallcli_path.clone(),
        timeout: Duration::from_secs(config.signer_timeout_secs),
        dry_run,
    }));
    if dry_run {
        info!("⚠️  Dry run enabled - stake updates will only be logged");
    }

    let mut reconciler = Reconciler::new(
        ReconcilerConfig {
            validator_id: cli.validator_id,
            chain_id: config.heimdall_chain_id.clone(),
            poll_interval: config.poll_interval(),
            retry_delay: config.retry_delay(),
            min_block_age: config.min_block_age(),
            source_nonce_policy: config.source_nonce_policy,
        },
        subgraph,
        heimdall,
        ethereum,
        submitter,
    );

    let source_nonce = reconciler
        .resolve_source_nonce()
        .await
        .with_context(|| format!("Error getting ethereum nonce for validator {}", cli.validator_id))?;
    info!("✅ Ethereum nonce for validator {}: {}", cli.validator_id, source_nonce);

    reconciler.run().await;

    Ok(())
}
