use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollapp_link::config::expand_path;
use rollapp_link::{
    ChainEndpoint, Discovery, EndpointResolver, LinkError, Orchestrator, OrchestratorConfig, OrchestratorMetrics,
    TxOutcome, WhitelistRequest,
};

#[derive(Parser)]
#[command(name = "rollapp-link")]
#[command(about = "Establish and maintain IBC links between a RollApp and its Hub")]
#[command(version)]
pub struct Cli {
    /// Configuration file path (defaults to ~/.roller/rollapp-link.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create clients, connection and channel for a path
    Establish {
        #[arg(long)]
        path: String,
    },
    /// Look for an already-open link and record it
    Discover {
        #[arg(long)]
        path: String,
    },
    /// Reuse an open link or establish a new one
    Ensure {
        #[arg(long)]
        path: String,
    },
    /// Show the stored link status
    Status {
        #[arg(long)]
        path: String,
    },
    /// Whitelist a relayer on the Hub and wait for it to reach the RollApp
    Whitelist {
        #[arg(long)]
        sequencer: String,
        #[arg(long)]
        operator: String,
        #[arg(long)]
        relayer: String,
        /// Configured Hub chain name
        #[arg(long, default_value = "hub")]
        hub: String,
        /// Configured RollApp chain name
        #[arg(long, default_value = "rollapp")]
        rollapp: String,
    },
    /// Wait for a transaction to be committed
    AwaitTx {
        /// Configured chain name
        #[arg(long)]
        chain: String,
        #[arg(long)]
        hash: String,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
}

/// Asks the operator for another RPC endpoint on stdin.
struct StdinEndpointPrompt;

#[async_trait]
impl EndpointResolver for StdinEndpointPrompt {
    async fn resolve_alternate_endpoint(&self, chain: &ChainEndpoint) -> Result<Option<String>, LinkError> {
        let mut stdout = tokio::io::stdout();
        let prompt = format!(
            "RPC endpoint {} for {} is not responding. Enter another endpoint (empty to abort): ",
            chain.rpc_url, chain.chain_id
        );
        stdout
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| LinkError::InvalidInput(e.to_string()))?;
        stdout.flush().await.map_err(|e| LinkError::InvalidInput(e.to_string()))?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| LinkError::InvalidInput(e.to_string()))?;

        let endpoint = line.trim();
        Ok(if endpoint.is_empty() {
            None
        } else {
            Some(endpoint.to_string())
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = match &cli.config {
        Some(path) => expand_path(path),
        None => OrchestratorConfig::default_path()?,
    };
    let config = OrchestratorConfig::load(&config_file)
        .with_context(|| format!("loading {}", config_file.display()))?;

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| config.global.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rollapp_link={level},progress={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Loaded configuration from: {}", config_file.display());

    let metrics = Arc::new(OrchestratorMetrics::new()?);
    let orchestrator = Orchestrator::from_config(
        config,
        &config_file,
        Arc::new(StdinEndpointPrompt),
        Some(metrics.clone()),
    )?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling (press Ctrl-C again to exit immediately)");
            ctrl_c.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let result = run(&cli.command, &orchestrator, &cancel).await;
    if cli.print_metrics {
        print!("{}", metrics.render());
    }
    result
}

async fn run(command: &Commands, orchestrator: &Orchestrator, cancel: &CancellationToken) -> anyhow::Result<()> {
    match command {
        Commands::Establish { path } => {
            let link = until_cancelled(cancel, orchestrator.establish_link(path)).await?;
            println!("{}", link.status_line());
        }
        Commands::Discover { path } => match until_cancelled(cancel, orchestrator.refresh_link(path)).await? {
            Discovery::Found(link) => println!("{}", link.status_line()),
            Discovery::NotFound(reason) => println!("No open link for {}: {}", path, reason),
        },
        Commands::Ensure { path } => {
            let link = until_cancelled(cancel, orchestrator.ensure_link(path)).await?;
            println!("{}", link.status_line());
        }
        Commands::Status { path } => {
            println!("{}", orchestrator.link_status(path).await?);
        }
        Commands::Whitelist {
            sequencer,
            operator,
            relayer,
            hub,
            rollapp,
        } => {
            let request = WhitelistRequest {
                sequencer_address: sequencer.clone(),
                operator_address: operator.clone(),
                relayer_address: relayer.clone(),
            };
            until_cancelled(cancel, orchestrator.ensure_whitelisted(&request, hub, rollapp, cancel)).await?;
            println!("Relayer {} whitelisted and propagated", relayer);
        }
        Commands::AwaitTx {
            chain,
            hash,
            deadline_secs,
        } => {
            let deadline = deadline_secs.map(Duration::from_secs);
            match orchestrator.await_committed(chain, hash, deadline, cancel).await? {
                TxOutcome::Success { gas_wanted, gas_used } => {
                    println!("Transaction succeeded. Gas wanted: {}, Gas used: {}", gas_wanted, gas_used)
                }
                TxOutcome::Failure { code, log } => anyhow::bail!("transaction failed with code {}: {}", code, log),
                TxOutcome::Timeout => anyhow::bail!("transaction not committed before the deadline"),
                TxOutcome::Cancelled => anyhow::bail!("cancelled"),
            }
        }
    }
    Ok(())
}

/// Run a non-cancellable operation, abandoning it when the token fires.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, LinkError>>,
) -> Result<T, LinkError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(LinkError::Cancelled),
        result = operation => result,
    }
}
