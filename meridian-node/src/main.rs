//! Meridian sidechain node
//!
//! Usage:
//!   meridian start             - run the node (ledger + witness)
//!   meridian replay            - re-execute the stored chain and verify it
//!   meridian validate          - check chain integrity and exit
//!
//! `ACCOUNT` and `ACTIVE_SIGNING_KEY` in the environment enable witness
//! participation; without them only the ledger runs.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meridian_anchor::{AnchorSubmitter, RpcAnchorClient};
use meridian_core::crypto::keys::KeyPair;
use meridian_core::{NodeConfig, WitnessIdentity};
use meridian_executor::SmartContracts;
use meridian_ledger::{spawn_autosave, Blockchain};
use meridian_store::Database;
use meridian_witness::tcp::TcpPeerTransport;
use meridian_witness::Coordinator;

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Meridian sidechain node")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start,
    /// Re-execute the stored chain and verify every block hash
    Replay,
    /// Verify chain integrity and exit non-zero on failure
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        NodeConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
        NodeConfig::default()
    };

    match cli.command {
        Commands::Start => start(config).await,
        Commands::Replay => replay(config).await,
        Commands::Validate => validate(config).await,
    }
}

fn build_chain(config: &NodeConfig) -> Arc<Blockchain> {
    let db = Arc::new(Database::new());
    let executor = SmartContracts::new(db.clone(), config.vm_timeout_ms);
    Arc::new(Blockchain::new(
        config.chain_id.clone(),
        config.database_path(),
        db,
        executor,
    ))
}

async fn start(config: NodeConfig) -> Result<(), Box<dyn Error>> {
    let chain = build_chain(&config);
    chain.init().await?;
    info!(chain_id = %config.chain_id, blocks = chain.block_count(), "ledger ready");

    let autosave = spawn_autosave(chain.clone(), config.autosave_interval);

    // block production: drain the pending queue every few seconds
    let producer = {
        let chain = chain.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3));
            loop {
                interval.tick().await;
                if let Err(e) = chain.produce_block(Utc::now()).await {
                    warn!(error = %e, "block production failed");
                }
            }
        })
    };

    // witness participation is enabled by the environment
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut witness_task = None;
    let mut transport_handle = None;
    if let Some(identity) = WitnessIdentity::from_env() {
        let keys = KeyPair::from_secret_hex(&identity.signing_key_hex)?;
        let transport = Arc::new(TcpPeerTransport::new());
        let events = transport
            .take_event_receiver()
            .expect("fresh transport has a receiver");
        let bound = transport
            .start(&format!("0.0.0.0:{}", config.p2p_port))
            .await?;
        info!(account = %identity.account, address = %bound, "witness listener started");

        let anchor = Arc::new(RpcAnchorClient::new(config.stream_nodes.clone()));
        let submitter = AnchorSubmitter::new(anchor);
        let coordinator = Arc::new(Coordinator::new(
            identity.account,
            keys,
            config.chain_id.clone(),
            chain.database(),
            transport.clone(),
            submitter,
        ));
        witness_task = Some(tokio::spawn(
            coordinator.run(events, shutdown_rx.clone()),
        ));
        transport_handle = Some(transport);
    } else {
        info!("ACCOUNT / ACTIVE_SIGNING_KEY not set, witness participation disabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(task) = witness_task {
        let _ = task.await;
    }
    if let Some(transport) = transport_handle {
        transport.stop().await;
    }
    producer.abort();
    if let Some(task) = autosave {
        task.abort();
    }
    chain.save().await?;
    Ok(())
}

async fn replay(config: NodeConfig) -> Result<(), Box<dyn Error>> {
    let chain = build_chain(&config);
    chain.init().await?;
    let replayed = chain.replay().await?;
    info!(blocks = replayed, "replay verified");
    Ok(())
}

async fn validate(config: NodeConfig) -> Result<(), Box<dyn Error>> {
    let chain = build_chain(&config);
    chain.init().await?;
    if chain.is_chain_valid().await? {
        info!(blocks = chain.block_count(), "chain is valid");
        Ok(())
    } else {
        Err("chain integrity check failed".into())
    }
}
