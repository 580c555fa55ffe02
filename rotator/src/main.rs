use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use owner_rotation::{
    address::checksummed,
    config::{load_key_file, DEFAULT_GAS_LIMIT, DEFAULT_RPC_URL},
    gate::{evaluate, require_verified},
    resolver::OwnerRegistry,
    rpc::EthersChain,
    AgentSigner, ExecutionStrategy, GateDecision, PipelineConfig, RotationConfig,
    RotationPipeline, RotationRequest, RotationResponse, Turn, TxSigner,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Rotate the human co-owner of a Safe to a new address, signed by the agent co-owner.
///
/// Every command prints a JSON document on stdout; logs go to stderr (`RUST_LOG` controls them).
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON-RPC endpoint of the chain the Safe lives on.
    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: String,

    /// Safe address. Defaults to the built-in wallet.
    #[arg(long, env = "SAFE_ADDRESS", global = true)]
    safe: Option<String>,

    /// `safe-exec` (execTransaction) or `direct-call` (swapOwner from the agent account).
    #[arg(long, env = "EXECUTION_STRATEGY", default_value_t = ExecutionStrategy::SafeExec, global = true)]
    strategy: ExecutionStrategy,

    /// Gas limit of the outer transaction.
    #[arg(long, env = "GAS_LIMIT", default_value_t = DEFAULT_GAS_LIMIT, global = true)]
    gas_limit: u64,

    /// Per-request RPC timeout in seconds.
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 30, global = true)]
    rpc_timeout_secs: u64,

    /// Path to a JSON key file (`{"private_key": "0x..", "address": "0x.."}`).
    #[arg(long, env = "PRIV_KEY_PATH", conflicts_with = "private_key", global = true)]
    private_key_path: Option<PathBuf>,

    /// Agent private key (hex string, 0x...).
    #[arg(
        long,
        env = "PKEY",
        hide_env_values = true,
        conflicts_with = "private_key_path",
        global = true
    )]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the human owner with `--new-address`.
    Switch {
        #[arg(long)]
        new_address: String,

        /// Conversation transcript (JSON array of `{role, text}`); gates the rotation when given.
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Stop after simulation; nothing is signed or broadcast.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the current owner set, wallet nonce and threshold.
    Owners,
    /// Evaluate the verification gate over a transcript. Exits non-zero when unauthorized.
    Gate { transcript: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded; errors are reserved for setup problems.
async fn run(cli: &Cli) -> Result<bool> {
    let config = rotation_config(cli)?;

    match &cli.command {
        Command::Switch {
            new_address,
            transcript,
            dry_run,
        } => {
            let conversation = transcript.as_deref().map(read_transcript).transpose()?;
            let chain = EthersChain::new(&config.rpc_url, config.rpc_timeout)?;
            let pipeline = RotationPipeline::new(chain, load_signer(cli)?, config.pipeline);
            info!(
                safe = %config.pipeline.safe,
                agent = %pipeline.agent(),
                strategy = %config.pipeline.strategy,
                "starting owner rotation"
            );

            let (output, ok) = if *dry_run {
                dry_run_switch(&pipeline, new_address, conversation.as_deref()).await
            } else {
                let request = RotationRequest {
                    new_address: new_address.clone(),
                    conversation,
                };
                let response = pipeline.handle(&request).await;
                let ok = response.is_success();
                (stamped(&response)?, ok)
            };
            print_json(&output)?;
            Ok(ok)
        }
        Command::Owners => {
            let chain = EthersChain::new(&config.rpc_url, config.rpc_timeout)?;
            let registry = OwnerRegistry::new(&chain, config.pipeline.safe);
            let owners = registry.owners().await?;
            let nonce = registry.wallet_nonce().await?;
            let threshold = registry.threshold().await?;
            print_json(&json!({
                "safe": checksummed(config.pipeline.safe),
                "owners": owners.into_iter().map(checksummed).collect::<Vec<_>>(),
                "nonce": nonce.to_string(),
                "threshold": threshold.to_string(),
            }))?;
            Ok(true)
        }
        Command::Gate { transcript } => {
            let turns = read_transcript(transcript)?;
            let decision = evaluate(&turns);
            print_json(&json!({
                "decision": match decision {
                    GateDecision::Authorized => "authorized",
                    GateDecision::Unauthorized => "unauthorized",
                },
                "turns": turns.len(),
            }))?;
            Ok(decision == GateDecision::Authorized)
        }
    }
}

async fn dry_run_switch<S: TxSigner>(
    pipeline: &RotationPipeline<EthersChain, S>,
    new_address: &str,
    conversation: Option<&[Turn]>,
) -> (Value, bool) {
    if let Some(turns) = conversation {
        if let Err(err) = require_verified(turns) {
            return (json!(RotationResponse::failed(&err)), false);
        }
    }
    match pipeline.plan(new_address).await {
        Ok(planned) => (
            json!({
                "message": "Simulation succeeded; nothing was sent.",
                "strategy": planned.envelope.strategy.to_string(),
                "prev_owner": checksummed(planned.swap.predecessor),
                "old_owner": checksummed(planned.swap.outgoing),
                "new_owner": checksummed(planned.swap.incoming),
                "nonce": planned.envelope.tx.nonce.to_string(),
                "hash": planned.envelope.hash.to_string(),
            }),
            true,
        ),
        Err(err) => (json!(RotationResponse::failed(&err)), false),
    }
}

fn rotation_config(cli: &Cli) -> Result<RotationConfig> {
    let mut config = RotationConfig {
        rpc_url: cli.rpc_url.clone(),
        rpc_timeout: Duration::from_secs(cli.rpc_timeout_secs),
        ..RotationConfig::default()
    };
    if let Some(ref safe) = cli.safe {
        config = config.with_safe(safe)?;
    }
    config.pipeline = PipelineConfig {
        strategy: cli.strategy,
        gas_limit: cli.gas_limit,
        ..config.pipeline
    };
    Ok(config)
}

fn load_signer(cli: &Cli) -> Result<AgentSigner> {
    if let Some(ref path) = cli.private_key_path {
        Ok(load_key_file(path)?)
    } else if let Some(ref pk) = cli.private_key {
        Ok(AgentSigner::from_hex(&SecretString::from(pk.as_str()))?)
    } else {
        Err(anyhow!(
            "missing agent key: provide --private-key-path or --private-key (or set PRIV_KEY_PATH/PKEY)"
        ))
    }
}

fn read_transcript(path: &Path) -> Result<Vec<Turn>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing transcript JSON in {}", path.display()))
}

fn stamped(response: &RotationResponse) -> Result<Value> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    let mut value = serde_json::to_value(response).context("failed serialising response")?;
    value["submitted_at"] = json!(now);
    Ok(value)
}

fn print_json(value: &Value) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed serialising output")?;
    println!("{out}");
    Ok(())
}
