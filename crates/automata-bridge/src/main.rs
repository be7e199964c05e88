//! Entry point of the `automata` binary.
//!
//! One subcommand per account operation, a scripted `demo`, and the
//! long-running `bridge` that credits settlement-contract deposits.

use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy::{primitives::Address, providers::ProviderBuilder};
use anyhow::{Context, bail};
use automata_bridge::{
    AccountSession, HttpRollupRpc, ModifierSet, Operation, PlayerId, ProcessingKey,
    bridge::{BridgeConfig, ContractDeposits, CursorStore, DepositBridge},
    demo::{self, DEFAULT_WITHDRAW_ADDRESS, DemoPlan},
    service::Service,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "automata",
    version,
    about = "Command client and deposit bridge for the automata rollup"
)]
struct Cli {
    /// Rollup REST endpoint.
    #[arg(long, env = "ROLLUP_RPC_URL", default_value = "http://127.0.0.1:3000", global = true)]
    rpc_url: Url,

    /// Log level.
    #[arg(long, env = "AUTOMATA_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Log format: `json` or `text`.
    #[arg(long, env = "AUTOMATA_LOG_FORMAT", default_value = "text", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register the account with the rollup
    InstallPlayer(KeyArgs),
    /// Install an object with a modifier program
    InstallObject(ObjectArgs),
    /// Restart an object with a new modifier program
    RestartObject(ObjectArgs),
    /// Upgrade one feature of an object
    UpgradeObject {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long, default_value_t = 0)]
        object_id: u64,
        #[arg(long, default_value_t = 0)]
        feature: u64,
    },
    /// Install a new card
    InstallCard(KeyArgs),
    /// Withdraw tokens to an L1 address
    Withdraw {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        address: Address,
        #[arg(long)]
        amount: u32,
    },
    /// Credit tokens to a player (admin key only)
    Deposit(DepositArgs),
    /// Redeem a resource bounty
    Bounty {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        resource_index: u64,
    },
    /// Print the account state
    Query(KeyArgs),
    /// Print the player id and public key of a processing key
    PlayerId(KeyArgs),
    /// Run every operation in sequence against one account
    Demo(DemoArgs),
    /// Forward settlement-contract deposits into the rollup
    Bridge(BridgeArgs),
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Processing key of the account (hex).
    #[arg(long = "key", env = "PROCESSING_KEY")]
    key: ProcessingKey,
}

#[derive(Args, Debug)]
struct ObjectArgs {
    #[command(flatten)]
    key: KeyArgs,

    #[arg(long, default_value_t = 0)]
    object_id: u64,

    /// Comma-separated modifiers, at most eight.
    #[arg(long, default_value = "0,0,0,0,0,0,0,0")]
    modifiers: ModifierSet,
}

#[derive(Args, Debug)]
struct DepositArgs {
    /// Admin processing key.
    #[arg(long, env = "SERVER_ADMIN_KEY")]
    admin_key: ProcessingKey,

    /// Processing key of the recipient; its player id is derived locally.
    #[arg(long, conflicts_with_all = ["pid_hi", "pid_lo"])]
    player_key: Option<ProcessingKey>,

    #[arg(long, requires = "pid_lo")]
    pid_hi: Option<u64>,

    #[arg(long, requires = "pid_hi")]
    pid_lo: Option<u64>,

    /// Whole tokens to credit.
    #[arg(long)]
    amount: u64,
}

#[derive(Args, Debug)]
struct DemoArgs {
    #[arg(long = "key", env = "PROCESSING_KEY", default_value = "1234")]
    key: ProcessingKey,

    /// Admin key used to fund the account. The deposit step is skipped
    /// without one.
    #[arg(long, env = "SERVER_ADMIN_KEY")]
    admin_key: Option<ProcessingKey>,

    #[arg(long, default_value_t = 0)]
    object_id: u64,

    #[arg(long, default_value_t = 10)]
    deposit: u64,

    #[arg(long, default_value_t = DEFAULT_WITHDRAW_ADDRESS)]
    withdraw_to: Address,

    #[arg(long, default_value_t = 1)]
    withdraw_amount: u32,
}

#[derive(Args, Debug)]
struct BridgeArgs {
    /// Admin processing key that signs the deposits.
    #[arg(long, env = "SERVER_ADMIN_KEY")]
    admin_key: ProcessingKey,

    /// L1 RPC URL.
    #[arg(long, env = "RPC_PROVIDER")]
    rpc_provider: Url,

    /// Address of the settlement proxy emitting `TopUp`.
    #[arg(long, env = "SETTLEMENT_CONTRACT_ADDRESS")]
    settlement_contract_address: Address,

    /// Interval in ms to poll L1 for new blocks.
    #[arg(long, env = "BRIDGE_POLL_INTERVAL_MS", default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Maximum number of blocks per `eth_getLogs` call.
    #[arg(long, env = "BRIDGE_MAX_BLOCK_RANGE", default_value_t = 1000)]
    max_block_range: u64,

    /// First block to scan when no cursor is saved. Defaults to the next block.
    #[arg(long, env = "BRIDGE_START_BLOCK")]
    start_block: Option<u64>,

    /// JSON file holding the next block to scan across restarts.
    #[arg(long, env = "BRIDGE_CURSOR_FILE")]
    cursor_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, &cli.log_format);

    let rpc = Arc::new(HttpRollupRpc::new(&cli.rpc_url).context("failed to build rollup client")?);
    let session = |key: ProcessingKey| AccountSession::new(Arc::clone(&rpc), key);

    match cli.command {
        Commands::InstallPlayer(args) => {
            submit(&session(args.key), Operation::InstallPlayer).await
        }
        Commands::InstallObject(args) => {
            let ObjectArgs { key, object_id, modifiers } = args;
            submit(&session(key.key), Operation::InstallObject { object_id, modifiers }).await
        }
        Commands::RestartObject(args) => {
            let ObjectArgs { key, object_id, modifiers } = args;
            submit(&session(key.key), Operation::RestartObject { object_id, modifiers }).await
        }
        Commands::UpgradeObject { key, object_id, feature } => {
            submit(&session(key.key), Operation::UpgradeObject { object_id, feature }).await
        }
        Commands::InstallCard(args) => submit(&session(args.key), Operation::InstallCard).await,
        Commands::Withdraw { key, address, amount } => {
            submit(&session(key.key), Operation::Withdraw { address, amount }).await
        }
        Commands::Deposit(args) => {
            let player = recipient(&args)?;
            submit(&session(args.admin_key), Operation::Deposit { player, amount: args.amount })
                .await
        }
        Commands::Bounty { key, resource_index } => {
            submit(&session(key.key), Operation::Bounty { resource_index }).await
        }
        Commands::Query(args) => {
            let state = session(args.key).state().await.context("failed to query state")?;
            print_json(&state)
        }
        Commands::PlayerId(args) => {
            let pk = args.key.public_key()?;
            let pid = pk.player_id();
            print_json(&json!({ "hi": pid.hi, "lo": pid.lo, "pkx": pk.pkx_le_hex() }))
        }
        Commands::Demo(args) => {
            let plan = DemoPlan {
                object_id: args.object_id,
                deposit: args.deposit,
                withdraw_to: args.withdraw_to,
                withdraw_amount: args.withdraw_amount,
                ..DemoPlan::default()
            };
            let player = session(args.key);
            let admin = args.admin_key.map(session);
            let steps = demo::run_demo(&player, admin.as_ref(), &plan).await;

            let failed = steps.iter().filter(|s| !s.succeeded).count();
            info!(steps = steps.len(), failed, "demo finished");
            Ok(())
        }
        Commands::Bridge(args) => run_bridge(Arc::clone(&rpc), args).await,
    }
}

/// Runs `op` through the propagating path and prints the rollup's result.
async fn submit(session: &AccountSession<HttpRollupRpc>, op: Operation) -> anyhow::Result<()> {
    let result = session.submit(op).await?;
    print_json(&result)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn recipient(args: &DepositArgs) -> anyhow::Result<PlayerId> {
    match (&args.player_key, args.pid_hi, args.pid_lo) {
        (Some(key), _, _) => Ok(key.player_id()?),
        (None, Some(hi), Some(lo)) => Ok(PlayerId::new(hi, lo)),
        _ => bail!("either --player-key or both --pid-hi and --pid-lo are required"),
    }
}

async fn run_bridge(rpc: Arc<HttpRollupRpc>, args: BridgeArgs) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting deposit bridge");

    let provider = ProviderBuilder::new().connect_http(args.rpc_provider.clone());
    let source = ContractDeposits::new(provider, args.settlement_contract_address);
    let admin = AccountSession::new(rpc, args.admin_key);
    if admin.player_id().is_none() {
        bail!("SERVER_ADMIN_KEY is not a usable processing key");
    }

    let config = BridgeConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        max_block_range: args.max_block_range,
        start_block: args.start_block,
    };
    let mut bridge = DepositBridge::new(admin, source, config);
    if let Some(path) = args.cursor_file {
        bridge = bridge.with_cursor(CursorStore::new(path));
    }

    let services: Vec<Box<dyn Service>> = vec![Box::new(bridge)];
    let cancel = CancellationToken::new();
    let mut set = JoinSet::new();
    for svc in services {
        info!(name = svc.name(), "spawning service");
        svc.spawn(&mut set, cancel.clone());
    }

    await_shutdown(cancel, set).await;
    info!("deposit bridge shut down");
    Ok(())
}

/// Initialise `tracing` with the given level and format (`json` or `text`).
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(level: &str, format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

/// Wait for SIGINT / SIGTERM, cancel all tasks, and drain the join set.
async fn await_shutdown(cancel: CancellationToken, mut set: JoinSet<()>) {
    use tokio::signal;

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to register SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("received SIGTERM, shutting down");
        }
    }

    cancel.cancel();

    // Give the in-flight deposit 15 seconds to finish.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);

    loop {
        tokio::select! {
            result = set.join_next() => {
                match result {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "task panicked during shutdown");
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!("timeout waiting for tasks to shut down");
                set.abort_all();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_object_command() {
        let cli = Cli::try_parse_from([
            "automata",
            "install-object",
            "--key",
            "1234",
            "--object-id",
            "3",
            "--modifiers",
            "0,0,0,0,0,0,0,4",
        ])
        .unwrap();

        match cli.command {
            Commands::InstallObject(args) => {
                assert_eq!(args.object_id, 3);
                assert_eq!(args.modifiers.encode(), 4);
                assert_eq!(args.key.key, ProcessingKey::new("1234"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_nine_modifiers() {
        let res = Cli::try_parse_from([
            "automata",
            "restart-object",
            "--key",
            "1234",
            "--modifiers",
            "1,2,3,4,5,6,7,8,9",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn deposit_recipient_from_key_or_words() {
        let cli = Cli::try_parse_from([
            "automata",
            "deposit",
            "--admin-key",
            "1",
            "--player-key",
            "1234",
            "--amount",
            "10",
        ])
        .unwrap();
        let Commands::Deposit(args) = cli.command else { panic!("expected deposit") };
        assert_eq!(
            recipient(&args).unwrap(),
            PlayerId::new(842_671_162_104_160_002, 6_593_547_414_110_829_039)
        );

        let cli = Cli::try_parse_from([
            "automata",
            "deposit",
            "--admin-key",
            "1",
            "--pid-hi",
            "5",
            "--pid-lo",
            "6",
            "--amount",
            "10",
        ])
        .unwrap();
        let Commands::Deposit(args) = cli.command else { panic!("expected deposit") };
        assert_eq!(recipient(&args).unwrap(), PlayerId::new(5, 6));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
