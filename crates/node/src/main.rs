// node/src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use consensus::ReportOutcome;
use node::{NodeConfig, Protocol, Snapshot, SnapshotStore};
use staking_core::{Amount, Capability, MemoryLedger, RecordingDepositContract, RoleRegistry, Timestamp};
use staking_crypto::{Address, BlsPublicKey, BlsSignature, WithdrawalCredentials};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type LocalProtocol = Protocol<MemoryLedger, RoleRegistry, RecordingDepositContract>;

#[derive(Parser)]
#[command(name = "staking-node")]
#[command(about = "Liquid-staking protocol operator tool", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "./config.toml")]
    config: String,

    /// Override the current time (unix seconds)
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and a fresh state snapshot
    Init {
        /// Data directory
        #[arg(short, long)]
        data_dir: Option<String>,

        /// Replace an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Show protocol status
    Status,

    /// Stake funds and mint claim-token shares
    Stake {
        /// Staker address
        #[arg(long)]
        from: String,

        /// Amount in tokens, e.g. 1.5
        #[arg(short, long)]
        amount: String,
    },

    /// Register a validator key (node operator)
    AddValidator {
        #[arg(long)]
        operator: String,

        #[arg(long)]
        pubkey: String,

        #[arg(long)]
        signature: String,

        /// Defaults to the protocol withdrawal credentials
        #[arg(long)]
        credentials: Option<String>,
    },

    /// Vote to promote validators (oracle member)
    Activate {
        #[arg(long)]
        oracle: String,

        /// Validator public keys
        #[arg(long = "pubkey", required = true)]
        pubkeys: Vec<String>,
    },

    /// Submit an accounting report (oracle member)
    Report {
        #[arg(long)]
        oracle: String,

        /// Total remote balance in tokens
        #[arg(long)]
        value: String,

        /// Observed validator count
        #[arg(long)]
        validators: u64,

        /// Defaults to the live nonce
        #[arg(long)]
        nonce: Option<u64>,
    },

    /// Commit 32 tokens to an ACTIVE validator
    Deposit {
        #[arg(long)]
        pubkey: String,
    },

    /// Oracle membership (governor)
    Member {
        #[command(subcommand)]
        command: MemberCommands,
    },

    /// Update quorum thresholds (governor)
    Quorum {
        #[arg(long)]
        governor: String,

        #[arg(long)]
        report: Option<u32>,

        #[arg(long)]
        validator: Option<u32>,
    },
}

#[derive(Subcommand)]
enum MemberCommands {
    /// Add an oracle member
    Add {
        #[arg(long)]
        governor: String,

        #[arg(long)]
        address: String,
    },

    /// Remove an oracle member
    Remove {
        #[arg(long)]
        governor: String,

        #[arg(long)]
        address: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let now = cli.now.unwrap_or_else(current_timestamp);

    if let Commands::Init { data_dir, force } = &cli.command {
        return init_node(&cli.config, data_dir.clone(), *force);
    }

    let config = NodeConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config))?;
    let store = SnapshotStore::new(config.snapshot_path());
    let mut protocol = store.load()
        .context("loading snapshot; run `init` first")?
        .into_protocol();

    match cli.command {
        Commands::Init { .. } => anyhow::bail!("init runs before a snapshot is loaded"),
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&protocol.status())?);
            return Ok(());
        }
        Commands::Stake { from, amount } => {
            let amount = Amount::parse_tokens(&amount)?;
            let receipt = protocol.stake(Address::from_hex(&from)?, amount)?;
            tracing::info!(
                "Minted {} shares to {} at price {}",
                receipt.shares.format_tokens(),
                receipt.staker,
                receipt.price
            );
        }
        Commands::AddValidator { operator, pubkey, signature, credentials } => {
            let credentials = match credentials {
                Some(hex) => WithdrawalCredentials::from_hex(&hex)?,
                None => *protocol.withdrawal_credentials(),
            };
            let index = protocol.add_validator(
                &Address::from_hex(&operator)?,
                BlsPublicKey::from_hex(&pubkey)?,
                BlsSignature::from_hex(&signature)?,
                credentials,
                now,
            )?;
            tracing::info!("Validator registered at index {}", index);
        }
        Commands::Activate { oracle, pubkeys } => {
            let pubkeys = pubkeys.iter()
                .map(|k| BlsPublicKey::from_hex(k))
                .collect::<Result<Vec<_>, _>>()?;
            let outcome = protocol.activate_validators(&Address::from_hex(&oracle)?, &pubkeys, now)?;
            for (pubkey, state) in &outcome.advanced {
                tracing::info!("{} -> {}", pubkey, state);
            }
            tracing::info!(
                "{} voted, {} advanced, {} skipped",
                outcome.voted.len(),
                outcome.advanced.len(),
                outcome.skipped.len()
            );
        }
        Commands::Report { oracle, value, validators, nonce } => {
            let nonce = nonce.unwrap_or_else(|| protocol.current_nonce());
            let value = Amount::parse_tokens(&value)?;
            let receipt = protocol.submit_report(&Address::from_hex(&oracle)?, value, nonce, validators, now)?;
            match receipt.settlement {
                Some(settlement) => {
                    let seconds_per_epoch = protocol.beacon_schedule().seconds_per_epoch();
                    tracing::info!(
                        "Nonce {} finalized: delta {}, price {} -> {}",
                        nonce,
                        settlement.delta,
                        settlement.price_before,
                        settlement.price_after
                    );
                    if let Some(rate) = settlement.annualized_rate(seconds_per_epoch) {
                        tracing::info!("Annualized rate: {}%", (rate * rust_decimal::Decimal::from(100)).round_dp(2));
                    }
                }
                None => tracing::info!("Vote recorded: {:?}", receipt.outcome),
            }
        }
        Commands::Deposit { pubkey } => {
            let receipt = protocol.deposit_to_eth2(&BlsPublicKey::from_hex(&pubkey)?, now)?;
            tracing::info!("Deposit #{} submitted", receipt.deposit_index);
        }
        Commands::Member { command } => match command {
            MemberCommands::Add { governor, address } => {
                protocol.add_oracle_member(&Address::from_hex(&governor)?, Address::from_hex(&address)?)?;
            }
            MemberCommands::Remove { governor, address } => {
                protocol.remove_oracle_member(&Address::from_hex(&governor)?, &Address::from_hex(&address)?)?;
            }
        },
        Commands::Quorum { governor, report, validator } => {
            let governor = Address::from_hex(&governor)?;
            if report.is_none() && validator.is_none() {
                anyhow::bail!("nothing to update: pass --report and/or --validator");
            }
            if let Some(quorum) = report {
                if let Some(receipt) = protocol.update_report_quorum(&governor, quorum, now)? {
                    if let ReportOutcome::QuorumReached(report) = receipt.outcome {
                        tracing::info!("Lowered quorum finalized nonce {}", report.nonce);
                    }
                }
            }
            if let Some(quorum) = validator {
                protocol.update_validator_quorum(&governor, quorum)?;
            }
        }
    }

    store.save(&Snapshot::from_protocol(protocol))?;
    Ok(())
}

fn init_node(config_path: &str, data_dir: Option<String>, force: bool) -> anyhow::Result<()> {
    let mut config = if std::path::Path::new(config_path).exists() {
        tracing::info!("Using existing configuration at {}", config_path);
        NodeConfig::from_file(config_path)?
    } else {
        NodeConfig::default()
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }

    std::fs::create_dir_all(&config.data_dir)?;
    config.to_file(config_path)?;

    let store = SnapshotStore::new(config.snapshot_path());
    if store.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to replace it", store.path().display());
    }

    let protocol: LocalProtocol = Protocol::from_config(
        &config,
        MemoryLedger::new(),
        role_registry(&config)?,
        RecordingDepositContract::new(),
    )?;
    store.save(&Snapshot::from_protocol(protocol))?;

    tracing::info!("Protocol initialized at {}", config.data_dir);
    tracing::info!("Edit {} to configure the protocol", config_path);
    Ok(())
}

fn role_registry(config: &NodeConfig) -> anyhow::Result<RoleRegistry> {
    let roles = &config.roles;
    let mut registry = RoleRegistry::with_governor(roles.governor()?);
    registry.grant(roles.key_admin()?, Capability::KeyAdmin);
    for operator in roles.node_operators()? {
        registry.grant(operator, Capability::NodeOperator);
    }
    Ok(registry)
}

fn current_timestamp() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as Timestamp
}
