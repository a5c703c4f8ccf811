//! Shroud CLI - inspect curves, split secrets and simulate a cluster
//!
//! Everything runs locally; `simulate` drives an in-process cluster over an
//! in-memory log instead of a replication engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shroud_core::{BigUint, CommitmentKind, Share, Shareholder};
use shroud_vss::cluster::{LocalCluster, DEFAULT_RUN_LIMIT};
use shroud_vss::keys::StaticKeyDirectory;
use shroud_vss::{ConfidentialityScheme, RoundOutcome, SchemeConfig, SharingMode};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shroud")]
#[command(about = "Verifiable secret sharing for BFT replicated services", long_about = None)]
#[command(version)]
struct Cli {
    /// Scheme configuration (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the commitment family
    #[arg(long, global = true, value_enum)]
    vss: Option<VssArg>,

    /// Override the current curve
    #[arg(long, global = true)]
    curve: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum VssArg {
    Linear,
    EllipticCurve,
    Constant,
}

impl From<VssArg> for CommitmentKind {
    fn from(arg: VssArg) -> Self {
        match arg {
            VssArg::Linear => CommitmentKind::Linear,
            VssArg::EllipticCurve => CommitmentKind::EllipticCurve,
            VssArg::Constant => CommitmentKind::Constant,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List registered elliptic curves
    Curves,

    /// Split a secret and print one verifiable share per replica
    Share {
        /// Secret (hex)
        #[arg(short, long)]
        secret: String,

        /// Number of replicas
        #[arg(short, long, default_value_t = 4)]
        replicas: u32,

        /// Faults tolerated
        #[arg(short, long, default_value_t = 1)]
        threshold: usize,

        /// Split secrets wider than one field element into chunks
        #[arg(long)]
        large: bool,
    },

    /// Run key generation and a recovery on a local cluster
    Simulate {
        /// Number of replicas
        #[arg(short, long, default_value_t = 4)]
        replicas: usize,

        /// Faults tolerated
        #[arg(short, long, default_value_t = 1)]
        threshold: usize,

        /// Secrets to deal before recovering
        #[arg(long, default_value_t = 2)]
        secrets: u32,

        /// Replica to recover
        #[arg(long)]
        recover: Option<u32>,
    },

    /// Write the effective configuration as JSON
    Config {
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<SchemeConfig> {
    let mut config = match &cli.config {
        Some(path) => SchemeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SchemeConfig::simulation(CommitmentKind::Linear),
    };
    if let Some(vss) = cli.vss {
        config.vss = vss.into();
    }
    if let Some(curve) = &cli.curve {
        config.curve = curve.clone();
    }
    Ok(config)
}

fn local_scheme(config: &SchemeConfig, replicas: u32, threshold: usize) -> Result<ConfidentialityScheme> {
    let members: Vec<u32> = (0..replicas).collect();
    let keys = Arc::new(StaticKeyDirectory::new(b"shroud-cli", 0, &members)?);
    Ok(ConfidentialityScheme::new(config, &members, threshold, keys)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shroud=info,shroud_vss=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Curves => handle_curves(&config),
        Commands::Share {
            secret,
            replicas,
            threshold,
            large,
        } => handle_share(&config, &secret, replicas, threshold, large),
        Commands::Simulate {
            replicas,
            threshold,
            secrets,
            recover,
        } => handle_simulate(&config, replicas, threshold, secrets, recover).await,
        Commands::Config { output } => {
            config.save(&output)?;
            println!("✓ Configuration written to {}", output.display());
            Ok(())
        }
    }
}

fn handle_curves(config: &SchemeConfig) -> Result<()> {
    let scheme = local_scheme(config, 3, 1)?;
    let current = scheme.current_elliptic_curve();
    println!("Registered curves:");
    for name in scheme.curve_names() {
        let Some(curve) = scheme.elliptic_curve(&name) else {
            continue;
        };
        let marker = if name == current.name() { "*" } else { " " };
        println!(
            " {marker} {name:<12} order {} bits, cofactor {}",
            curve.order().bits(),
            curve.parameters().cofactor
        );
    }
    Ok(())
}

fn handle_share(
    config: &SchemeConfig,
    secret: &str,
    replicas: u32,
    threshold: usize,
    large: bool,
) -> Result<()> {
    let secret = hex::decode(secret.trim_start_matches("0x")).context("secret must be hex")?;
    let scheme = local_scheme(config, replicas, threshold)?;
    let mode = if large {
        SharingMode::LargeSecret
    } else {
        SharingMode::Single
    };
    let shared = scheme.share_bytes(&secret, mode)?;

    println!(
        "Shared {} bytes as {} chunk(s), {} vss, threshold {}",
        shared.secret_len,
        shared.chunks.len(),
        scheme.vss_kind(),
        threshold
    );
    for replica in 0..replicas {
        let holder = Shareholder::for_replica(replica)?;
        println!("\nReplica {replica} (shareholder {holder}):");
        for share in shared.shares_for(holder) {
            println!("  {}", hex::encode(share.to_bytes()?));
        }
    }

    let quorum: Vec<Vec<Share>> = shared
        .chunks
        .iter()
        .map(|chunk| chunk.iter().take(threshold + 1).map(|s| s.share().clone()).collect())
        .collect();
    let rebuilt = scheme.combine_bytes(shared.secret_len, shared.chunk_len, &quorum)?;
    anyhow::ensure!(rebuilt == secret, "reconstruction check failed");
    println!("\n✓ Any {} shares reconstruct the secret", threshold + 1);
    Ok(())
}

async fn handle_simulate(
    config: &SchemeConfig,
    replicas: usize,
    threshold: usize,
    secrets: u32,
    recover: Option<u32>,
) -> Result<()> {
    let mut cluster = LocalCluster::new(replicas, threshold, config)?;
    info!(replicas, threshold, "cluster ready");

    let handles = cluster.start_random_key_round(&config.curve)?;
    let delivered = cluster.run(DEFAULT_RUN_LIMIT)?;
    println!("Key generation: {delivered} log entries ordered");

    let mut public_key = None;
    for (replica, handle) in handles.into_iter().enumerate() {
        match handle.outcome().await {
            RoundOutcome::Completed(output) => {
                let key = output.public_key().context("round produced no public key")?;
                if let Some(previous) = &public_key {
                    anyhow::ensure!(previous == &key, "replicas disagree on the public key");
                }
                println!(
                    "  replica {replica}: contributors {:?}, share verified",
                    output.contributors
                );
                public_key = Some(key);
            }
            other => anyhow::bail!("replica {replica} round ended as {other:?}"),
        }
    }
    if let Some(key) = &public_key {
        println!("✓ Public key: {}", hex::encode(key));
    }

    cluster.set_plain_state(b"simulated application state");
    let mut dealt = Vec::new();
    for i in 0..secrets {
        let secret = BigUint::from(0x5eed_0000u32 + i);
        cluster.share_secret(&secret)?;
        dealt.push(secret);
    }
    cluster.advance(50)?;
    cluster.checkpoint();
    cluster.advance(50)?;

    let target = recover.unwrap_or(replicas.saturating_sub(1) as u32);
    let before = cluster.replica(target)?.snapshot();
    cluster.replica(target)?.wipe();
    let installed = cluster.recover(target)?;
    println!(
        "\nRecovered replica {target}: {} shares, checkpoint {}, resuming after {}",
        installed.snapshot.shares.len(),
        installed.last_checkpoint_cid,
        installed.last_cid
    );

    for (index, secret) in dealt.iter().enumerate() {
        let rebuilt = cluster.reconstruct(index)?;
        anyhow::ensure!(&rebuilt == secret, "secret {index} changed during recovery");
        let changed = before.shares.get(index).map(|s| s.share().value())
            != installed.snapshot.shares.get(index).map(|s| s.share().value());
        println!("  secret {index}: intact, share refreshed: {changed}");
    }
    println!("✓ Simulation complete");
    Ok(())
}
