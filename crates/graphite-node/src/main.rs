//! Graphite node binary.
//!
//! Subcommands: `node` runs a full node, `mine` runs a networkless miner,
//! `verify` checks a serialized proof, `bench` times the mining pipeline.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use graphite_chain::params::MIN_BITS;
use graphite_network::NetworkConfig;
use graphite_pow::{
    trim, CycleFinder, Edge, EdgeGenerator, GraphParams, Proof, Verifier, VerifyConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::{parse_reward_pubkey, MiningSettings, NodeConfig};

/// The Graphite proof-of-work blockchain node.
#[derive(Parser, Debug)]
#[command(name = "graphite-node", version, about, long_about = None)]
struct Cli {
    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full node.
    Node {
        /// Chainstate directory.
        #[arg(short, long, default_value = "graphite-data")]
        data_dir: PathBuf,

        /// P2P listen address.
        #[arg(long, default_value = "0.0.0.0:28444")]
        listen: SocketAddr,

        /// Peers to dial at startup.
        #[arg(long)]
        connect: Vec<SocketAddr>,

        /// Network id exchanged in handshakes.
        #[arg(long, default_value = "graphite-main")]
        network_id: String,

        /// Mine while running.
        #[arg(long)]
        mine: bool,

        /// Mining threads (0 = one per CPU).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Hex ed25519 pubkey receiving block rewards.
        #[arg(long)]
        reward_key: Option<String>,
    },
    /// Mine against a local chainstate, no networking.
    Mine {
        /// Chainstate directory.
        #[arg(short, long, default_value = "graphite-data")]
        data_dir: PathBuf,

        /// Mining threads (0 = one per CPU).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Hex ed25519 pubkey receiving block rewards.
        #[arg(long)]
        reward_key: Option<String>,
    },
    /// Verify a serialized proof.
    Verify {
        /// File holding the 120-byte proof, hex-encoded.
        proof: PathBuf,

        /// Height the proof claims; selects the graph parameter epoch.
        #[arg(long, default_value = "0")]
        height: u64,

        /// Check cycle structure only, via partial replay.
        #[arg(long)]
        cycle_only: bool,
    },
    /// Time edge generation, trimming and cycle search.
    Bench {
        /// Nonces to run.
        #[arg(long, default_value = "5")]
        nonces: u64,

        /// Use small test-size graphs instead of epoch-0 parameters.
        #[arg(long)]
        small: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("unknown log level: {}", other),
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Node {
            data_dir,
            listen,
            connect,
            network_id,
            mine,
            threads,
            reward_key,
        } => {
            let reward_pubkey = reward_key
                .as_deref()
                .map(parse_reward_pubkey)
                .transpose()
                .context("invalid --reward-key")?;
            let config = NodeConfig {
                data_dir,
                network: NetworkConfig {
                    listen_addr: listen,
                    network_id,
                    ..NetworkConfig::default()
                },
                connect,
                mining: MiningSettings {
                    enabled: mine,
                    threads,
                    reward_pubkey,
                },
            };
            node::run_node(config).await
        }
        Command::Mine {
            data_dir,
            threads,
            reward_key,
        } => {
            let reward_pubkey = reward_key
                .as_deref()
                .map(parse_reward_pubkey)
                .transpose()
                .context("invalid --reward-key")?;
            let config = NodeConfig {
                data_dir,
                network: NetworkConfig::default(),
                connect: Vec::new(),
                mining: MiningSettings {
                    enabled: true,
                    threads,
                    reward_pubkey,
                },
            };
            node::run_miner_only(config).await
        }
        Command::Verify {
            proof,
            height,
            cycle_only,
        } => verify_proof_file(&proof, height, cycle_only),
        Command::Bench { nonces, small } => {
            bench(nonces, small);
            Ok(())
        }
    }
}

fn verify_proof_file(path: &PathBuf, height: u64, cycle_only: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let bytes = hex::decode(text.trim()).context("proof file is not hex")?;
    let proof = Proof::deserialize(&bytes)?;

    let verifier = Verifier::new(VerifyConfig {
        params: GraphParams::for_height(height),
        expected_bits: None,
        min_bits: MIN_BITS,
    });
    let result = if cycle_only {
        verifier.verify_cycle_only(&proof)
    } else {
        verifier.verify(&proof)
    };
    match result {
        Ok(()) => {
            println!("proof valid");
            Ok(())
        }
        Err(e) => bail!("proof invalid: {}", e),
    }
}

fn bench(nonces: u64, small: bool) {
    let params = if small {
        GraphParams::custom(65_536, 4096, 8, 60).expect("bench params")
    } else {
        GraphParams::for_epoch(0)
    };
    info!(
        edges = params.num_edges,
        scratchpad = params.scratchpad_bytes,
        matrix = params.matrix_dim,
        rounds = params.trim_rounds,
        "bench parameters"
    );

    let mut generator = EdgeGenerator::new(params.clone());
    let header = [0u8; graphite_pow::HEADER_BYTES];

    let mut generate_total = Duration::ZERO;
    let mut trim_total = Duration::ZERO;
    let mut search_total = Duration::ZERO;
    let mut cycles_found = 0u64;

    for nonce in 0..nonces {
        let at = Instant::now();
        let edges = generator.generate(&header, nonce);
        generate_total += at.elapsed();

        let at = Instant::now();
        let survivors = trim(&edges, &params);
        trim_total += at.elapsed();

        let at = Instant::now();
        let surviving_edges: Vec<Edge> = survivors.iter().map(|&i| edges[i as usize]).collect();
        if CycleFinder::new(&surviving_edges).find().is_some() {
            cycles_found += 1;
        }
        search_total += at.elapsed();

        info!(
            nonce,
            survivors = survivors.len(),
            "nonce done"
        );
    }

    info!(
        nonces,
        cycles_found,
        generate_ms = generate_total.as_millis() as u64 / nonces.max(1),
        trim_ms = trim_total.as_millis() as u64 / nonces.max(1),
        search_ms = search_total.as_millis() as u64 / nonces.max(1),
        "bench complete"
    );
}
