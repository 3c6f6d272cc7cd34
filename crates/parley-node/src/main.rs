//! Parley node binary.
//!
//! # Usage
//!
//! ```bash
//! # One Lamport node per process, all sharing a cluster file
//! parley mutex --config cluster.json --id 2 --rounds 3
//!
//! # Byzantine agreement: start the Lieutenants, then the Commander
//! parley lieutenant --config cluster.json --id 1
//! parley commander --config cluster.json --order ATTACK
//!
//! # Whole clusters in one process
//! parley simulate mutex --nodes 5 --rounds 2
//! parley simulate byzantine --nodes 7 --traitors 2 --order RETREAT
//! ```

use std::{fs::File, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use parley_node::{ClusterConfig, EventLog, MutexWorkload, NodeError, SystemEnv, launch, simulate};
use parley_proto::{NodeId, Order};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Lamport mutual exclusion and Byzantine agreement nodes
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Distributed mutual exclusion and Byzantine agreement")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one mutual exclusion node
    Mutex {
        /// Cluster file
        #[arg(short, long)]
        config: PathBuf,
        /// This node's id
        #[arg(short, long)]
        id: NodeId,
        /// Critical sections to request before only serving peers
        #[arg(short, long, default_value = "1")]
        rounds: u32,
    },
    /// Run one Lieutenant until it decides, then keep relaying
    Lieutenant {
        /// Cluster file
        #[arg(short, long)]
        config: PathBuf,
        /// This node's id
        #[arg(short, long)]
        id: NodeId,
    },
    /// Issue one order as the configured Commander
    Commander {
        /// Cluster file
        #[arg(short, long)]
        config: PathBuf,
        /// ATTACK or RETREAT
        #[arg(short, long)]
        order: Order,
    },
    /// Run a whole cluster in this process
    #[command(subcommand)]
    Simulate(Simulation),
}

#[derive(Subcommand, Debug)]
enum Simulation {
    /// Lamport mutual exclusion
    Mutex {
        /// Cluster size
        #[arg(short, long, default_value = "3")]
        nodes: u32,
        /// Critical sections per node
        #[arg(short, long, default_value = "2")]
        rounds: u32,
    },
    /// OM(f) with the highest ids faulty
    Byzantine {
        /// Cluster size
        #[arg(short, long, default_value = "4")]
        nodes: u32,
        /// Faulty nodes, also the fault bound
        #[arg(short, long, default_value = "1")]
        traitors: u32,
        /// Commander's order
        #[arg(short, long, default_value = "ATTACK")]
        order: Order,
    },
}

fn init_tracing(args: &Args) -> Result<(), NodeError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        },
        None => None,
    };

    tracing_subscriber::registry().with(fmt::layer()).with(file_layer).with(filter).init();
    Ok(())
}

async fn run(command: Command) -> Result<(), NodeError> {
    match command {
        Command::Mutex { config, id, rounds } => {
            let config = ClusterConfig::load(config)?;
            let running = launch::start_mutex_node(&config, id, EventLog::new()).await?;

            let workload = MutexWorkload { rounds, ..MutexWorkload::default() };
            workload.run(running.node.as_ref(), &SystemEnv::new()).await?;

            tracing::info!(node = id, "workload done, serving peers");
            running.serve_forever().await
        },
        Command::Lieutenant { config, id } => {
            let config = ClusterConfig::load(config)?;
            let running = launch::start_lieutenant(&config, id).await?;

            let value = running.node.decision().await;
            tracing::info!(node = id, %value, "final decision");
            running.serve_forever().await
        },
        Command::Commander { config, order } => {
            let config = ClusterConfig::load(config)?;
            launch::run_commander(&config, order).await
        },
        Command::Simulate(Simulation::Mutex { nodes, rounds }) => {
            let report =
                simulate::simulate_mutex(nodes, MutexWorkload::quick(rounds), SystemEnv::new())
                    .await?;
            for entry in report.entries() {
                tracing::info!(node = entry.node, timestamp = entry.timestamp, "granted");
            }
            tracing::info!(
                entries = report.entries().count(),
                exclusive = report.is_exclusive(),
                "mutex simulation complete"
            );
            Ok(())
        },
        Command::Simulate(Simulation::Byzantine { nodes, traitors, order }) => {
            let report = simulate::simulate_byzantine(nodes, traitors, order).await?;
            for (id, value) in &report.decisions {
                let role = if report.traitors.contains(id) { "traitor" } else { "loyal" };
                tracing::info!(node = id, role, %value, "final decision");
            }
            tracing::info!(
                agreement = report.loyal_agree(),
                validity = report.commander_followed(),
                "byzantine simulation complete"
            );
            Ok(())
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    tracing::info!("Parley starting");
    if let Err(err) = run(args.command).await {
        tracing::error!(error = %err, fatal = err.is_fatal(), "node stopped");
        return Err(err.into());
    }
    Ok(())
}
