use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shardis_core::{Fnv1aRingHasher, Sha256RingHasher, ShardId, ShardKey, TopologySnapshot};
use shardis_memory::{
    ChecksumVerifier, InMemoryAssignmentStore, InMemoryCheckpointStore, InMemoryShardStore,
};
use shardis_migration::{BudgetGovernor, ExecutorConfig, MigrationExecutor, MigrationPlanner};
use shardis_routing::Router;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "shardis-cli")]
#[command(about = "Demonstrates shardis routing and online migration against in-memory adapters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route a key across a fixed shard set and print the assignment.
    Route {
        /// Comma-separated shard ids, e.g. "s1,s2,s3".
        #[arg(long, value_delimiter = ',')]
        shards: Vec<String>,

        /// Key to route.
        #[arg(long)]
        key: String,

        /// Hash ring replication factor.
        #[arg(long, default_value_t = 100)]
        replication: u32,

        /// Use the FNV-1a ring hasher instead of the SHA-256 default.
        #[arg(long, default_value_t = false)]
        fast_hash: bool,
    },

    /// Run a small single-shard-to-single-shard migration against
    /// in-memory adapters, printing the terminal summary.
    Migrate {
        /// Number of synthetic keys to relocate.
        #[arg(long, default_value_t = 20)]
        keys: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Route { shards, key, replication, fast_hash } => {
            run_route(shards, key, replication, fast_hash).await
        }
        Commands::Migrate { keys } => run_migrate(keys).await,
    }
}

async fn run_route(shards: Vec<String>, key: String, replication: u32, fast_hash: bool) -> anyhow::Result<()> {
    let shard_ids = shards
        .into_iter()
        .map(ShardId::new)
        .collect::<Result<Vec<_>, _>>()?;

    let store = Arc::new(InMemoryAssignmentStore::<String>::new());
    let (outcome, map) = if fast_hash {
        let router = Router::new(
            &shard_ids,
            replication,
            Arc::new(Fnv1aRingHasher),
            Arc::new(Fnv1aRingHasher),
            store,
        )?;
        router.route(ShardKey::new(key)).await?
    } else {
        let router = Router::new(
            &shard_ids,
            replication,
            Arc::new(Sha256RingHasher),
            Arc::new(Sha256RingHasher),
            store,
        )?;
        router.route(ShardKey::new(key)).await?
    };

    println!("key routed to shard {} ({outcome:?})", map.shard_id);
    Ok(())
}

async fn run_migrate(keys: usize) -> anyhow::Result<()> {
    let source = ShardId::new("s1")?;
    let target = ShardId::new("s2")?;

    let mut from = TopologySnapshot::new();
    let mut to = TopologySnapshot::new();
    let data_store = Arc::new(InMemoryShardStore::<String, String>::new());

    for i in 0..keys {
        let key = ShardKey::new(format!("key-{i}"));
        from.insert(key.clone(), source.clone());
        to.insert(key.clone(), target.clone());
        data_store.put(source.clone(), key, format!("payload-{i}"));
    }

    let plan = MigrationPlanner::plan(&from, &to)?;
    println!("planned {} key moves from {source} to {target}", plan.len());

    let executor = MigrationExecutor::new(
        data_store.clone(),
        Arc::new(ChecksumVerifier::new(data_store)),
        Arc::new(InMemoryAssignmentStore::<String>::new()),
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(BudgetGovernor::new(64, 64, 8)),
        ExecutorConfig {
            max_retries: 3,
            checkpoint_interval: 5,
            checkpoint_time: Duration::from_secs(5),
            swap_batch_size: 8,
        },
    );

    let summary = executor.execute(&plan, CancellationToken::new()).await?;
    println!(
        "migration complete: planned={} done={} failed={} retries={} elapsed_ms={}",
        summary.planned, summary.done, summary.failed, summary.retries, summary.elapsed_ms
    );
    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
