//! NetVigil CLI
//!
//! Passive network host and connection discovery from sensor flow
//! telemetry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ipnet::Ipv4Net;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vigil_core::EvidenceQueue;
use vigil_graph::{GraphStore, MemoryStore, Neo4jConfig, Neo4jStore, SharedGraphStore};
use vigil_ingest::IngestConfig;
use vigil_runtime::{Engine, EngineConfig, EngineStatus};

#[derive(Parser)]
#[command(name = "netvigil")]
#[command(author, version, about = "Passive network host and connection discovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Args, Clone)]
struct GraphArgs {
    /// Neo4j HTTP endpoint
    #[arg(long, default_value = "http://127.0.0.1:7474")]
    neo4j_url: String,

    /// Neo4j database name
    #[arg(long, default_value = "neo4j")]
    database: String,

    /// Neo4j user
    #[arg(long, default_value = "neo4j")]
    neo4j_user: String,

    /// Neo4j password (or set NEO4J_PASSWORD env var)
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password")]
    neo4j_password: String,
}

impl GraphArgs {
    fn config(&self) -> Neo4jConfig {
        Neo4jConfig {
            endpoint: self.neo4j_url.clone(),
            database: self.database.clone(),
            user: self.neo4j_user.clone(),
            password: self.neo4j_password.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest sensor evidence and maintain the belief graph
    Serve {
        /// TCP port to accept sensor connections on
        #[arg(short, long)]
        port: u16,

        /// CIDR of the monitored network (e.g. 10.0.0.0/24)
        #[arg(short, long)]
        subnet: Ipv4Net,

        /// Seconds between belief updates
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Seconds a sensor connection may stay idle before it is closed
        #[arg(long, default_value = "300")]
        idle_timeout: u64,

        /// Maximum concurrent sensor connections
        #[arg(long, default_value = "64")]
        max_connections: usize,

        /// Wipe the graph store before serving
        #[arg(long)]
        reset_graph: bool,

        /// Use an in-memory store instead of Neo4j
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Check graph store connectivity
    Status {
        #[command(flatten)]
        graph: GraphArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Serve {
            port,
            subnet,
            interval,
            idle_timeout,
            max_connections,
            reset_graph,
            dry_run,
            graph,
        } => {
            serve(
                port,
                subnet,
                interval,
                idle_timeout,
                max_connections,
                reset_graph,
                dry_run,
                graph,
            )
            .await?;
        }
        Commands::Status { graph } => {
            check_status(graph).await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    port: u16,
    subnet: Ipv4Net,
    interval: u64,
    idle_timeout: u64,
    max_connections: usize,
    reset_graph: bool,
    dry_run: bool,
    graph: GraphArgs,
) -> Result<()> {
    println!("🛰️  NetVigil - passive host and connection discovery\n");

    let store: SharedGraphStore = if dry_run {
        println!("🗄️  Store: in-memory (dry run)");
        Arc::new(MemoryStore::new())
    } else {
        println!("🗄️  Store: {} (db: {})", graph.neo4j_url, graph.database);
        Arc::new(Neo4jStore::new(graph.config())?)
    };
    println!("🌐 Monitored subnet: {subnet}");
    println!("⏱️  Update interval: {interval}s\n");

    let queue = Arc::new(EvidenceQueue::new());

    let mut engine_config = EngineConfig::new(subnet);
    engine_config.interval = Duration::from_secs(interval);
    let mut engine = Engine::new(engine_config, queue.clone(), store);

    // Startup checks are fatal: no traffic is served against a sink that
    // cannot be reached.
    engine.start(reset_graph).await?;

    let ingest_config = IngestConfig {
        port,
        idle_timeout: Duration::from_secs(idle_timeout),
        max_connections,
    };
    let (addr, ingest_shutdown) = vigil_ingest::run(ingest_config, queue).await?;
    println!("📡 Accepting sensors on {addr} (ctrl-c to stop)\n");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let status = engine.status_handle();
    engine.run(shutdown_rx).await;
    let _ = ingest_shutdown.send(());

    print_final_stats(&status.read().clone());
    Ok(())
}

fn print_final_stats(status: &EngineStatus) {
    println!("\n📊 Final stats:");
    println!("   Cycles: {}", status.cycles);
    println!(
        "   Records: {} processed, {} dropped",
        status.records_processed, status.parse_failures
    );
    println!(
        "   Tracked: {} hosts, {} connections",
        status.hosts, status.connections
    );
    println!(
        "   Upserts: {} written, {} failed",
        status.upserts, status.upsert_failures
    );
    if let Some(at) = status.last_cycle_at {
        println!("   Last cycle: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

async fn check_status(graph: GraphArgs) -> Result<()> {
    println!("🔌 Checking graph store at {}...\n", graph.neo4j_url);

    let store = Neo4jStore::new(graph.config())?;
    match store.ping().await {
        Ok(()) => {
            println!("✅ Graph store is reachable");
            println!("   Endpoint: {}", graph.neo4j_url);
            println!("   Database: {}", graph.database);
        }
        Err(e) => {
            println!("❌ Graph store is not reachable: {e}");
            println!("   Expected Neo4j HTTP API at: {}", graph.neo4j_url);
        }
    }

    Ok(())
}
