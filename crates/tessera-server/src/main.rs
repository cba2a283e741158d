//! Tessera crypto service binary.
//!
//! Starts the crypto partition on a tokio runtime and drives it with a
//! number of client tasks, each running the self-test workload.
//!
//! # Usage
//!
//! ```bash
//! # Four clients, ten rounds each
//! tessera-server --clients 4 --iterations 10
//!
//! # Trace every dispatch decision
//! RUST_LOG=tessera_server=debug tessera-server
//! ```

use clap::Parser;
use tessera_client::CryptoClient;
use tessera_core::ClientId;
use tessera_server::{MemoryStorage, ServiceConfig, SharedRuntime, SystemEnv, run_selftest};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tessera crypto service
#[derive(Parser, Debug)]
#[command(name = "tessera-server")]
#[command(about = "Secure-partition crypto service with a self-test workload")]
#[command(version)]
struct Args {
    /// Client tasks to run
    #[arg(short, long, default_value = "4")]
    clients: u16,

    /// Self-test rounds per client
    #[arg(short, long, default_value = "1")]
    iterations: u32,

    /// Maximum simultaneous connections
    #[arg(long, default_value = "8")]
    max_connections: usize,

    /// Maximum live multi-part operations
    #[arg(long, default_value = "16")]
    max_operations: usize,

    /// Maximum keys held in memory
    #[arg(long, default_value = "64")]
    max_keys: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Tessera crypto service starting");

    let config = ServiceConfig {
        max_connections: args.max_connections,
        max_operations: args.max_operations,
        max_keys: args.max_keys,
        ..Default::default()
    };
    let (sid, version) = (config.sid, config.version);
    let runtime = SharedRuntime::start(config, SystemEnv::new(), MemoryStorage::new())?;

    let mut tasks = Vec::with_capacity(usize::from(args.clients));
    for n in 1..=args.clients {
        let id = ClientId(i32::from(n));
        let transport = runtime.client(id).await?.blocking();
        let iterations = args.iterations;
        tasks.push(tokio::task::spawn_blocking(move || {
            let mut client = CryptoClient::connect(transport, sid, version)?;
            let mut checks = 0;
            for round in 0..iterations {
                let report = run_selftest(&mut client)?;
                tracing::debug!(client = id.0, round, checks = report.checks, "self-test round passed");
                checks += report.checks;
            }
            client.close()?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(checks)
        }));
    }

    let mut failures = 0;
    for (n, task) in tasks.into_iter().enumerate() {
        match task.await? {
            Ok(checks) => tracing::info!(client = n + 1, checks, "client finished"),
            Err(err) => {
                failures += 1;
                tracing::warn!(client = n + 1, %err, "client failed");
            },
        }
    }

    let partition = runtime.shutdown().await?;
    tracing::info!(
        connections = partition.connections(),
        operations = partition.operations().len(),
        keys = partition.keys().loaded(),
        failures,
        "Tessera crypto service stopped"
    );

    if failures > 0 {
        return Err(format!("{failures} client(s) failed the self-test").into());
    }
    Ok(())
}
