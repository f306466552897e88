//! pullpool CLI entry point
//!
//! Demo harness around the library: generates a backlog of RNG seeds, runs
//! the pool in one process (local mode) or across processes (coordinator +
//! worker modes), and prints the collected reports.

use anyhow::{Context, Result};
use pullpool::config::cli::{Cli, ExecutionMode};
use pullpool::transport::tcp::TcpTransport;
use pullpool::{Channel, Coordinator, MemoryCluster, PoolConfig, Task, Worker};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn main() -> Result<()> {
    println!("pullpool v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let cli = Cli::parse_args();
    let config = cli.pool_config()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.mode {
        ExecutionMode::Local => runtime.block_on(run_local(&cli, config)),
        ExecutionMode::Coordinator => runtime.block_on(run_coordinator(&cli, config)),
        ExecutionMode::Worker => runtime.block_on(run_worker(&cli, config)),
    }
}

/// Demo task: treat the work item as an RNG seed and "relocate" to a
/// random (lon, lat) pair.
struct Relocate;

impl Task for Relocate {
    fn execute(&self, item: &[u8]) -> Result<Vec<u8>> {
        let seed: u64 =
            rmp_serde::from_slice(item).context("Demo work item is not a seed")?;
        let mut rng = StdRng::seed_from_u64(seed);
        let lonlat: (f64, f64) = (rng.gen_range(-180.0..180.0), rng.gen_range(-90.0..90.0));
        Ok(rmp_serde::to_vec(&lonlat)?)
    }
}

/// Generate the demo backlog: `jobs` per-item seeds drawn from the master
/// seed.
fn make_backlog(jobs: usize, master_seed: u64) -> Result<Vec<Vec<u8>>> {
    let mut rng = StdRng::seed_from_u64(master_seed);
    (0..jobs)
        .map(|_| {
            let seed: u64 = rng.gen();
            Ok(rmp_serde::to_vec(&seed)?)
        })
        .collect()
}

/// Run coordinator and workers inside one process over the in-memory
/// transport.
async fn run_local(cli: &Cli, config: PoolConfig) -> Result<()> {
    let workers = cli.workers.unwrap_or_else(num_cpus::get).max(1);
    println!("Local pool: {} workers, {} jobs", workers, cli.jobs);

    let mut endpoints = MemoryCluster::new(workers + 1);

    let mut handles = Vec::new();
    for endpoint in endpoints.drain(1..) {
        let channel = Channel::new(Arc::new(endpoint), config.poll_interval());
        let mut worker = Worker::new(channel, Relocate, &config)?;
        handles.push(tokio::spawn(async move { worker.go().await }));
    }

    let channel = Channel::new(Arc::new(endpoints.remove(0)), config.poll_interval());
    let mut coordinator =
        Coordinator::new(channel, make_backlog(cli.jobs, cli.seed)?, &config)?;
    coordinator.orchestrate().await?;

    for handle in handles {
        handle.await.context("Worker task panicked")??;
    }

    print_reports(&coordinator, cli, &config)
}

/// Dial a pool of worker processes and orchestrate the run.
async fn run_coordinator(cli: &Cli, config: PoolConfig) -> Result<()> {
    let addresses = cli.worker_addresses()?;
    println!("Connecting to {} workers...", addresses.len());

    let transport = TcpTransport::connect_pool(&addresses).await?;
    let channel = Channel::new(Arc::new(transport), config.poll_interval());
    println!("All {} workers connected", addresses.len());
    println!();

    let mut coordinator =
        Coordinator::new(channel, make_backlog(cli.jobs, cli.seed)?, &config)?;
    coordinator.orchestrate().await?;

    print_reports(&coordinator, cli, &config)
}

/// Listen for a coordinator, serve one run, exit.
async fn run_worker(cli: &Cli, config: PoolConfig) -> Result<()> {
    let node_id = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let addr = format!("0.0.0.0:{}", cli.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("Worker listening on port {}", cli.listen_port);
    println!("Node ID: {}", node_id);
    println!("Waiting for coordinator connection...");

    let transport = TcpTransport::accept_pool(listener, &node_id).await?;
    let channel = Channel::new(Arc::new(transport), config.poll_interval());
    println!("Joined pool as rank {} of {}", channel.rank(), channel.size());

    let mut worker = Worker::new(channel, Relocate, &config)?;
    worker.go().await?;

    println!("Recalled, shutting down");
    Ok(())
}

/// Decode and print the collected reports.
fn print_reports(coordinator: &Coordinator, cli: &Cli, config: &PoolConfig) -> Result<()> {
    if !config.retain_reports {
        println!("Run complete ({} jobs, reports not retained)", cli.jobs);
        return Ok(());
    }

    let reports = coordinator.reports()?;
    let decoded: Vec<(f64, f64)> = reports
        .iter()
        .map(|r| rmp_serde::from_slice(r).context("Report is not a (lon, lat) pair"))
        .collect::<Result<_>>()?;

    println!();
    println!("Run complete: {} reports", decoded.len());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&decoded)?);
    } else {
        for (lon, lat) in &decoded {
            println!("  lon {:>10.4}  lat {:>9.4}", lon, lat);
        }
    }

    Ok(())
}
