//! CLI argument parsing using clap

use crate::config::PoolConfig;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Local mode (default) - coordinator and workers inside one process
    Local,
    /// Coordinator mode - dial a pool of worker processes and orchestrate
    Coordinator,
    /// Worker mode - listen for a coordinator and serve one run
    Worker,
}

/// pullpool - pull-based work distribution over a ranked pool of processes
#[derive(Parser, Debug)]
#[command(name = "pullpool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: local, coordinator, or worker
    #[arg(long, value_enum, default_value = "local")]
    pub mode: ExecutionMode,

    /// Port for a worker to listen on (worker mode only)
    #[arg(long, default_value = "9900")]
    pub listen_port: u16,

    /// Comma-separated worker addresses for coordinator mode (e.g., "10.0.1.10:9900,10.0.1.11:9900")
    #[arg(long)]
    pub host_list: Option<String>,

    /// File containing worker addresses (one per line, for coordinator mode)
    #[arg(long)]
    pub clients_file: Option<PathBuf>,

    /// Number of demo work items to generate
    #[arg(short = 'j', long, default_value = "13")]
    pub jobs: usize,

    /// Master seed for demo work item generation
    #[arg(long, default_value = "31415")]
    pub seed: u64,

    /// Number of workers in local mode (defaults to available CPUs)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Poll interval in seconds for the blocking receive
    #[arg(long)]
    pub poll_interval: Option<f64>,

    /// Do not retain reports on the coordinator
    #[arg(long)]
    pub no_reports: bool,

    /// Deadline in seconds for every receive (default: block forever)
    #[arg(long)]
    pub timeout: Option<f64>,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print collected reports as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Build the pool configuration: TOML file first, then CLI overrides,
    /// then validation.
    pub fn pool_config(&self) -> Result<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => super::toml::parse_toml_file(path)?,
            None => PoolConfig::default(),
        };

        if let Some(poll) = self.poll_interval {
            config.poll_interval_secs = poll;
        }
        if self.no_reports {
            config.retain_reports = false;
        }
        if let Some(timeout) = self.timeout {
            config.receive_timeout_secs = Some(timeout);
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }

    /// Worker addresses for coordinator mode, from --host-list or
    /// --clients-file.
    pub fn worker_addresses(&self) -> Result<Vec<String>> {
        let addresses: Vec<String> = if let Some(ref list) = self.host_list {
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(ref path) = self.clients_file {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read clients file: {}", path.display()))?;
            contents
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect()
        } else {
            anyhow::bail!("coordinator mode requires --host-list or --clients-file");
        };

        if addresses.is_empty() {
            anyhow::bail!("No worker addresses specified");
        }

        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pullpool").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.mode, ExecutionMode::Local);
        assert_eq!(cli.jobs, 13);
        assert_eq!(cli.seed, 31415);

        let config = cli.pool_config().unwrap();
        assert!(config.retain_reports);
    }

    #[test]
    fn test_flag_overrides() {
        let cli = cli(&["--poll-interval", "0.01", "--no-reports", "--timeout", "5"]);
        let config = cli.pool_config().unwrap();

        assert_eq!(config.poll_interval_secs, 0.01);
        assert!(!config.retain_reports);
        assert_eq!(config.receive_timeout_secs, Some(5.0));
    }

    #[test]
    fn test_host_list_parsing() {
        let cli = cli(&["--mode", "coordinator", "--host-list", "a:1, b:2,,c:3"]);
        assert_eq!(cli.worker_addresses().unwrap(), vec!["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn test_clients_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# pool").unwrap();
        writeln!(file, "10.0.0.1:9900").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.2:9900").unwrap();

        let mut cli = cli(&["--mode", "coordinator"]);
        cli.clients_file = Some(file.path().to_path_buf());

        assert_eq!(
            cli.worker_addresses().unwrap(),
            vec!["10.0.0.1:9900", "10.0.0.2:9900"]
        );
    }

    #[test]
    fn test_coordinator_without_addresses_fails() {
        let cli = cli(&["--mode", "coordinator"]);
        assert!(cli.worker_addresses().is_err());
    }
}
