use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsync_core::config::{parse_duration, Config};
use docsync_core::logging::{init_logging_with_config, LogConfig};
use docsync_core::metrics::install_prometheus_exporter;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

mod simulate;

use simulate::{SimulationOptions, SimulationReport};

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file; DOCSYNC_* variables still apply on top
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run N providers on one in-memory channel and check they converge
    Simulate {
        /// Number of providers
        #[arg(long, default_value_t = 3)]
        peers: usize,

        /// Local edits made by each provider after connecting
        #[arg(long, default_value_t = 10)]
        edits: usize,

        /// Probability of dropping any single message
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,

        /// Deliver every message twice
        #[arg(long)]
        duplicate: bool,

        /// Resync rounds to wait for convergence
        #[arg(long, default_value_t = 3)]
        rounds: u32,

        /// Override the resync interval, e.g. 500ms
        #[arg(long, value_parser = duration_arg)]
        resync_interval: Option<Duration>,

        /// Override the ping interval, e.g. 500ms
        #[arg(long, value_parser = duration_arg)]
        ping_interval: Option<Duration>,

        /// Seed for edit values and message drops
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration("duration", value).map_err(|e| e.to_string())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_config(&config.logging)?)?;

    if config.metrics.enabled {
        install_prometheus_exporter(config.metrics.bind_address)?;
    }

    match args.command {
        Command::Simulate {
            peers,
            edits,
            drop_rate,
            duplicate,
            rounds,
            resync_interval,
            ping_interval,
            seed,
        } => {
            if let Some(interval) = resync_interval {
                config.provider.resync_interval = interval;
            }
            if let Some(interval) = ping_interval {
                config.provider.ping_interval = interval;
            }
            config.validate()?;

            let options = SimulationOptions { peers, edits, drop_rate, duplicate, rounds, seed };
            info!(peers, edits, drop_rate, duplicate, rounds, "Starting simulation");
            let report = simulate::run(&config.provider, &options).await?;
            print_report(&report);
            anyhow::ensure!(report.converged, "replicas did not converge after {} rounds", rounds);
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!(
        "converged: {} after {:.2}s ({} keys)",
        report.converged,
        report.elapsed.as_secs_f64(),
        report.keys
    );
    println!("ready: {}", report.ready);
    println!(
        "messages: {} published, {} delivered, {} dropped",
        report.stats.published, report.stats.delivered, report.stats.dropped
    );
    for peer in &report.peers {
        println!("  {}  synced peers: {}  health: {:?}", peer.instance, peer.synced_peers, peer.health);
    }
}
