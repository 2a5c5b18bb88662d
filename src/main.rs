//! CLI Entry Point for cpc_daq
//!
//! Provides command-line interface for:
//! - Running an acquisition from an instrument profile
//! - Checking a profile without touching hardware
//! - Writing a template profile to start from
//!
//! # Usage
//!
//! Acquire until Ctrl-C:
//! ```bash
//! cpc_daq run --config config/cpc.example.yaml
//! ```
//!
//! Ten minutes against simulated instruments:
//! ```bash
//! cpc_daq run --config config/cpc.example.yaml --simulate --duration 600
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use cpc_daq::config::Profile;
use cpc_daq::transport::{Connector, SerialConnector, SimulatedConnector};
use cpc_daq::validation::seconds_to_duration;
use cpc_daq::worker::{WorkerState, WorkerStatus};
use cpc_daq::{logging, DaqApp, DaqError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cpc_daq")]
#[command(about = "Multi-channel CPC acquisition with synchronized CSV logging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire from every channel in the profile until Ctrl-C
    Run {
        /// Instrument profile (YAML)
        #[arg(long)]
        config: PathBuf,

        /// Use simulated instruments instead of serial ports
        #[arg(long)]
        simulate: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Load and validate a profile, then print its channels and CSV header
    Check {
        /// Instrument profile (YAML)
        #[arg(long)]
        config: PathBuf,
    },

    /// Write a template profile
    Template {
        /// Where to write it; must not exist yet
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            simulate,
            duration,
        } => run(&config, simulate, duration).await,
        Commands::Check { config } => check(&config),
        Commands::Template { path } => write_template(&path),
    }
}

fn load(path: &Path) -> Result<Profile> {
    Profile::load(path).with_context(|| format!("Failed to load profile '{}'", path.display()))
}

async fn run(config: &Path, simulate: bool, duration: Option<f64>) -> Result<()> {
    let deadline = match duration {
        Some(secs) => {
            Some(seconds_to_duration(secs).map_err(|e| anyhow!("--duration: {}", e))?)
        }
        None => None,
    };

    let profile = load(config)?;
    logging::init_from_profile(&profile).map_err(|e| anyhow!(e))?;

    let mut app = DaqApp::new(profile)?;
    let connector: Arc<dyn Connector> = if simulate {
        info!("Running with simulated instruments");
        Arc::new(SimulatedConnector::new())
    } else {
        Arc::new(SerialConnector)
    };
    let sinks = app.default_sinks();
    app.start(connector, sinks)?;

    let status = app.status();
    let wait = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(wait);
    let mut report = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Ctrl-C received, stopping");
                break;
            }
            _ = &mut wait => {
                info!("Run duration elapsed, stopping");
                break;
            }
            _ = report.tick() => {
                status.try_iter().for_each(report_status);
            }
        }
    }

    let result = tokio::task::spawn_blocking(move || app.shutdown())
        .await
        .context("Shutdown task panicked")?;
    status.try_iter().for_each(report_status);

    match result {
        Ok(rows) => {
            info!(rows, "Acquisition finished");
            Ok(())
        }
        Err(DaqError::ShutdownFailed(errors)) => {
            for e in &errors {
                error!("{}", e);
            }
            Err(anyhow!("{} channel(s) did not run cleanly", errors.len()))
        }
        Err(e) => Err(e.into()),
    }
}

fn report_status(status: WorkerStatus) {
    let detail = status.detail.unwrap_or_default();
    match status.state {
        WorkerState::Failed => error!(channel = %status.channel, "{} failed: {}", status.channel, detail),
        WorkerState::Recovering => warn!(channel = %status.channel, "{} recovering: {}", status.channel, detail),
        state => info!(channel = %status.channel, "{} is {:?}", status.channel, state),
    }
}

fn check(config: &Path) -> Result<()> {
    let profile = load(config)?;
    let app = DaqApp::new(profile)?;
    let profile = app.profile();

    println!("Profile '{}' is valid", config.display());
    println!(
        "Tick: {:?}, queue bound: {}",
        profile.interval(),
        profile
            .queue_bound()
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!();
    println!(
        "{:<16} {:<16} {:>7} {:<12} {:>6} {}",
        "CHANNEL", "PORT", "BAUD", "POLL", "FIELDS", "CONCENTRATION"
    );
    for channel in &profile.channels {
        let poll = if channel.poll_commands.is_empty() {
            "(stream)".to_string()
        } else {
            channel.poll_commands.join(" ")
        };
        let concentration = if channel.normalizes() {
            format!("{} / {}", channel.count_field, channel.flow_rate)
        } else {
            "device".to_string()
        };
        println!(
            "{:<16} {:<16} {:>7} {:<12} {:>6} {}",
            channel.name,
            channel.serial.port,
            channel.serial.baud,
            poll,
            channel.fields.len(),
            concentration
        );
    }
    println!();
    println!("CSV header:");
    println!("{}", app.header().join(","));
    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Refusing to overwrite existing file '{}'", path.display());
    }
    let yaml = serde_yaml::to_string(&Profile::template()).context("Failed to render template")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write '{}'", path.display()))?;
    println!("Template profile written to {}", path.display());
    Ok(())
}
