use anyhow::{Context, Result};
use canbus_sim::observability::logging;
use canbus_sim::storage::{MemoryLabelStore, MemorySequenceStore};
use canbus_sim::{Simulator, SimulatorConfig};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::broadcast::error::RecvError;

/// CAN bus simulator speaking JSON lines on stdin/stdout
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file holding an array of exported sequences
    #[arg(long)]
    sequences: Option<PathBuf>,

    /// Override the generator seed
    #[arg(long)]
    seed: Option<u64>,

    /// Do not start background traffic
    #[arg(long)]
    no_generator: bool,

    /// Log level for this crate when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level).context("Failed to initialize logging")?;

    let mut config = SimulatorConfig::load(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.generator.seed = seed;
    }
    if cli.no_generator {
        config.autostart_generator = false;
    }

    let sequences = match &cli.sequences {
        Some(path) => MemorySequenceStore::load_file(path).await?,
        None => MemorySequenceStore::new(),
    };

    let simulator = Simulator::new(
        config,
        Arc::new(sequences),
        Arc::new(MemoryLabelStore::new()),
    )
    .context("Failed to start simulator")?;

    let result = serve(&simulator).await;
    simulator.shutdown().await;
    tracing::info!("{}", simulator.bus().report());
    result
}

/// Read control messages from stdin and write replies, frames and status
/// pushes to stdout until stdin closes or Ctrl-C.
async fn serve(simulator: &Simulator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut feed = simulator.frame_feed();
    let mut status = simulator.subscribe_status();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    tracing::info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = simulator.handle_json(&line).await;
                write_json(&mut stdout, &reply).await?;
            }
            message = feed.next() => {
                let Some(message) = message else { break };
                write_json(&mut stdout, &message).await?;
            }
            message = status.recv() => match message {
                Ok(message) => write_json(&mut stdout, &message).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status output lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

async fn write_json<T: Serialize>(stdout: &mut Stdout, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value).context("Failed to encode output")?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}
