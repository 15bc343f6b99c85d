//! Drowsiness Engine Replay - Main Entry Point
//!
//! Usage: `dms-replay [--config replay.toml] [frames.jsonl]`
//!
//! Reads stdin when no input file is given; events go to stdout, logs to
//! stderr.

use std::path::PathBuf;

use alerting::CueScheduler;
use dms::FatigueEngine;
use replay::{init_logging, install_metrics, run_replay, ReplayConfig, ReplayError, Replayer};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<PathBuf> = None;
    let mut input: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| ReplayError::Config("--config needs a path".to_string()))?;
                config_path = Some(PathBuf::from(path));
            }
            _ => input = Some(PathBuf::from(arg)),
        }
    }

    let config = ReplayConfig::load(config_path.as_deref())?;
    init_logging(config.level()?, config.log_json)?;

    info!("=== DMS Replay v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.metrics_addr {
        install_metrics(addr)?;
    }

    let engine = FatigueEngine::new(config.engine()?)?;
    let mut replayer = Replayer::new(engine, CueScheduler::new(config.cues.clone()));
    let stdout = tokio::io::stdout();

    let summary = match input {
        Some(path) => {
            info!("Replaying {}", path.display());
            let file = tokio::fs::File::open(&path).await?;
            run_replay(&mut replayer, BufReader::new(file), stdout).await?
        }
        None => {
            info!("Replaying stdin");
            run_replay(&mut replayer, BufReader::new(tokio::io::stdin()), stdout).await?
        }
    };

    info!(
        "Critical excursions: {}, cues played: {}",
        summary.critical_count, summary.cues
    );

    Ok(())
}
