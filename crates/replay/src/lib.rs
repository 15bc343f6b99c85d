//! Drowsiness Engine Replay
//!
//! Reads a JSON-lines stream of landmark frames and operator commands,
//! drives the fatigue engine, and writes one JSON line per input record.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use alerting::{Cue, CueConfig, CueScheduler};
use dms::{CommandOutcome, DmsConfig, DmsError, EngineCommand, FatigueEngine, FrameEvent, FrameInput};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Replay error types
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] DmsError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Engine config file, layered under `DMS__*` variables
    pub engine_config: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON
    pub log_json: bool,
    /// Prometheus listen address, exporter disabled when unset
    pub metrics_addr: Option<String>,
    pub cues: CueConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            engine_config: None,
            log_level: "info".to_string(),
            log_json: false,
            metrics_addr: None,
            cues: CueConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Load from an optional file layered under `REPLAY__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ReplayError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(config::Environment::with_prefix("REPLAY").separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ReplayError::Config(e.to_string()))
    }

    /// Engine configuration referenced by this replay configuration
    pub fn engine(&self) -> Result<DmsConfig, ReplayError> {
        Ok(DmsConfig::load(self.engine_config.as_deref())?)
    }

    pub fn level(&self) -> Result<Level, ReplayError> {
        self.log_level
            .parse()
            .map_err(|_| ReplayError::Config(format!("unknown log level '{}'", self.log_level)))
    }
}

/// Initialize logging
pub fn init_logging(level: Level, json: bool) -> Result<(), ReplayError> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ReplayError::Config(format!("failed to set tracing subscriber: {}", e)))
}

/// Install the Prometheus exporter. Must run inside a tokio runtime.
pub fn install_metrics(addr: &str) -> Result<(), ReplayError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| ReplayError::Config(format!("invalid metrics address '{}': {}", addr, e)))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ReplayError::Config(e.to_string()))?;
    info!("Prometheus metrics exporter listening on {}/metrics", addr);
    Ok(())
}

/// One input line
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplayRecord {
    Command(EngineCommand),
    Frame(FrameInput),
}

/// One output line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayOutput {
    Frame {
        event: FrameEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        cue: Option<Cue>,
    },
    Command(CommandOutcome),
    Skipped {
        line: usize,
        error: String,
    },
}

/// Totals for a finished replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub frames: usize,
    pub skipped: usize,
    pub commands: usize,
    pub cues: usize,
    pub critical_count: u64,
}

/// Drives an engine and cue scheduler from records
pub struct Replayer {
    engine: FatigueEngine,
    cues: CueScheduler,
    summary: ReplaySummary,
}

impl Replayer {
    pub fn new(engine: FatigueEngine, cues: CueScheduler) -> Self {
        Self {
            engine,
            cues,
            summary: ReplaySummary::default(),
        }
    }

    /// Handle one raw input line. Blank lines yield nothing.
    pub fn handle_line(&mut self, line_no: usize, line: &str) -> Option<ReplayOutput> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let record = match serde_json::from_str::<ReplayRecord>(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Line {}: unparseable record: {}", line_no, e);
                self.summary.skipped += 1;
                return Some(ReplayOutput::Skipped {
                    line: line_no,
                    error: e.to_string(),
                });
            }
        };

        Some(self.handle_record(line_no, record))
    }

    pub fn handle_record(&mut self, line_no: usize, record: ReplayRecord) -> ReplayOutput {
        match record {
            ReplayRecord::Command(command) => {
                self.summary.commands += 1;
                if command == EngineCommand::Reset {
                    self.cues.clear();
                }
                let outcome = command.apply(&mut self.engine);
                if let Some(error) = &outcome.error {
                    warn!("Line {}: command refused: {}", line_no, error);
                }
                ReplayOutput::Command(outcome)
            }
            ReplayRecord::Frame(input) => match self.engine.process(input) {
                Ok(event) => {
                    self.summary.frames += 1;
                    let cue = self.cues.on_event(&event);
                    if cue.is_some() {
                        self.summary.cues += 1;
                    }
                    self.summary.critical_count = event.critical_count;
                    ReplayOutput::Frame { event, cue }
                }
                Err(e) => {
                    self.summary.skipped += 1;
                    ReplayOutput::Skipped {
                        line: line_no,
                        error: e.to_string(),
                    }
                }
            },
        }
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    pub fn engine(&self) -> &FatigueEngine {
        &self.engine
    }
}

/// Replay every line of `reader`, writing JSON lines to `writer`
pub async fn run_replay<R, W>(
    replayer: &mut Replayer,
    reader: R,
    mut writer: W,
) -> Result<ReplaySummary, ReplayError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if let Some(output) = replayer.handle_line(line_no, &line) {
            let mut json = serde_json::to_vec(&output)?;
            json.push(b'\n');
            writer.write_all(&json).await?;
        }
    }
    writer.flush().await?;

    let summary = replayer.summary().clone();
    info!(
        "Replay finished: {} frames, {} skipped, {} commands, {} cues, {} critical",
        summary.frames, summary.skipped, summary.commands, summary.cues, summary.critical_count
    );
    Ok(summary)
}
