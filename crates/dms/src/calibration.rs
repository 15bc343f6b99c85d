//! Calibration controller
//!
//! Runs a timed sampling session over open-eye openness and derives a
//! personalized baseline plus warn/crit thresholds. Sessions are timed by
//! frame timestamps, so the result does not depend on frame rate.
//!
//! Samples are weighted in three bands over elapsed time: the settling-in
//! lead and the tail of the session count for little, the middle counts
//! fully.

use feature_engine::{weighted_mean, StatisticalFeatures};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::thresholds::Thresholds;

/// Calibration failures and rejected commands
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum CalibrationError {
    #[error("A calibration session is already running")]
    ConcurrentCalibration,

    #[error("No calibration session is running")]
    NotActive,

    #[error("Calibration collected {got} samples, {required} required")]
    InsufficientSamples { got: usize, required: usize },

    #[error("Calibrated baseline {baseline:.3} is below the plausible minimum {minimum:.3}")]
    ImplausibleBaseline { baseline: f64, minimum: f64 },

    #[error("Cannot relax further: warn threshold {warn:.3} is at its cap {cap:.3}")]
    CannotRelaxFurther { warn: f64, cap: f64 },
}

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Session length (seconds)
    pub duration_secs: f64,
    /// End of the low-weight lead band (seconds)
    pub lead_band_end_secs: f64,
    /// Start of the low-weight tail band (seconds)
    pub tail_band_start_secs: f64,
    /// Weight of samples in the lead and tail bands
    pub edge_weight: f64,
    /// Weight of samples in the middle band
    pub core_weight: f64,
    /// Minimum samples for a valid session
    pub min_samples: usize,
    /// warn = baseline * warn_ratio
    pub warn_ratio: f64,
    /// crit = baseline * crit_ratio
    pub crit_ratio: f64,
    /// Baselines below this are rejected (driver already squinting)
    pub min_baseline: f64,
    /// Manual relaxation step applied to the warn threshold
    pub relax_step: f64,
    /// warn may not be relaxed past baseline * relax_cap_ratio
    pub relax_cap_ratio: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            duration_secs: 7.0,
            lead_band_end_secs: 1.5,
            tail_band_start_secs: 5.5,
            edge_weight: 0.1,
            core_weight: 1.0,
            min_samples: 30,
            warn_ratio: 0.85,
            crit_ratio: 0.50,
            min_baseline: 0.10,
            relax_step: 0.02,
            relax_cap_ratio: 0.95,
        }
    }
}

impl CalibrationConfig {
    /// Weight of a sample taken `elapsed_secs` into the session
    pub fn weight_at(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs < self.lead_band_end_secs || elapsed_secs >= self.tail_band_start_secs {
            self.edge_weight
        } else {
            self.core_weight
        }
    }
}

/// One openness sample taken during a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationSample {
    pub elapsed_secs: f64,
    pub openness: f64,
}

/// Successful calibration result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    /// Newly applied thresholds
    pub thresholds: Thresholds,
    /// Unweighted statistics of the collected openness
    pub stats: StatisticalFeatures,
}

/// Observable calibration state
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Idle,
    /// Started, waiting for the first frame to anchor the clock
    Pending,
    Collecting { elapsed_secs: f64, samples: usize },
}

#[derive(Debug, Default)]
struct Session {
    origin_ms: Option<u64>,
    elapsed_secs: f64,
    samples: Vec<CalibrationSample>,
}

/// Calibration controller; owns the driver's thresholds
#[derive(Debug)]
pub struct CalibrationController {
    config: CalibrationConfig,
    thresholds: Thresholds,
    session: Option<Session>,
}

impl CalibrationController {
    /// Create a controller with initial thresholds
    pub fn new(config: CalibrationConfig, thresholds: Thresholds) -> Self {
        Self {
            config,
            thresholds,
            session: None,
        }
    }

    /// Current thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> CalibrationStatus {
        match &self.session {
            None => CalibrationStatus::Idle,
            Some(Session { origin_ms: None, .. }) => CalibrationStatus::Pending,
            Some(session) => CalibrationStatus::Collecting {
                elapsed_secs: session.elapsed_secs,
                samples: session.samples.len(),
            },
        }
    }

    /// Begin a session. The clock starts at the next recorded frame.
    pub fn start(&mut self) -> Result<(), CalibrationError> {
        if self.session.is_some() {
            warn!("Calibration start rejected: session already running");
            return Err(CalibrationError::ConcurrentCalibration);
        }
        info!(
            "Calibration started ({}s session)",
            self.config.duration_secs
        );
        self.session = Some(Session::default());
        Ok(())
    }

    /// Cancel the running session, leaving thresholds untouched
    pub fn abort(&mut self) -> Result<(), CalibrationError> {
        match self.session.take() {
            Some(session) => {
                info!(
                    "Calibration aborted after {} samples",
                    session.samples.len()
                );
                Ok(())
            }
            None => Err(CalibrationError::NotActive),
        }
    }

    /// Record one frame. `openness` is `None` for frames without a face,
    /// which still advance the session clock.
    ///
    /// Returns the session outcome on the frame that completes it.
    pub fn record(
        &mut self,
        timestamp_ms: u64,
        openness: Option<f64>,
    ) -> Option<Result<CalibrationReport, CalibrationError>> {
        let duration = self.config.duration_secs;
        let session = self.session.as_mut()?;

        let origin = *session.origin_ms.get_or_insert(timestamp_ms);
        let elapsed_secs = timestamp_ms.saturating_sub(origin) as f64 / 1000.0;
        session.elapsed_secs = elapsed_secs;

        if let Some(openness) = openness {
            if elapsed_secs <= duration {
                session.samples.push(CalibrationSample {
                    elapsed_secs,
                    openness,
                });
            }
        }

        if elapsed_secs >= duration {
            Some(self.finish())
        } else {
            None
        }
    }

    /// Close the running session and derive thresholds from its samples.
    ///
    /// On failure the session still ends and thresholds stay unchanged.
    pub fn finish(&mut self) -> Result<CalibrationReport, CalibrationError> {
        let session = self.session.take().ok_or(CalibrationError::NotActive)?;
        let samples = session.samples;

        if samples.len() < self.config.min_samples {
            warn!(
                "Calibration failed: {} samples, {} required",
                samples.len(),
                self.config.min_samples
            );
            return Err(CalibrationError::InsufficientSamples {
                got: samples.len(),
                required: self.config.min_samples,
            });
        }

        let baseline = weighted_mean(
            samples
                .iter()
                .map(|s| (s.openness, self.config.weight_at(s.elapsed_secs))),
        )
        .unwrap_or(0.0);

        if baseline < self.config.min_baseline {
            warn!("Calibration rejected implausible baseline {:.3}", baseline);
            return Err(CalibrationError::ImplausibleBaseline {
                baseline,
                minimum: self.config.min_baseline,
            });
        }

        let thresholds = Thresholds {
            baseline,
            warn_threshold: baseline * self.config.warn_ratio,
            crit_threshold: baseline * self.config.crit_ratio,
        };

        let openness: Vec<f64> = samples.iter().map(|s| s.openness).collect();
        let stats = StatisticalFeatures::compute(&openness);

        info!(
            "Calibration complete: baseline={:.3} warn={:.3} crit={:.3} ({} samples, sd {:.3})",
            thresholds.baseline,
            thresholds.warn_threshold,
            thresholds.crit_threshold,
            stats.count,
            stats.std_dev
        );
        self.thresholds = thresholds;

        Ok(CalibrationReport { thresholds, stats })
    }

    /// Raise the warn threshold by one step (crit by half a step).
    ///
    /// Refused once the warn threshold would pass `baseline * relax_cap_ratio`.
    pub fn relax(&mut self) -> Result<Thresholds, CalibrationError> {
        let step = self.config.relax_step;
        let cap = self.thresholds.baseline * self.config.relax_cap_ratio;
        let warn = self.thresholds.warn_threshold + step;

        if warn > cap {
            debug!("Relax refused: {:.3} would exceed cap {:.3}", warn, cap);
            return Err(CalibrationError::CannotRelaxFurther {
                warn: self.thresholds.warn_threshold,
                cap,
            });
        }

        self.thresholds.warn_threshold = warn;
        self.thresholds.crit_threshold += step / 2.0;
        info!(
            "Sensitivity relaxed: warn={:.3} crit={:.3}",
            self.thresholds.warn_threshold, self.thresholds.crit_threshold
        );
        Ok(self.thresholds)
    }

    /// Replace thresholds with validated manual values
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
    }
}
