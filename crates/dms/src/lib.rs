//! Driver Monitoring System (DMS)
//!
//! Frame-synchronous drowsiness engine over face-mesh landmarks:
//! - Eye openness with optional pose and iris corrections
//! - Personalized thresholds from a timed calibration session
//! - Time-based eyes-closed accumulator and PERCLOS window
//! - Graded alarm levels with once-per-excursion critical edges
//! - Conservative/aggressive sensitivity with hysteresis
//!
//! The engine performs no I/O. Each processed frame yields a [`FrameEvent`]
//! for the presentation layer.

pub mod alarm;
pub mod analysis;
pub mod calibration;
pub mod command;
pub mod config;
pub mod state;
pub mod strategy;
pub mod thresholds;

pub use alarm::{AlarmConfig, AlarmEvent, AlarmLevel, AlarmStateMachine, AlertCadence};
pub use analysis::FrameEvent;
pub use calibration::{
    CalibrationConfig, CalibrationController, CalibrationError, CalibrationReport,
    CalibrationStatus,
};
pub use command::{CommandOutcome, EngineCommand};
pub use config::{CalibrationCoupling, DefenseFlags, DmsConfig};
pub use state::{AccumulatorConfig, FatigueAccumulator, FatigueState, FrameClock, PerclosWindow};
pub use strategy::{StrategyConfig, StrategyMode, StrategySelector};
pub use thresholds::Thresholds;

use data_validator::{FrameValidator, ValidationError};
use feature_engine::{
    EyeMetrics, FrameDims, GeometryError, GeometryExtractor, LandmarkFrame, Orientation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// DMS error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DmsError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] ValidationError),

    #[error("Geometry extraction failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// One frame of tracker output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInput {
    /// Capture timestamp (milliseconds)
    pub timestamp_ms: u64,

    /// Face-mesh landmarks, `None` when no face was found
    #[serde(default)]
    pub landmarks: Option<LandmarkFrame>,

    /// Frame width (pixels)
    pub width: f64,

    /// Frame height (pixels)
    pub height: f64,

    #[serde(default)]
    pub orientation: Orientation,
}

impl FrameInput {
    pub fn new(timestamp_ms: u64, landmarks: Option<LandmarkFrame>, dims: FrameDims) -> Self {
        Self {
            timestamp_ms,
            landmarks,
            width: dims.width,
            height: dims.height,
            orientation: Orientation::default(),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.width, self.height)
    }
}

/// Driver fatigue engine
pub struct FatigueEngine {
    config: DmsConfig,
    validator: FrameValidator,
    extractor: GeometryExtractor,
    calibration: CalibrationController,
    clock: FrameClock,
    accumulator: FatigueAccumulator,
    perclos: PerclosWindow,
    strategy: StrategySelector,
    alarm: AlarmStateMachine,
    defense: DefenseFlags,
    face_absent_frames: u32,
}

impl FatigueEngine {
    /// Create a new engine with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        let thresholds = config.initial_thresholds()?;

        info!(
            "DMS engine ready: baseline={:.3} warn={:.3} crit={:.3}, coupling {:?}",
            thresholds.baseline,
            thresholds.warn_threshold,
            thresholds.crit_threshold,
            config.calibration_coupling
        );

        Ok(Self {
            validator: FrameValidator::new(config.validation.clone()),
            extractor: GeometryExtractor::new(config.geometry.clone()),
            calibration: CalibrationController::new(config.calibration.clone(), thresholds),
            clock: FrameClock::new(config.accumulator.max_frame_dt_secs),
            accumulator: FatigueAccumulator::new(config.accumulator.clone()),
            perclos: PerclosWindow::new(config.accumulator.perclos_capacity),
            strategy: StrategySelector::new(config.strategy.clone()),
            alarm: AlarmStateMachine::new(config.alarm.clone()),
            defense: config.defense,
            face_absent_frames: 0,
            config,
        })
    }

    /// Process one frame.
    ///
    /// Invalid or degenerate frames return an error and leave every piece of
    /// engine state untouched, the frame clock included.
    pub fn process(&mut self, input: FrameInput) -> Result<FrameEvent, DmsError> {
        let timestamp_ms = input.timestamp_ms;
        let dims = input.dims();

        let Some(landmarks) = input.landmarks.as_ref() else {
            return Ok(self.process_no_face(timestamp_ms));
        };

        let metrics = self
            .analyze(landmarks, dims, input.orientation)
            .inspect_err(|e| {
                warn!("Skipping frame at {}ms: {}", timestamp_ms, e);
                metrics::counter!("dms_frames_skipped_total").increment(1);
            })?;

        self.face_absent_frames = 0;
        let dt = self.clock.tick(timestamp_ms);

        let calibrating = self.calibration.is_active();
        let calibration_result = self
            .calibration
            .record(timestamp_ms, Some(metrics.avg_openness));

        let active = self.active_thresholds();
        let frozen =
            calibrating && self.config.calibration_coupling == CalibrationCoupling::Paused;

        let critical_edge_fired = if frozen {
            false
        } else {
            self.update_fatigue(metrics.avg_openness, &active, dt, timestamp_ms)
        };

        Ok(self.event(
            timestamp_ms,
            Some(metrics),
            active,
            critical_edge_fired,
            calibration_result,
        ))
    }

    fn analyze(
        &mut self,
        landmarks: &LandmarkFrame,
        dims: FrameDims,
        orientation: Orientation,
    ) -> Result<EyeMetrics, DmsError> {
        self.validator.validate(landmarks, dims)?;
        let metrics = self
            .extractor
            .extract(landmarks, dims, orientation, self.defense.stages())?;
        Ok(metrics)
    }

    /// No face: report liveness, keep fatigue state, advance the clocks
    fn process_no_face(&mut self, timestamp_ms: u64) -> FrameEvent {
        self.face_absent_frames = self.face_absent_frames.saturating_add(1);
        if self.face_absent_frames == self.config.face_lost_frames {
            warn!(
                "Face not visible for {} frames (camera blocked?)",
                self.face_absent_frames
            );
        }

        self.clock.tick(timestamp_ms);
        let calibration_result = self.calibration.record(timestamp_ms, None);
        let active = self.active_thresholds();

        self.event(timestamp_ms, None, active, false, calibration_result)
    }

    /// Accumulator, PERCLOS, strategy, alarm. Returns the critical edge flag.
    fn update_fatigue(
        &mut self,
        openness: f64,
        active: &Thresholds,
        dt: f64,
        timestamp_ms: u64,
    ) -> bool {
        let class = self.accumulator.update(openness, active, dt);
        self.perclos.push(class.is_warning);

        let closed_seconds = self.accumulator.closed_seconds();
        let perclos = self.perclos.value();
        metrics::gauge!("dms_perclos").set(perclos);

        self.strategy.update(perclos, closed_seconds, dt);
        let alarm = self
            .alarm
            .evaluate(closed_seconds, perclos, class.is_warning, timestamp_ms);

        debug!(
            "frame {}ms: openness={:.3} closed={:.2}s perclos={:.2} level={}",
            timestamp_ms,
            openness,
            closed_seconds,
            perclos,
            alarm.level.as_str()
        );

        alarm.is_new_critical_edge
    }

    fn event(
        &self,
        timestamp_ms: u64,
        metrics: Option<EyeMetrics>,
        active_thresholds: Thresholds,
        critical_edge_fired: bool,
        calibration_result: Option<Result<CalibrationReport, CalibrationError>>,
    ) -> FrameEvent {
        let alarm_level = self.alarm.level();
        FrameEvent {
            timestamp_ms,
            face_detected: metrics.is_some(),
            face_absent_frames: self.face_absent_frames,
            face_lost: self.face_absent_frames >= self.config.face_lost_frames,
            avg_openness: metrics.map(|m| m.avg_openness),
            pose: metrics.map(|m| m.pose),
            metrics,
            perclos_value: self.perclos.value(),
            closed_seconds: self.accumulator.closed_seconds(),
            alarm_level,
            critical_edge_fired,
            critical_count: self.alarm.critical_count(),
            cadence: alarm_level.cadence(),
            strategy_mode: self.strategy.mode(),
            active_thresholds,
            calibration: self.calibration.status(),
            calibration_result,
        }
    }

    /// Begin a calibration session
    pub fn start_calibration(&mut self) -> Result<(), DmsError> {
        Ok(self.calibration.start()?)
    }

    /// Cancel the running calibration session
    pub fn abort_calibration(&mut self) -> Result<(), DmsError> {
        Ok(self.calibration.abort()?)
    }

    /// Loosen the thresholds one step after a false alarm
    pub fn relax_sensitivity(&mut self) -> Result<Thresholds, DmsError> {
        Ok(self.calibration.relax()?)
    }

    /// Replace thresholds manually. Values breaking the ordering invariant
    /// are rejected and the previous thresholds kept.
    pub fn override_thresholds(&mut self, thresholds: Thresholds) -> Result<(), DmsError> {
        thresholds.validate()?;
        info!(
            "Thresholds overridden: baseline={:.3} warn={:.3} crit={:.3}",
            thresholds.baseline, thresholds.warn_threshold, thresholds.crit_threshold
        );
        self.calibration.set_thresholds(thresholds);
        Ok(())
    }

    pub fn set_defense_flags(&mut self, flags: DefenseFlags) {
        if flags != self.defense {
            info!("Defense flags changed: {:?}", flags);
        }
        self.defense = flags;
    }

    /// Reset driver state (on driver change). Thresholds are retained.
    pub fn reset(&mut self) {
        if self.calibration.abort().is_ok() {
            debug!("Reset aborted the running calibration");
        }
        self.clock.reset();
        self.extractor.reset();
        self.accumulator.reset();
        self.perclos.reset();
        self.strategy.reset();
        self.alarm.reset();
        self.face_absent_frames = 0;
        info!("DMS state reset");
    }

    /// Stored (calibrated or overridden) thresholds
    pub fn thresholds(&self) -> Thresholds {
        self.calibration.thresholds()
    }

    /// Thresholds in force for the current strategy mode
    pub fn active_thresholds(&self) -> Thresholds {
        self.strategy
            .active_thresholds(&self.calibration.thresholds(), self.defense.dual_calibration)
    }

    pub fn strategy_mode(&self) -> StrategyMode {
        self.strategy.mode()
    }

    pub fn defense_flags(&self) -> DefenseFlags {
        self.defense
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibration.status()
    }

    pub fn critical_count(&self) -> u64 {
        self.alarm.critical_count()
    }

    pub fn alarm_level(&self) -> AlarmLevel {
        self.alarm.level()
    }

    pub fn fatigue_state(&self) -> FatigueState {
        FatigueState {
            closed_seconds: self.accumulator.closed_seconds(),
            perclos_value: self.perclos.value(),
            window_len: self.perclos.len(),
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}
