//! DMS engine configuration

use std::path::Path;

use data_validator::ValidationConfig;
use feature_engine::{GeometryConfig, StageFlags};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alarm::AlarmConfig;
use crate::calibration::CalibrationConfig;
use crate::state::AccumulatorConfig;
use crate::strategy::StrategyConfig;
use crate::thresholds::Thresholds;
use crate::DmsError;

/// Optional defense stages, toggled at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenseFlags {
    /// Correct openness for head pitch
    pub pose_compensation: bool,
    /// Add an openness bonus while the driver looks down
    pub iris_correction: bool,
    /// Tighten thresholds while the strategy is aggressive
    pub dual_calibration: bool,
}

impl Default for DefenseFlags {
    fn default() -> Self {
        Self {
            pose_compensation: true,
            iris_correction: false,
            dual_calibration: true,
        }
    }
}

impl DefenseFlags {
    /// Geometry stages enabled by these flags
    pub fn stages(&self) -> StageFlags {
        StageFlags {
            pose_compensation: self.pose_compensation,
            iris_correction: self.iris_correction,
        }
    }
}

/// How fatigue tracking behaves while a calibration session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationCoupling {
    /// Accumulator, strategy and alarm are frozen
    #[default]
    Paused,
    /// Fatigue tracking keeps running alongside calibration
    Shadow,
}

/// DMS engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Baseline assumed before the first calibration
    pub initial_baseline: f64,

    /// Consecutive no-face frames before the event flags the face as lost
    pub face_lost_frames: u32,

    pub calibration_coupling: CalibrationCoupling,
    pub defense: DefenseFlags,
    pub validation: ValidationConfig,
    pub geometry: GeometryConfig,
    pub calibration: CalibrationConfig,
    pub accumulator: AccumulatorConfig,
    pub alarm: AlarmConfig,
    pub strategy: StrategyConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            initial_baseline: 0.30,
            face_lost_frames: 30,
            calibration_coupling: CalibrationCoupling::default(),
            defense: DefenseFlags::default(),
            validation: ValidationConfig::default(),
            geometry: GeometryConfig::default(),
            calibration: CalibrationConfig::default(),
            accumulator: AccumulatorConfig::default(),
            alarm: AlarmConfig::default(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl DmsConfig {
    /// Create strict config (alarms sooner)
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.alarm = AlarmConfig {
            critical_closed_secs: 1.5,
            critical_perclos: 0.6,
            warning_closed_secs: 0.75,
        };
        config.strategy.escalate_perclos = 0.2;
        config
    }

    /// Create lenient config (alarms later)
    pub fn lenient() -> Self {
        let mut config = Self::default();
        config.alarm = AlarmConfig {
            critical_closed_secs: 3.0,
            critical_perclos: 0.9,
            warning_closed_secs: 1.5,
        };
        config.strategy.escalate_perclos = 0.4;
        config
    }

    /// Load configuration from an optional file layered under `DMS__*`
    /// environment variables (e.g. `DMS__ALARM__CRITICAL_CLOSED_SECS=2.5`).
    pub fn load(path: Option<&Path>) -> Result<Self, DmsError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!("Loading DMS config from {}", path.display());
            builder = builder.add_source(::config::File::from(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("DMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DmsError::Config(e.to_string()))?;

        let config: DmsConfig = settings
            .try_deserialize()
            .map_err(|e| DmsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Thresholds assumed before calibration
    pub fn initial_thresholds(&self) -> Result<Thresholds, DmsError> {
        Thresholds::from_baseline(
            self.initial_baseline,
            self.calibration.warn_ratio,
            self.calibration.crit_ratio,
        )
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        let fail = |msg: &str| Err(DmsError::Config(msg.to_string()));

        if !self.float_fields().iter().all(|v| v.is_finite()) {
            return fail("numeric config values must be finite");
        }
        if self.face_lost_frames == 0 {
            return fail("face_lost_frames must be at least 1");
        }
        let (min, max) = self.validation.coordinate_range;
        if min >= max {
            return fail("coordinate_range must satisfy min < max");
        }

        self.initial_thresholds()?;

        let cal = &self.calibration;
        if !(cal.crit_ratio > 0.0 && cal.crit_ratio < cal.warn_ratio && cal.warn_ratio <= 1.0) {
            return fail("calibration ratios must satisfy 0 < crit_ratio < warn_ratio <= 1");
        }
        if !(cal.relax_cap_ratio >= cal.warn_ratio && cal.relax_cap_ratio <= 1.0) {
            return fail("relax_cap_ratio must lie in [warn_ratio, 1]");
        }
        if !(cal.duration_secs > 0.0
            && cal.lead_band_end_secs >= 0.0
            && cal.lead_band_end_secs <= cal.tail_band_start_secs
            && cal.tail_band_start_secs <= cal.duration_secs)
        {
            return fail("calibration bands must satisfy 0 <= lead_end <= tail_start <= duration");
        }
        if cal.min_samples == 0 || cal.edge_weight < 0.0 || cal.core_weight <= 0.0 {
            return fail("calibration needs min_samples > 0 and a positive core weight");
        }
        if cal.relax_step <= 0.0 {
            return fail("relax_step must be positive");
        }

        let acc = &self.accumulator;
        if acc.critical_rate < 0.0 || acc.warning_rate < 0.0 || acc.recovery_rate < 0.0 {
            return fail("accumulator rates must not be negative");
        }
        if acc.max_frame_dt_secs <= 0.0 {
            return fail("max_frame_dt_secs must be positive");
        }
        if acc.perclos_capacity == 0 {
            return fail("perclos_capacity must be at least 1");
        }

        let alarm = &self.alarm;
        if !(alarm.warning_closed_secs > 0.0 && alarm.critical_perclos > 0.0) {
            return fail("alarm thresholds must be positive");
        }
        if alarm.warning_closed_secs > alarm.critical_closed_secs {
            return fail("warning_closed_secs must not exceed critical_closed_secs");
        }

        let strategy = &self.strategy;
        if !(strategy.escalate_perclos > 0.0 && strategy.escalate_closed_secs > 0.0) {
            return fail("strategy escalation thresholds must be positive");
        }
        if strategy.recovery_perclos > strategy.escalate_perclos {
            return fail("recovery_perclos must not exceed escalate_perclos");
        }
        if strategy.recovery_secs <= 0.0 || strategy.aggressive_scale < 1.0 {
            return fail("strategy needs recovery_secs > 0 and aggressive_scale >= 1");
        }

        Ok(())
    }

    fn float_fields(&self) -> [f64; 28] {
        let cal = &self.calibration;
        let acc = &self.accumulator;
        let geo = &self.geometry;
        [
            self.initial_baseline,
            self.validation.coordinate_range.0,
            self.validation.coordinate_range.1,
            geo.pose_compensation_k,
            geo.looking_down_threshold,
            geo.looking_down_bonus,
            cal.duration_secs,
            cal.lead_band_end_secs,
            cal.tail_band_start_secs,
            cal.edge_weight,
            cal.core_weight,
            cal.warn_ratio,
            cal.crit_ratio,
            cal.min_baseline,
            cal.relax_step,
            cal.relax_cap_ratio,
            acc.critical_rate,
            acc.warning_rate,
            acc.recovery_rate,
            acc.max_frame_dt_secs,
            self.alarm.critical_closed_secs,
            self.alarm.critical_perclos,
            self.alarm.warning_closed_secs,
            self.strategy.escalate_perclos,
            self.strategy.escalate_closed_secs,
            self.strategy.recovery_perclos,
            self.strategy.recovery_secs,
            self.strategy.aggressive_scale,
        ]
    }
}
