//! DMS per-frame analysis results

use feature_engine::{EyeMetrics, HeadPose};
use serde::Serialize;

use crate::alarm::{AlarmEvent, AlarmLevel, AlertCadence};
use crate::calibration::{CalibrationError, CalibrationReport, CalibrationStatus};
use crate::strategy::StrategyMode;
use crate::thresholds::Thresholds;

/// Complete result of one processed frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEvent {
    /// Frame timestamp (milliseconds)
    pub timestamp_ms: u64,

    /// Whether a face was present
    pub face_detected: bool,

    /// Consecutive frames without a face, including this one
    pub face_absent_frames: u32,

    /// Face has been absent long enough to warn about the camera view
    pub face_lost: bool,

    /// Eye metrics (if a face was present)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EyeMetrics>,

    /// Average openness after correction stages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_openness: Option<f64>,

    /// Head pose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<HeadPose>,

    /// Fraction of recent frames below the warn threshold
    pub perclos_value: f64,

    /// Accumulated eyes-closed duration (seconds)
    pub closed_seconds: f64,

    /// Current alarm level
    pub alarm_level: AlarmLevel,

    /// This frame entered a new critical excursion
    pub critical_edge_fired: bool,

    /// Critical excursions since the last reset
    pub critical_count: u64,

    /// Suggested presentation cadence for `alarm_level`
    pub cadence: AlertCadence,

    pub strategy_mode: StrategyMode,

    /// Thresholds applied to this frame
    pub active_thresholds: Thresholds,

    pub calibration: CalibrationStatus,

    /// Outcome of a calibration session that completed on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_result: Option<Result<CalibrationReport, CalibrationError>>,
}

impl FrameEvent {
    /// Alarm output of this frame
    pub fn alarm_event(&self) -> AlarmEvent {
        AlarmEvent {
            level: self.alarm_level,
            timestamp_ms: self.timestamp_ms,
            is_new_critical_edge: self.critical_edge_fired,
        }
    }

    /// Check if the driver should be alerted
    pub fn is_alarming(&self) -> bool {
        self.alarm_level >= AlarmLevel::Warning
    }

    /// Calibration finished successfully on this frame
    pub fn calibration_succeeded(&self) -> bool {
        matches!(self.calibration_result, Some(Ok(_)))
    }
}
