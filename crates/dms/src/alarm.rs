//! Alarm level state machine

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Alarm severity, recomputed every frame
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum AlarmLevel {
    #[default]
    Safe,
    /// L1: eyes below the warn threshold
    Attention,
    /// L2: sustained closure
    Warning,
    /// L3: long closure or very high PERCLOS
    Critical,
}

impl AlarmLevel {
    /// String representation for logs and presentation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmLevel::Safe => "safe",
            AlarmLevel::Attention => "attention",
            AlarmLevel::Warning => "warning",
            AlarmLevel::Critical => "critical",
        }
    }

    /// Suggested alert cadence for the presentation layer
    pub fn cadence(&self) -> AlertCadence {
        match self {
            AlarmLevel::Safe => AlertCadence::default(),
            AlarmLevel::Attention => AlertCadence {
                visual: true,
                ..Default::default()
            },
            AlarmLevel::Warning => AlertCadence {
                repeat_interval_ms: Some(2_000),
                tone_hz: Some(660.0),
                vibration_ms: None,
                visual: true,
            },
            AlarmLevel::Critical => AlertCadence {
                repeat_interval_ms: Some(500),
                tone_hz: Some(880.0),
                vibration_ms: Some(200),
                visual: true,
            },
        }
    }
}

/// How often and how loudly a level should be signalled.
///
/// The engine never performs the I/O itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertCadence {
    /// Repeat the audible cue this often while the level holds
    pub repeat_interval_ms: Option<u64>,
    /// Tone frequency of the audible cue
    pub tone_hz: Option<f64>,
    /// Vibration pulse length
    pub vibration_ms: Option<u64>,
    /// Show a visual indicator
    pub visual: bool,
}

impl AlertCadence {
    pub fn is_audible(&self) -> bool {
        self.tone_hz.is_some()
    }
}

/// Alarm thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Closed-seconds above which the level is critical
    pub critical_closed_secs: f64,
    /// PERCLOS above which the level is critical
    pub critical_perclos: f64,
    /// Closed-seconds above which the level is warning
    pub warning_closed_secs: f64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            critical_closed_secs: 2.0,
            critical_perclos: 0.8,
            warning_closed_secs: 1.0,
        }
    }
}

/// Per-frame alarm output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub level: AlarmLevel,
    pub timestamp_ms: u64,
    /// True only on the frame that enters a new critical excursion
    pub is_new_critical_edge: bool,
}

/// Maps fatigue state to an alarm level and counts critical excursions
#[derive(Debug, Clone)]
pub struct AlarmStateMachine {
    config: AlarmConfig,
    level: AlarmLevel,
    /// Set while inside a critical excursion that has been counted
    critical_latched: bool,
    critical_count: u64,
}

impl AlarmStateMachine {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            config,
            level: AlarmLevel::Safe,
            critical_latched: false,
            critical_count: 0,
        }
    }

    /// Level for the given state, without touching the machine
    pub fn classify(&self, closed_seconds: f64, perclos: f64, is_warning: bool) -> AlarmLevel {
        if closed_seconds > self.config.critical_closed_secs
            || perclos > self.config.critical_perclos
        {
            AlarmLevel::Critical
        } else if closed_seconds > self.config.warning_closed_secs {
            AlarmLevel::Warning
        } else if is_warning {
            AlarmLevel::Attention
        } else {
            AlarmLevel::Safe
        }
    }

    /// Evaluate one frame
    pub fn evaluate(
        &mut self,
        closed_seconds: f64,
        perclos: f64,
        is_warning: bool,
        timestamp_ms: u64,
    ) -> AlarmEvent {
        let level = self.classify(closed_seconds, perclos, is_warning);

        let is_new_critical_edge = if level == AlarmLevel::Critical {
            let edge = !self.critical_latched;
            self.critical_latched = true;
            edge
        } else {
            self.critical_latched = false;
            false
        };

        if is_new_critical_edge {
            self.critical_count += 1;
            metrics::counter!("dms_critical_entries_total").increment(1);
            info!(
                "CRITICAL drowsiness alarm #{} (closed {:.2}s, perclos {:.2})",
                self.critical_count, closed_seconds, perclos
            );
        }

        if level != self.level {
            debug!(
                "Alarm level {} -> {}",
                self.level.as_str(),
                level.as_str()
            );
            self.level = level;
        }

        AlarmEvent {
            level,
            timestamp_ms,
            is_new_critical_edge,
        }
    }

    /// Level of the last evaluated frame
    pub fn level(&self) -> AlarmLevel {
        self.level
    }

    /// Number of distinct critical excursions so far
    pub fn critical_count(&self) -> u64 {
        self.critical_count
    }

    pub fn reset(&mut self) {
        self.level = AlarmLevel::Safe;
        self.critical_latched = false;
        self.critical_count = 0;
    }
}

impl Default for AlarmStateMachine {
    fn default() -> Self {
        Self::new(AlarmConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_selection() {
        let machine = AlarmStateMachine::default();
        assert_eq!(machine.classify(0.0, 0.0, false), AlarmLevel::Safe);
        assert_eq!(machine.classify(0.0, 0.0, true), AlarmLevel::Attention);
        assert_eq!(machine.classify(1.5, 0.0, true), AlarmLevel::Warning);
        assert_eq!(machine.classify(1.5, 0.0, false), AlarmLevel::Warning);
        assert_eq!(machine.classify(2.1, 0.0, false), AlarmLevel::Critical);
        assert_eq!(machine.classify(0.0, 0.81, false), AlarmLevel::Critical);
        // Boundaries are exclusive
        assert_eq!(machine.classify(2.0, 0.8, false), AlarmLevel::Warning);
        assert_eq!(machine.classify(1.0, 0.0, false), AlarmLevel::Safe);
    }

    #[test]
    fn test_can_jump_straight_to_critical() {
        let mut machine = AlarmStateMachine::default();
        let event = machine.evaluate(0.0, 0.9, false, 0);
        assert_eq!(event.level, AlarmLevel::Critical);
        assert!(event.is_new_critical_edge);
    }

    #[test]
    fn test_critical_edge_fires_once_per_excursion() {
        let mut machine = AlarmStateMachine::default();
        let mut edges = 0;
        // Sweep closed-seconds 0 -> 3 in 1ms-of-closure steps
        for step in 0..=3000u64 {
            let closed = step as f64 / 1000.0;
            let event = machine.evaluate(closed, 0.0, true, step);
            if event.is_new_critical_edge {
                edges += 1;
                assert!(closed > 2.0);
                assert!(closed < 2.01);
            }
        }
        assert_eq!(edges, 1);
        assert_eq!(machine.critical_count(), 1);
        assert_eq!(machine.level(), AlarmLevel::Critical);
    }

    #[test]
    fn test_new_excursion_counts_again() {
        let mut machine = AlarmStateMachine::default();
        assert!(machine.evaluate(2.5, 0.0, true, 0).is_new_critical_edge);
        assert!(!machine.evaluate(2.6, 0.0, true, 33).is_new_critical_edge);
        // Drops to warning, then back up
        assert!(!machine.evaluate(1.5, 0.0, true, 66).is_new_critical_edge);
        assert!(machine.evaluate(2.5, 0.0, true, 99).is_new_critical_edge);
        assert_eq!(machine.critical_count(), 2);
    }

    #[test]
    fn test_cadence_escalates_with_level() {
        assert!(!AlarmLevel::Safe.cadence().visual);
        assert!(!AlarmLevel::Attention.cadence().is_audible());
        assert!(AlarmLevel::Warning.cadence().is_audible());
        let critical = AlarmLevel::Critical.cadence();
        assert_eq!(critical.repeat_interval_ms, Some(500));
        assert_eq!(critical.vibration_ms, Some(200));
        assert!(AlarmLevel::Critical > AlarmLevel::Warning);
    }

    #[test]
    fn test_reset() {
        let mut machine = AlarmStateMachine::default();
        machine.evaluate(3.0, 0.0, true, 0);
        machine.reset();
        assert_eq!(machine.level(), AlarmLevel::Safe);
        assert_eq!(machine.critical_count(), 0);
        assert!(machine.evaluate(3.0, 0.0, true, 33).is_new_critical_edge);
    }
}
