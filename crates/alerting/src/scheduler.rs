//! Alert Cue Scheduler

use dms::{AlarmLevel, FrameEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Cue scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    /// How long an acknowledgement silences cues (seconds)
    pub snooze_secs: u64,
    /// Whether critical cues may be snoozed at all
    pub critical_snoozable: bool,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            snooze_secs: 60,
            critical_snoozable: false,
        }
    }
}

/// One audible/haptic cue for the presentation layer to play
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cue {
    pub level: AlarmLevel,
    pub timestamp_ms: u64,
    pub tone_hz: Option<f64>,
    pub vibration_ms: Option<u64>,
}

/// Cue history for one alarm level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CueState {
    /// Timestamp of the last cue at this level
    pub last_fired_ms: u64,
    /// Number of cues fired
    pub fire_count: usize,
    /// Whether the driver acknowledged this level
    pub acknowledged: bool,
}

/// Schedules cues from the stream of alarm levels
pub struct CueScheduler {
    config: CueConfig,
    /// Level of the previous frame
    level: AlarmLevel,
    /// Last cue time within the current level run
    last_fired_ms: Option<u64>,
    /// Cue history by level
    states: HashMap<AlarmLevel, CueState>,
    snoozed_until_ms: Option<u64>,
    /// Timestamp of the previous frame
    last_timestamp_ms: Option<u64>,
}

impl CueScheduler {
    /// Create a new cue scheduler
    pub fn new(config: CueConfig) -> Self {
        info!("Creating cue scheduler with config: {:?}", config);
        Self {
            config,
            level: AlarmLevel::Safe,
            last_fired_ms: None,
            states: HashMap::new(),
            snoozed_until_ms: None,
            last_timestamp_ms: None,
        }
    }

    /// Feed one processed frame
    pub fn on_event(&mut self, event: &FrameEvent) -> Option<Cue> {
        self.on_level(event.alarm_level, event.timestamp_ms)
    }

    /// Feed one frame's alarm level, returning a cue if one is due
    pub fn on_level(&mut self, level: AlarmLevel, timestamp_ms: u64) -> Option<Cue> {
        self.check_clock(timestamp_ms);

        if level != self.level {
            debug!(
                "Cue level {} -> {}",
                self.level.as_str(),
                level.as_str()
            );
            self.level = level;
            // A new level starts its own repetition cycle
            self.last_fired_ms = None;
            if level == AlarmLevel::Safe {
                self.snoozed_until_ms = None;
            }
        }

        if self.should_fire(level, timestamp_ms) {
            Some(self.record_fire(level, timestamp_ms))
        } else {
            None
        }
    }

    /// Re-anchor cue timing when the frame clock steps backwards.
    ///
    /// The repetition cycle restarts and a running snooze keeps only its
    /// remaining duration.
    fn check_clock(&mut self, timestamp_ms: u64) {
        if let Some(prev) = self.last_timestamp_ms.filter(|prev| timestamp_ms < *prev) {
            warn!(
                "Cue clock went backwards ({} -> {}), restarting cycle",
                prev, timestamp_ms
            );
            self.last_fired_ms = None;
            self.snoozed_until_ms = self
                .snoozed_until_ms
                .map(|until| timestamp_ms.saturating_add(until.saturating_sub(prev)));
        }
        self.last_timestamp_ms = Some(timestamp_ms);
    }

    /// Check if a cue is due at `level`
    fn should_fire(&self, level: AlarmLevel, timestamp_ms: u64) -> bool {
        let cadence = level.cadence();
        let Some(interval) = cadence.repeat_interval_ms else {
            return false;
        };

        if self.is_snoozed(level, timestamp_ms) {
            debug!("Cue suppressed: snoozed");
            return false;
        }

        match self.last_fired_ms {
            None => true,
            Some(last) => timestamp_ms.saturating_sub(last) >= interval,
        }
    }

    fn is_snoozed(&self, level: AlarmLevel, timestamp_ms: u64) -> bool {
        let snoozable = level != AlarmLevel::Critical || self.config.critical_snoozable;
        snoozable && self.snoozed_until_ms.is_some_and(|until| timestamp_ms < until)
    }

    fn record_fire(&mut self, level: AlarmLevel, timestamp_ms: u64) -> Cue {
        self.last_fired_ms = Some(timestamp_ms);

        let state = self.states.entry(level).or_insert(CueState {
            last_fired_ms: timestamp_ms,
            fire_count: 0,
            acknowledged: false,
        });
        state.last_fired_ms = timestamp_ms;
        state.fire_count += 1;
        state.acknowledged = false;

        debug!("Cue fired: {} (count: {})", level.as_str(), state.fire_count);

        let cadence = level.cadence();
        Cue {
            level,
            timestamp_ms,
            tone_hz: cadence.tone_hz,
            vibration_ms: cadence.vibration_ms,
        }
    }

    /// Acknowledge the current level, snoozing its cues.
    ///
    /// Returns false when there is nothing to snooze.
    pub fn acknowledge(&mut self, timestamp_ms: u64) -> bool {
        let level = self.level;
        if !level.cadence().is_audible()
            || (level == AlarmLevel::Critical && !self.config.critical_snoozable)
        {
            return false;
        }

        let snooze_ms = self.config.snooze_secs.saturating_mul(1000);
        self.snoozed_until_ms = Some(timestamp_ms.saturating_add(snooze_ms));
        if let Some(state) = self.states.get_mut(&level) {
            state.acknowledged = true;
        }
        info!(
            "Cue acknowledged: {} snoozed for {}s",
            level.as_str(),
            self.config.snooze_secs
        );
        true
    }

    /// Cue history of one level
    pub fn state(&self, level: AlarmLevel) -> Option<&CueState> {
        self.states.get(&level)
    }

    /// Number of cues fired at `level`
    pub fn fire_count(&self, level: AlarmLevel) -> usize {
        self.states.get(&level).map_or(0, |s| s.fire_count)
    }

    /// Levels with unacknowledged cues
    pub fn pending(&self) -> Vec<(AlarmLevel, &CueState)> {
        let mut pending: Vec<_> = self
            .states
            .iter()
            .filter(|(_, state)| !state.acknowledged)
            .map(|(level, state)| (*level, state))
            .collect();
        pending.sort_by(|a, b| b.0.cmp(&a.0));
        pending
    }

    /// Clear all cue history
    pub fn clear(&mut self) {
        self.level = AlarmLevel::Safe;
        self.last_fired_ms = None;
        self.states.clear();
        self.snoozed_until_ms = None;
        self.last_timestamp_ms = None;
    }
}

impl Default for CueScheduler {
    fn default() -> Self {
        Self::new(CueConfig::default())
    }
}
