//! Driver fatigue state tracking

use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::thresholds::Thresholds;

/// Fatigue accumulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// Closed-seconds gained per second below the crit threshold
    pub critical_rate: f64,
    /// Closed-seconds gained per second below the warn threshold
    pub warning_rate: f64,
    /// Closed-seconds drained per second above the warn threshold
    pub recovery_rate: f64,
    /// Longest frame gap integrated as a single step (seconds)
    pub max_frame_dt_secs: f64,
    /// PERCLOS window length (frames)
    pub perclos_capacity: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            critical_rate: 2.0,
            warning_rate: 0.3,
            recovery_rate: 2.0,
            max_frame_dt_secs: 1.0,
            perclos_capacity: ring_buffer::DEFAULT_CAPACITY,
        }
    }
}

/// Measures real elapsed time between frames
#[derive(Debug, Clone)]
pub struct FrameClock {
    last_ms: Option<u64>,
    max_dt_secs: f64,
}

impl FrameClock {
    pub fn new(max_dt_secs: f64) -> Self {
        Self {
            last_ms: None,
            max_dt_secs,
        }
    }

    /// Seconds since the previous tick (0 on the first tick).
    ///
    /// Timestamps that go backwards yield 0 and re-anchor the clock.
    pub fn tick(&mut self, timestamp_ms: u64) -> f64 {
        let dt = match self.last_ms {
            None => 0.0,
            Some(last) if timestamp_ms < last => {
                warn!(
                    "Frame timestamp went backwards ({} -> {}), treating as zero dt",
                    last, timestamp_ms
                );
                0.0
            }
            Some(last) => ((timestamp_ms - last) as f64 / 1000.0).min(self.max_dt_secs),
        };
        self.last_ms = Some(timestamp_ms);
        dt
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

/// Openness classification for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Openness below the warn threshold
    pub is_warning: bool,
    /// Openness below the crit threshold
    pub is_critical: bool,
}

impl Classification {
    pub fn classify(openness: f64, thresholds: &Thresholds) -> Self {
        Self {
            is_warning: openness < thresholds.warn_threshold,
            is_critical: openness < thresholds.crit_threshold,
        }
    }
}

/// Hysteretic leaky integrator of eyes-closed time
#[derive(Debug, Clone)]
pub struct FatigueAccumulator {
    config: AccumulatorConfig,
    closed_seconds: f64,
}

impl FatigueAccumulator {
    pub fn new(config: AccumulatorConfig) -> Self {
        Self {
            config,
            closed_seconds: 0.0,
        }
    }

    /// Integrate one frame of `dt` seconds
    pub fn update(&mut self, openness: f64, thresholds: &Thresholds, dt: f64) -> Classification {
        let class = Classification::classify(openness, thresholds);

        if class.is_critical {
            self.closed_seconds += dt * self.config.critical_rate;
        } else if class.is_warning {
            self.closed_seconds += dt * self.config.warning_rate;
        } else {
            self.closed_seconds = (self.closed_seconds - dt * self.config.recovery_rate).max(0.0);
        }

        class
    }

    /// Accumulated eyes-closed duration (seconds, never negative)
    pub fn closed_seconds(&self) -> f64 {
        self.closed_seconds
    }

    pub fn reset(&mut self) {
        self.closed_seconds = 0.0;
    }
}

/// Sliding PERCLOS window over per-frame warning flags
#[derive(Debug, Clone)]
pub struct PerclosWindow {
    window: RingBuffer<bool>,
}

impl PerclosWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RingBuffer::new(capacity),
        }
    }

    /// Add one frame's warning flag
    pub fn push(&mut self, is_warning: bool) {
        self.window.push(is_warning);
    }

    /// Fraction of frames in the window flagged as warning (0 when empty)
    pub fn value(&self) -> f64 {
        self.window.ratio_where(|closed| *closed)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Snapshot of fatigue state reported with each frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FatigueState {
    pub closed_seconds: f64,
    pub perclos_value: f64,
    pub window_len: usize,
}
