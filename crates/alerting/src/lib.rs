//! Alerting System
//!
//! Turns per-frame alarm levels into discrete audible/vibration cues,
//! repeated at each level's cadence and snoozable by the driver.

mod scheduler;

pub use scheduler::{Cue, CueConfig, CueScheduler, CueState};
