//! Sensitivity strategy selection with time-based hysteresis

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::thresholds::Thresholds;

/// Active sensitivity profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyMode {
    #[default]
    Conservative,
    Aggressive,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMode::Conservative => "conservative",
            StrategyMode::Aggressive => "aggressive",
        }
    }
}

/// Strategy switching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// PERCLOS above which the aggressive profile engages
    pub escalate_perclos: f64,
    /// Closed-seconds above which the aggressive profile engages
    pub escalate_closed_secs: f64,
    /// PERCLOS below which a frame counts toward recovery
    pub recovery_perclos: f64,
    /// Continuous recovery time needed to return to conservative (seconds)
    pub recovery_secs: f64,
    /// Threshold multiplier applied in aggressive mode
    pub aggressive_scale: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            escalate_perclos: 0.3,
            escalate_closed_secs: 1.0,
            recovery_perclos: 0.15,
            recovery_secs: 15.0,
            aggressive_scale: 1.1,
        }
    }
}

/// Switches between conservative and aggressive profiles
#[derive(Debug, Clone)]
pub struct StrategySelector {
    config: StrategyConfig,
    mode: StrategyMode,
    /// Continuous seconds of calm observed while aggressive
    recovery_secs: f64,
}

impl StrategySelector {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            mode: StrategyMode::Conservative,
            recovery_secs: 0.0,
        }
    }

    /// Advance by one frame of `dt` seconds
    pub fn update(&mut self, perclos: f64, closed_seconds: f64, dt: f64) -> StrategyMode {
        match self.mode {
            StrategyMode::Conservative => {
                if perclos > self.config.escalate_perclos
                    || closed_seconds > self.config.escalate_closed_secs
                {
                    info!(
                        "Strategy -> aggressive (perclos {:.2}, closed {:.2}s)",
                        perclos, closed_seconds
                    );
                    self.mode = StrategyMode::Aggressive;
                    self.recovery_secs = 0.0;
                }
            }
            StrategyMode::Aggressive => {
                if perclos < self.config.recovery_perclos && closed_seconds == 0.0 {
                    self.recovery_secs += dt;
                    if self.recovery_secs >= self.config.recovery_secs {
                        info!(
                            "Strategy -> conservative after {:.1}s of recovery",
                            self.recovery_secs
                        );
                        self.mode = StrategyMode::Conservative;
                        self.recovery_secs = 0.0;
                    }
                } else {
                    self.recovery_secs = 0.0;
                }
            }
        }
        self.mode
    }

    /// Thresholds in force for the current mode.
    ///
    /// Aggressive mode only tightens thresholds when `dual_profile` is set.
    pub fn active_thresholds(&self, base: &Thresholds, dual_profile: bool) -> Thresholds {
        match self.mode {
            StrategyMode::Aggressive if dual_profile => base.scaled(self.config.aggressive_scale),
            _ => *base,
        }
    }

    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    pub fn recovery_secs(&self) -> f64 {
        self.recovery_secs
    }

    pub fn reset(&mut self) {
        self.mode = StrategyMode::Conservative;
        self.recovery_secs = 0.0;
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(StrategyConfig::default())
    }
}
