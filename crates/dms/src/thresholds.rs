//! Personalized openness thresholds

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Openness thresholds derived from a driver's open-eye baseline.
///
/// Always satisfies `crit_threshold < warn_threshold <= baseline` with all
/// three values finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub baseline: f64,
    pub warn_threshold: f64,
    pub crit_threshold: f64,
}

impl Thresholds {
    /// Build thresholds, rejecting any that break the ordering invariant
    pub fn new(baseline: f64, warn_threshold: f64, crit_threshold: f64) -> Result<Self, DmsError> {
        let thresholds = Self {
            baseline,
            warn_threshold,
            crit_threshold,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Derive thresholds as fixed ratios of a baseline
    pub fn from_baseline(baseline: f64, warn_ratio: f64, crit_ratio: f64) -> Result<Self, DmsError> {
        Self::new(baseline, baseline * warn_ratio, baseline * crit_ratio)
    }

    /// Check the ordering invariant
    pub fn validate(&self) -> Result<(), DmsError> {
        let values = [self.baseline, self.warn_threshold, self.crit_threshold];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(DmsError::Config(format!(
                "thresholds must be finite and positive: {:?}",
                self
            )));
        }
        if !(self.crit_threshold < self.warn_threshold && self.warn_threshold <= self.baseline) {
            return Err(DmsError::Config(format!(
                "threshold ordering violated (need crit < warn <= baseline): crit={} warn={} baseline={}",
                self.crit_threshold, self.warn_threshold, self.baseline
            )));
        }
        Ok(())
    }

    /// Scale both thresholds by `factor`, shrinking the factor if needed so
    /// the warn threshold never passes the baseline.
    pub fn scaled(&self, factor: f64) -> Self {
        let factor = factor.min(self.baseline / self.warn_threshold);
        Self {
            baseline: self.baseline,
            warn_threshold: (self.warn_threshold * factor).min(self.baseline),
            crit_threshold: self.crit_threshold * factor,
        }
    }
}
