//! Statistical Features Computation

use serde::Serialize;

/// Summary statistics for a series of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticalFeatures {
    /// Number of samples
    pub count: usize,
    /// Mean value
    pub mean: f64,
    /// Standard deviation
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean absolute frame-to-frame change
    pub rate_of_change: f64,
}

impl StatisticalFeatures {
    /// Compute statistical features from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;

        let mean = values.iter().sum::<f64>() / n;

        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        let rate_of_change = if values.len() >= 2 {
            let total_change: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
            total_change / (values.len() - 1) as f64
        } else {
            0.0
        };

        Self {
            count: values.len(),
            mean,
            std_dev,
            min,
            max,
            rate_of_change,
        }
    }
}

/// Weighted mean of `(value, weight)` pairs.
///
/// Returns `None` when the total weight is not positive.
pub fn weighted_mean<I>(samples: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (weighted_sum, total_weight) = samples
        .into_iter()
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value * weight, total + weight)
        });

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}
