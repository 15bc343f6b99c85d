//! Validation Error Types

use thiserror::Error;

/// Errors during landmark frame validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Frame carried no landmarks
    #[error("Landmark frame is empty")]
    EmptyFrame,

    /// Fewer landmarks than the mesh requires
    #[error("Landmark frame has {got} points, at least {required} required")]
    TooFewPoints { got: usize, required: usize },

    /// NaN or infinite coordinate
    #[error("Landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },

    /// Coordinate outside the tolerated normalized range
    #[error("{field} of landmark {index} is {value}, outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        index: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Frame dimensions unusable for projection
    #[error("Invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
}
