//! Feature Engineering Engine
//!
//! Turns one frame of face-mesh landmarks into the scalar features the
//! fatigue engine consumes:
//! - Eye aspect ratio (openness) per eye and averaged
//! - Coarse head pose (pitch, yaw)
//! - Vertical iris position inside the eyelid gap
//!
//! Also provides summary statistics over openness samples.

mod geometry;
pub mod landmarks;
mod statistics;

pub use geometry::{EyeMetrics, GeometryConfig, GeometryExtractor, HeadPose, StageFlags};
pub use landmarks::{FrameDims, Landmark, LandmarkFrame, Orientation};
pub use statistics::{weighted_mean, StatisticalFeatures};

use thiserror::Error;

/// Geometry extraction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Landmark {0} missing from frame")]
    MissingLandmark(usize),

    #[error("Degenerate eyelid geometry and no previous openness to fall back on")]
    DegenerateGeometry,
}
