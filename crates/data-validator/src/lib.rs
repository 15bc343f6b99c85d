//! Landmark Frame Validation
//!
//! Rejects empty, truncated, or numerically broken landmark frames before
//! they reach the geometry extractor.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{FrameValidator, ValidationConfig};
