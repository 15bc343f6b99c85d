//! Landmark Frame Validator

use crate::error::ValidationError;
use feature_engine::landmarks::indices;
use feature_engine::{FrameDims, LandmarkFrame};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum number of landmarks per frame
    pub min_points: usize,
    /// Tolerated range for normalized x/y. Trackers report points slightly
    /// outside the frame when the face is partially cropped.
    pub coordinate_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_points: indices::MESH_POINTS,
            coordinate_range: (-0.5, 1.5),
        }
    }
}

/// Validator for landmark frames
#[derive(Debug, Clone, Default)]
pub struct FrameValidator {
    config: ValidationConfig,
}

impl FrameValidator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single coordinate against the tolerated range
    pub fn validate_coordinate(
        &self,
        field: &'static str,
        index: usize,
        value: f64,
    ) -> Result<(), ValidationError> {
        let (min, max) = self.config.coordinate_range;
        if !value.is_finite() {
            Err(ValidationError::NonFinite { index })
        } else if value < min || value > max {
            Err(ValidationError::OutOfRange {
                field,
                index,
                value,
                min,
                max,
            })
        } else {
            Ok(())
        }
    }

    /// Validate frame dimensions
    pub fn validate_dims(&self, dims: FrameDims) -> Result<(), ValidationError> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if usable(dims.width) && usable(dims.height) {
            Ok(())
        } else {
            Err(ValidationError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            })
        }
    }

    /// Validate a full frame, stopping at the first problem
    pub fn validate(&self, frame: &LandmarkFrame, dims: FrameDims) -> Result<(), ValidationError> {
        self.validate_dims(dims)?;

        if frame.is_empty() {
            return Err(ValidationError::EmptyFrame);
        }
        if frame.len() < self.config.min_points {
            return Err(ValidationError::TooFewPoints {
                got: frame.len(),
                required: self.config.min_points,
            });
        }

        for (index, point) in frame.points.iter().enumerate() {
            self.validate_coordinate("x", index, point.x)?;
            self.validate_coordinate("y", index, point.y)?;
            if let Some(z) = point.z {
                if !z.is_finite() {
                    return Err(ValidationError::NonFinite { index });
                }
            }
        }

        debug!("Validated frame with {} landmarks", frame.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::Landmark;
    use proptest::prelude::*;

    fn dims() -> FrameDims {
        FrameDims::new(640.0, 480.0)
    }

    #[test]
    fn test_valid_frame() {
        let validator = FrameValidator::default();
        let frame = LandmarkFrame::frontal_face(0.3, dims());
        assert!(validator.validate(&frame, dims()).is_ok());
    }

    #[test]
    fn test_empty_frame() {
        let validator = FrameValidator::default();
        let result = validator.validate(&LandmarkFrame::default(), dims());
        assert_eq!(result, Err(ValidationError::EmptyFrame));
    }

    #[test]
    fn test_truncated_frame() {
        let validator = FrameValidator::default();
        let frame = LandmarkFrame::new(vec![Landmark::new(0.5, 0.5); 10]);
        assert_eq!(
            validator.validate(&frame, dims()),
            Err(ValidationError::TooFewPoints {
                got: 10,
                required: 468
            })
        );
    }

    #[test]
    fn test_nan_coordinate() {
        let validator = FrameValidator::default();
        let mut frame = LandmarkFrame::frontal_face(0.3, dims());
        frame.points[33].y = f64::NAN;
        assert_eq!(
            validator.validate(&frame, dims()),
            Err(ValidationError::NonFinite { index: 33 })
        );
    }

    #[test]
    fn test_nan_depth() {
        let validator = FrameValidator::default();
        let mut frame = LandmarkFrame::frontal_face(0.3, dims());
        frame.points[7].z = Some(f64::INFINITY);
        assert_eq!(
            validator.validate(&frame, dims()),
            Err(ValidationError::NonFinite { index: 7 })
        );
    }

    #[test]
    fn test_out_of_range_coordinate() {
        let validator = FrameValidator::default();
        let mut frame = LandmarkFrame::frontal_face(0.3, dims());
        frame.points[2].x = 3.0;
        assert!(matches!(
            validator.validate(&frame, dims()),
            Err(ValidationError::OutOfRange { field: "x", index: 2, .. })
        ));

        // Slightly outside the frame is tolerated
        frame.points[2].x = 1.1;
        assert!(validator.validate(&frame, dims()).is_ok());
    }

    #[test]
    fn test_invalid_dims() {
        let validator = FrameValidator::default();
        let frame = LandmarkFrame::frontal_face(0.3, dims());
        assert!(matches!(
            validator.validate(&frame, FrameDims::new(0.0, 480.0)),
            Err(ValidationError::InvalidDimensions { .. })
        ));
    }

    fn in_range(value: f64) -> bool {
        value.is_finite() && (-0.5..=1.5).contains(&value)
    }

    proptest! {
        #[test]
        fn prop_rejects_exactly_out_of_range_coordinates(
            index in 0usize..468,
            on_y in any::<bool>(),
            value in prop_oneof![any::<f64>(), -2.0f64..3.0],
        ) {
            let validator = FrameValidator::default();
            let mut frame = LandmarkFrame::frontal_face(0.3, dims());
            if on_y {
                frame.points[index].y = value;
            } else {
                frame.points[index].x = value;
            }

            let result = validator.validate(&frame, dims());
            prop_assert_eq!(result.is_ok(), in_range(value));
            if !value.is_finite() {
                prop_assert_eq!(result, Err(ValidationError::NonFinite { index }));
            }
        }

        #[test]
        fn prop_arbitrary_frames_never_panic(
            coords in proptest::collection::vec((any::<f64>(), any::<f64>()), 0..600),
            width in any::<f64>(),
            height in any::<f64>(),
        ) {
            let validator = FrameValidator::default();
            let frame = LandmarkFrame::new(
                coords.iter().map(|(x, y)| Landmark::new(*x, *y)).collect(),
            );
            let all_in_range = coords.iter().all(|(x, y)| in_range(*x) && in_range(*y));
            let result = validator.validate(&frame, FrameDims::new(width, height));
            if result.is_ok() {
                prop_assert!(coords.len() >= 468);
                prop_assert!(all_in_range);
            }
        }
    }
}
