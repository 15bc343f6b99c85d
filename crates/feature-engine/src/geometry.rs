//! Eye openness, head pose, and iris position from landmarks

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::landmarks::{indices, FrameDims, LandmarkFrame, Orientation};
use crate::GeometryError;

/// Spans shorter than this (pixels) are treated as coincident landmarks
const MIN_SPAN_PX: f64 = 1e-6;

/// Iris ratio reported when no iris points are available
const NEUTRAL_IRIS_RATIO: f64 = 0.5;

/// Coarse head pose proxies
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Vertical nose-to-chin offset scaled by frame height (x100)
    pub pitch: f64,
    /// Nose offset from the cheek midpoint relative to cheek span (x100)
    pub yaw: f64,
}

/// Per-frame eye features
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeMetrics {
    /// Left eye aspect ratio
    pub left_openness: f64,
    /// Right eye aspect ratio
    pub right_openness: f64,
    /// Average openness after the enabled correction stages
    pub avg_openness: f64,
    /// Head pose
    pub pose: HeadPose,
    /// Iris position inside the eyelid gap (0 = top, 1 = bottom)
    pub iris_vertical_ratio: f64,
    /// True when openness was carried over from the previous frame
    pub substituted: bool,
}

/// Tunable constants of the geometry stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Pose compensation gain: openness *= (1 - pitch * k)
    pub pose_compensation_k: f64,
    /// Iris ratio above which the driver is considered to look down
    pub looking_down_threshold: f64,
    /// Openness bonus applied while looking down
    pub looking_down_bonus: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            pose_compensation_k: 0.002,
            looking_down_threshold: 0.65,
            looking_down_bonus: 0.05,
        }
    }
}

/// Optional correction stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub pose_compensation: bool,
    pub iris_correction: bool,
}

/// Openness carried between frames for the degenerate-geometry fallback
#[derive(Debug, Clone, Copy)]
struct Openness {
    left: f64,
    right: f64,
    avg: f64,
}

/// Stateful geometry extractor.
///
/// Keeps the last good openness so a frame with coincident eyelid
/// landmarks reuses it instead of dividing by zero.
#[derive(Debug, Clone, Default)]
pub struct GeometryExtractor {
    config: GeometryConfig,
    previous: Option<Openness>,
}

impl GeometryExtractor {
    pub fn new(config: GeometryConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Extract eye metrics from one frame
    pub fn extract(
        &mut self,
        frame: &LandmarkFrame,
        dims: FrameDims,
        orientation: Orientation,
        flags: StageFlags,
    ) -> Result<EyeMetrics, GeometryError> {
        let view = FrameView {
            frame,
            dims,
            orientation,
        };

        let pose = view.head_pose()?;
        let iris_vertical_ratio = view.iris_vertical_ratio()?;

        let left = view.eye_aspect_ratio(indices::LEFT_EYE)?;
        let right = view.eye_aspect_ratio(indices::RIGHT_EYE)?;

        let (openness, substituted) = match (left, right) {
            (Some(left), Some(right)) => {
                let mut avg = (left + right) / 2.0;
                if flags.pose_compensation {
                    avg *= 1.0 - pose.pitch * self.config.pose_compensation_k;
                }
                if flags.iris_correction
                    && iris_vertical_ratio > self.config.looking_down_threshold
                {
                    debug!(
                        "Looking down (iris ratio {:.2}), adding openness bonus",
                        iris_vertical_ratio
                    );
                    avg += self.config.looking_down_bonus;
                }
                let openness = Openness {
                    left,
                    right,
                    avg: avg.max(0.0),
                };
                self.previous = Some(openness);
                (openness, false)
            }
            _ => {
                warn!("Degenerate eyelid geometry, reusing previous openness");
                let previous = self.previous.ok_or(GeometryError::DegenerateGeometry)?;
                (previous, true)
            }
        };

        Ok(EyeMetrics {
            left_openness: openness.left,
            right_openness: openness.right,
            avg_openness: openness.avg,
            pose,
            iris_vertical_ratio,
            substituted,
        })
    }

    /// Forget the carried-over openness
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// A frame bound to its dimensions and orientation
struct FrameView<'a> {
    frame: &'a LandmarkFrame,
    dims: FrameDims,
    orientation: Orientation,
}

impl FrameView<'_> {
    fn point(&self, index: usize) -> Result<(f64, f64), GeometryError> {
        let landmark = self
            .frame
            .get(index)
            .ok_or(GeometryError::MissingLandmark(index))?;
        Ok(self.dims.project(landmark, self.orientation))
    }

    fn distance(&self, a: usize, b: usize) -> Result<f64, GeometryError> {
        let (ax, ay) = self.point(a)?;
        let (bx, by) = self.point(b)?;
        Ok(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }

    /// EAR over six contour points, `None` when the horizontal span collapses
    fn eye_aspect_ratio(&self, contour: [usize; 6]) -> Result<Option<f64>, GeometryError> {
        let [p1, p2, p3, p4, p5, p6] = contour;
        let horizontal = self.distance(p1, p4)?;
        if horizontal < MIN_SPAN_PX {
            return Ok(None);
        }
        let vertical = self.distance(p2, p6)? + self.distance(p3, p5)?;
        Ok(Some(vertical / (2.0 * horizontal)))
    }

    fn head_pose(&self) -> Result<HeadPose, GeometryError> {
        let (nose_x, nose_y) = self.point(indices::NOSE_TIP)?;
        let (_, chin_y) = self.point(indices::CHIN)?;
        let (left_x, _) = self.point(indices::LEFT_CHEEK)?;
        let (right_x, _) = self.point(indices::RIGHT_CHEEK)?;

        let pitch = (nose_y - chin_y) / self.dims.height * 100.0;

        let span = (left_x - right_x).abs();
        let yaw = if span < MIN_SPAN_PX {
            0.0
        } else {
            (nose_x - (left_x + right_x) / 2.0) / span * 100.0
        };

        Ok(HeadPose { pitch, yaw })
    }

    fn iris_vertical_ratio(&self) -> Result<f64, GeometryError> {
        if !self.frame.has_iris() {
            return Ok(NEUTRAL_IRIS_RATIO);
        }
        let left = self.iris_ratio(
            indices::LEFT_UPPER_LID,
            indices::LEFT_LOWER_LID,
            indices::LEFT_IRIS_CENTER,
        )?;
        let right = self.iris_ratio(
            indices::RIGHT_UPPER_LID,
            indices::RIGHT_LOWER_LID,
            indices::RIGHT_IRIS_CENTER,
        )?;
        Ok((left + right) / 2.0)
    }

    fn iris_ratio(&self, upper: usize, lower: usize, iris: usize) -> Result<f64, GeometryError> {
        let (_, upper_y) = self.point(upper)?;
        let (_, lower_y) = self.point(lower)?;
        let (_, iris_y) = self.point(iris)?;
        let gap = lower_y - upper_y;
        if gap.abs() < MIN_SPAN_PX {
            return Ok(NEUTRAL_IRIS_RATIO);
        }
        Ok(((iris_y - upper_y) / gap).clamp(0.0, 1.0))
    }
}
