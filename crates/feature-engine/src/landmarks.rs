//! Landmark frame types and face-mesh index scheme

use serde::{Deserialize, Serialize};

/// Face-mesh landmark indices used by the feature extractors.
///
/// Indices follow the 468-point mesh; the refined mesh appends ten iris
/// points (468..478).
pub mod indices {
    /// Left eye contour in EAR order p1..p6 (outer corner first)
    pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Right eye contour in EAR order p1..p6 (inner corner first)
    pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

    pub const NOSE_TIP: usize = 1;
    pub const CHIN: usize = 152;
    pub const LEFT_CHEEK: usize = 226;
    pub const RIGHT_CHEEK: usize = 446;

    pub const LEFT_UPPER_LID: usize = 159;
    pub const LEFT_LOWER_LID: usize = 145;
    pub const RIGHT_UPPER_LID: usize = 386;
    pub const RIGHT_LOWER_LID: usize = 374;

    pub const LEFT_IRIS_CENTER: usize = 468;
    pub const RIGHT_IRIS_CENTER: usize = 473;

    /// Points in the base mesh
    pub const MESH_POINTS: usize = 468;
    /// Points in the refined mesh (with iris)
    pub const REFINED_MESH_POINTS: usize = 478;
}

/// One normalized landmark (x, y in [0, 1] of the frame, optional depth)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

/// Landmarks for a single detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    pub points: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    /// Whether the frame carries the refined iris points
    pub fn has_iris(&self) -> bool {
        self.points.len() >= indices::REFINED_MESH_POINTS
    }

    /// Canonical frontal face whose eyes measure `ear` on a frame of the
    /// given dimensions in landscape orientation.
    ///
    /// The face sits centered with irises in the middle of the eyelid gap.
    /// Used by simulations and tests to drive the engine without a model.
    pub fn frontal_face(ear: f64, dims: FrameDims) -> Self {
        use indices::*;

        let mut points = vec![Landmark::new(0.5, 0.5); REFINED_MESH_POINTS];
        let width = 0.08;
        // EAR in pixels is (gap * height) / (width * frame_width)
        let gap = ear * width * dims.width / dims.height;

        let mut place_eye = |contour: [usize; 6], upper: usize, lower: usize, iris: usize, x0: f64| {
            let y0 = 0.4;
            points[contour[0]] = Landmark::new(x0, y0);
            points[contour[1]] = Landmark::new(x0 + width / 3.0, y0 - gap / 2.0);
            points[contour[2]] = Landmark::new(x0 + 2.0 * width / 3.0, y0 - gap / 2.0);
            points[contour[3]] = Landmark::new(x0 + width, y0);
            points[contour[4]] = Landmark::new(x0 + 2.0 * width / 3.0, y0 + gap / 2.0);
            points[contour[5]] = Landmark::new(x0 + width / 3.0, y0 + gap / 2.0);
            points[upper] = Landmark::new(x0 + width / 2.0, y0 - gap / 2.0);
            points[lower] = Landmark::new(x0 + width / 2.0, y0 + gap / 2.0);
            points[iris] = Landmark::new(x0 + width / 2.0, y0);
        };
        place_eye(LEFT_EYE, LEFT_UPPER_LID, LEFT_LOWER_LID, LEFT_IRIS_CENTER, 0.36);
        place_eye(RIGHT_EYE, RIGHT_UPPER_LID, RIGHT_LOWER_LID, RIGHT_IRIS_CENTER, 0.56);

        points[NOSE_TIP] = Landmark::new(0.5, 0.55);
        points[CHIN] = Landmark::new(0.5, 0.75);
        points[LEFT_CHEEK] = Landmark::new(0.3, 0.45);
        points[RIGHT_CHEEK] = Landmark::new(0.7, 0.45);

        Self { points }
    }
}

/// Input stream orientation relative to the display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    /// Stream is rotated 90 degrees; landmark axes are swapped
    Portrait,
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: f64,
    pub height: f64,
}

impl FrameDims {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Map a normalized landmark to pixel space, swapping axes in portrait
    pub fn project(&self, point: &Landmark, orientation: Orientation) -> (f64, f64) {
        let (x, y) = match orientation {
            Orientation::Landscape => (point.x, point.y),
            Orientation::Portrait => (point.y, point.x),
        };
        (x * self.width, y * self.height)
    }
}

impl Default for FrameDims {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}
