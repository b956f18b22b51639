use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Side length of the normalized face patch every descriptor is computed on.
pub const PATCH_SIZE: u32 = 160;

/// Two concatenated 256-bin LBP histograms (radius 1 and radius 2).
pub const LBP_BINS: usize = 512;
/// Magnitude-weighted orientation histogram, 10° per bin.
pub const GRADIENT_BINS: usize = 36;
/// 5 regions × (16 hue + 16 saturation) bins.
pub const COLOR_BINS: usize = 160;
/// 5 regions × 32 intensity bins.
pub const GRAY_BINS: usize = 160;
/// 32 edge-map bins + 4 quadrant edge densities.
pub const EDGE_BINS: usize = 36;

/// Axis-aligned face bounding box in source-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector score; only used to order overlapping detections.
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, confidence: 1.0 }
    }

    /// Build a region from signed detector coordinates, clipping the part
    /// that lies left of or above the frame origin.
    pub fn from_corner(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        let x0 = x.max(0.0);
        let y0 = y.max(0.0);
        let x1 = (x + width).max(x0);
        let y1 = (y + height).max(y0);
        Self {
            x: x0.round() as u32,
            y: y0.round() as u32,
            width: (x1 - x0).round() as u32,
            height: (y1 - y0).round() as u32,
            confidence,
        }
    }

    /// Clip the region to a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the region remains inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Self> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height, ..self.clone() })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A descriptor array had the wrong number of values.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field} has {actual} values, expected {expected}")]
pub struct ShapeError {
    pub field: &'static str,
    pub expected: usize,
    pub actual: usize,
}

fn check_len(field: &'static str, values: &[f64], expected: usize) -> Result<(), ShapeError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ShapeError { field, expected, actual: values.len() })
    }
}

/// The five histogram descriptors of a face.
///
/// Lengths are checked on construction and on deserialization, so a value of
/// this type always has exactly the documented shape. Field names on the wire
/// follow the registry document format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptors")]
pub struct Descriptors {
    #[serde(rename = "lbp_hist")]
    lbp: Vec<f64>,
    #[serde(rename = "hog_hist")]
    gradient: Vec<f64>,
    #[serde(rename = "color_hist")]
    color: Vec<f64>,
    #[serde(rename = "gray_hist")]
    gray: Vec<f64>,
    #[serde(rename = "edges_hist")]
    edge: Vec<f64>,
}

#[derive(Deserialize)]
struct RawDescriptors {
    lbp_hist: Vec<f64>,
    hog_hist: Vec<f64>,
    color_hist: Vec<f64>,
    gray_hist: Vec<f64>,
    edges_hist: Vec<f64>,
}

impl TryFrom<RawDescriptors> for Descriptors {
    type Error = ShapeError;

    fn try_from(raw: RawDescriptors) -> Result<Self, Self::Error> {
        Descriptors::new(raw.lbp_hist, raw.hog_hist, raw.color_hist, raw.gray_hist, raw.edges_hist)
    }
}

impl Descriptors {
    pub fn new(
        lbp: Vec<f64>,
        gradient: Vec<f64>,
        color: Vec<f64>,
        gray: Vec<f64>,
        edge: Vec<f64>,
    ) -> Result<Self, ShapeError> {
        check_len("lbp_hist", &lbp, LBP_BINS)?;
        check_len("hog_hist", &gradient, GRADIENT_BINS)?;
        check_len("color_hist", &color, COLOR_BINS)?;
        check_len("gray_hist", &gray, GRAY_BINS)?;
        check_len("edges_hist", &edge, EDGE_BINS)?;
        Ok(Self { lbp, gradient, color, gray, edge })
    }

    pub fn lbp(&self) -> &[f64] {
        &self.lbp
    }

    pub fn gradient(&self) -> &[f64] {
        &self.gradient
    }

    pub fn color(&self) -> &[f64] {
        &self.color
    }

    pub fn gray(&self) -> &[f64] {
        &self.gray
    }

    pub fn edge(&self) -> &[f64] {
        &self.edge
    }
}

/// Denoised, equalized 160×160 intensity patch used for template comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePatch {
    pixels: Vec<u8>,
}

impl ReferencePatch {
    pub fn new(pixels: Vec<u8>) -> Result<Self, ShapeError> {
        let expected = (PATCH_SIZE * PATCH_SIZE) as usize;
        if pixels.len() != expected {
            return Err(ShapeError { field: "reference_patch", expected, actual: pixels.len() });
        }
        Ok(Self { pixels })
    }

    /// Row-major pixels, `PATCH_SIZE * PATCH_SIZE` bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// The unit of comparison: histogram descriptors plus the reference patch.
///
/// Produced once per enrollment and once per verification attempt, and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub descriptors: Descriptors,
    pub reference: ReferencePatch,
}

/// Opaque handle to the stored reference artifact of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceHandle(pub String);

impl std::fmt::Display for ReferenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An enrolled person, as handed out by a registry.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub features: FeatureVector,
    pub reference: ReferenceHandle,
    /// Absent when the stored timestamp is missing or unreadable; never used
    /// for matching.
    pub registered_at: Option<NaiveDateTime>,
}

/// Score of a probe against one enrolled identity, in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub name: String,
    pub score: f64,
}

/// Case-insensitive identity key.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
