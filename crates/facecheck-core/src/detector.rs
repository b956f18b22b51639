//! Face localization seam.
//!
//! A [`FaceDetector`] turns an intensity buffer into candidate regions.
//! [`detect_faces`] wraps any backend with the shared pre- and
//! post-processing: histogram equalization, frame clipping, overlap
//! suppression and confidence ordering.

use crate::frame::{equalize_histogram, to_intensity};
use crate::types::FaceRegion;
use image::RgbImage;
use thiserror::Error;

/// Overlapping detections above this IoU are collapsed into the strongest one.
const NMS_IOU_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load detector model: {0}")]
    ModelLoad(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// A face localization backend.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major intensity buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>, DetectorError>;
}

/// Locate faces in an RGB frame, strongest first.
///
/// Regions are clipped to the frame; regions entirely outside it are dropped.
pub fn detect_faces(
    detector: &dyn FaceDetector,
    frame: &RgbImage,
) -> Result<Vec<FaceRegion>, DetectorError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    let mut gray = to_intensity(frame).into_raw();
    equalize_histogram(&mut gray);

    let raw = detector.detect(&gray, width, height)?;
    let candidates = raw.len();
    let clipped: Vec<FaceRegion> = raw
        .into_iter()
        .filter_map(|r| r.clamp_to(width, height))
        .collect();

    let mut faces = nms(clipped, NMS_IOU_THRESHOLD);
    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::debug!(candidates, kept = faces.len(), width, height, "face detection");
    Ok(faces)
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union of two regions.
fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = x2.saturating_sub(x1) as u64 * y2.saturating_sub(y1) as u64;
    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0 {
        inter_area as f32 / union_area as f32
    } else {
        0.0
    }
}
