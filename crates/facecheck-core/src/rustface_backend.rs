use crate::detector::{DetectorError, FaceDetector};
use crate::types::FaceRegion;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Tuning for the SeetaFace cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RustfaceParams {
    /// Smallest face the first pass searches for, in pixels.
    pub min_face_size: u32,
    /// Smaller search size tried when the first pass finds nothing.
    pub fallback_min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: u32,
}

impl Default for RustfaceParams {
    fn default() -> Self {
        Self {
            min_face_size: 120,
            fallback_min_face_size: 100,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
pub struct RustfaceDetector {
    model: rustface::Model,
    params: RustfaceParams,
}

impl RustfaceDetector {
    /// Load a SeetaFace model file (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn load(model_path: &Path, params: RustfaceParams) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }
        let file = File::open(model_path)
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {e}", model_path.display())))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {e:?}", model_path.display())))?;

        tracing::info!(path = %model_path.display(), ?params, "loaded SeetaFace model");
        Ok(Self { model, params })
    }

    fn run(&self, gray: &[u8], width: u32, height: u32, min_face_size: u32) -> Vec<FaceRegion> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(min_face_size);
        detector.set_score_thresh(self.params.score_threshold);
        detector.set_pyramid_scale_factor(self.params.pyramid_scale_factor);
        detector.set_slide_window_step(self.params.slide_window_step, self.params.slide_window_step);

        detector
            .detect(&rustface::ImageData::new(gray, width, height))
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion::from_corner(
                    bbox.x() as f32,
                    bbox.y() as f32,
                    bbox.width() as f32,
                    bbox.height() as f32,
                    face.score() as f32,
                )
            })
            .collect()
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>, DetectorError> {
        let expected = width as usize * height as usize;
        if gray.len() != expected {
            return Err(DetectorError::DetectionFailed(format!(
                "buffer has {} bytes, expected {expected} for {width}x{height}",
                gray.len()
            )));
        }

        let faces = self.run(gray, width, height, self.params.min_face_size);
        if !faces.is_empty() || self.params.fallback_min_face_size >= self.params.min_face_size {
            return Ok(faces);
        }

        tracing::debug!(
            min_face_size = self.params.fallback_min_face_size,
            "no face at primary size, retrying with smaller window"
        );
        Ok(self.run(gray, width, height, self.params.fallback_min_face_size))
    }
}
