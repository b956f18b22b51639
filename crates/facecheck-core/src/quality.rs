//! Pre-capture quality gate.
//!
//! Advisory only: a [`QualityReport`] tells the user what to fix, it never
//! triggers extraction. Checks run in a fixed order and the first failure
//! wins.

use crate::filters::laplacian_variance;
use crate::frame::{crop, mean_brightness, to_intensity};
use crate::types::FaceRegion;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    NoFace,
    MultipleFaces,
    TooSmall,
    Blurry,
    TooDark,
    TooBright,
    Ready,
}

impl GateState {
    pub fn is_ready(self) -> bool {
        self == GateState::Ready
    }

    /// Short instruction for the person in front of the camera.
    pub fn message(self) -> &'static str {
        match self {
            GateState::NoFace => "no face detected - position yourself in frame",
            GateState::MultipleFaces => "multiple faces detected - only one person should be visible",
            GateState::TooSmall => "face too small - move closer to the camera",
            GateState::Blurry => "image blurry - hold still",
            GateState::TooDark => "too dark - improve lighting",
            GateState::TooBright => "too bright - reduce lighting",
            GateState::Ready => "face detected, good quality",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum width and height of the face box, in pixels.
    pub min_face_size: u32,
    /// Minimum Laplacian variance of the face crop.
    pub min_sharpness: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_face_size: 150,
            min_sharpness: 100.0,
            min_brightness: 60.0,
            max_brightness: 200.0,
        }
    }
}

impl QualityThresholds {
    /// Thresholds for registration, which accepts smaller faces.
    pub fn enrollment() -> Self {
        Self { min_face_size: 120, ..Self::default() }
    }
}

/// Gate verdict plus the measurements behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub state: GateState,
    pub face: Option<FaceRegion>,
    pub sharpness: Option<f64>,
    pub brightness: Option<f64>,
}

impl QualityReport {
    fn bare(state: GateState, face: Option<FaceRegion>) -> Self {
        Self { state, face, sharpness: None, brightness: None }
    }

    /// User-facing line including face size and clarity when measured.
    pub fn message(&self) -> String {
        match (&self.face, self.sharpness) {
            (Some(face), Some(sharpness)) => format!(
                "{} (face: {}x{}, clarity: {:.0})",
                self.state.message(),
                face.width,
                face.height,
                sharpness
            ),
            (Some(face), None) if self.state == GateState::TooSmall => format!(
                "{} ({}x{})",
                self.state.message(),
                face.width,
                face.height
            ),
            _ => self.state.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Evaluate a frame given the faces detected in it.
    pub fn evaluate(&self, frame: &RgbImage, faces: &[FaceRegion]) -> QualityReport {
        let face = match faces {
            [] => return QualityReport::bare(GateState::NoFace, None),
            [face] => face.clone(),
            _ => return QualityReport::bare(GateState::MultipleFaces, None),
        };

        if self.is_too_small(&face) {
            return QualityReport::bare(GateState::TooSmall, Some(face));
        }

        let gray = to_intensity(&crop(frame, &face));
        let (w, h) = gray.dimensions();
        let sharpness = laplacian_variance(gray.as_raw(), w, h);
        let brightness = mean_brightness(gray.as_raw());
        let state = self.judge_exposure(sharpness, brightness);

        tracing::debug!(
            ?state,
            width = face.width,
            height = face.height,
            sharpness,
            brightness,
            "quality gate"
        );

        QualityReport {
            state,
            face: Some(face),
            sharpness: Some(sharpness),
            brightness: Some(brightness),
        }
    }

    pub fn is_too_small(&self, face: &FaceRegion) -> bool {
        face.width < self.thresholds.min_face_size || face.height < self.thresholds.min_face_size
    }

    /// Sharpness check first, then brightness bounds.
    pub fn judge_exposure(&self, sharpness: f64, brightness: f64) -> GateState {
        let t = &self.thresholds;
        if sharpness < t.min_sharpness {
            GateState::Blurry
        } else if brightness < t.min_brightness {
            GateState::TooDark
        } else if brightness > t.max_brightness {
            GateState::TooBright
        } else {
            GateState::Ready
        }
    }
}
