//! The three entry points exposed to callers: quality check, verify, enroll.
//!
//! Every call recomputes from the given frame and reads the registry fresh;
//! nothing is cached between calls.

use crate::decision::{DecisionEngine, DecisionParams, Outcome};
use crate::detector::{detect_faces, DetectorError, FaceDetector};
use crate::features::FeatureExtractor;
use crate::frame::crop;
use crate::preprocess::{EnhanceParams, ExtractError, FeaturePreprocessor};
use crate::quality::{QualityGate, QualityReport, QualityThresholds};
use crate::registry::{Registry, RegistryError};
use crate::scorer::{ScoringParams, SimilarityScorer};
use crate::types::{FaceRegion, Identity};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{count} faces detected, expected one")]
    MultipleFacesDetected { count: usize },
    #[error("face too small: {width}x{height}, need at least {min}x{min}")]
    FaceTooSmall { width: u32, height: u32, min: u32 },
    #[error("feature extraction failed: {0}")]
    ExtractionFailure(#[from] ExtractError),
    #[error("name must not be blank")]
    InvalidName,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

impl PipelineError {
    /// Actionable message for the person being verified or enrolled.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::NoFaceDetected => "no face detected - position yourself in frame".into(),
            PipelineError::MultipleFacesDetected { .. } => {
                "multiple faces detected - only one person should be visible".into()
            }
            PipelineError::FaceTooSmall { width, height, min } => {
                format!("face too small ({width}x{height}, need {min}x{min}) - move closer to the camera")
            }
            PipelineError::ExtractionFailure(_) => "could not process the face image - try again".into(),
            PipelineError::InvalidName => "please enter a name".into(),
            PipelineError::Registry(e) => format!("registry unavailable: {e}"),
            PipelineError::Detector(e) => format!("face detector unavailable: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Live-verification gate; its face size also applies to `verify`.
    pub quality: QualityThresholds,
    /// Minimum face size accepted by `enroll`.
    pub enrollment_min_face_size: u32,
    pub enhance: EnhanceParams,
    pub scoring: ScoringParams,
    pub decision: DecisionParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: QualityThresholds::default(),
            enrollment_min_face_size: QualityThresholds::enrollment().min_face_size,
            enhance: EnhanceParams::default(),
            scoring: ScoringParams::default(),
            decision: DecisionParams::default(),
        }
    }
}

pub struct Pipeline {
    detector: Box<dyn FaceDetector>,
    config: PipelineConfig,
    preprocessor: FeaturePreprocessor,
    extractor: FeatureExtractor,
    gate: QualityGate,
    enrollment_gate: QualityGate,
    engine: DecisionEngine,
}

impl Pipeline {
    pub fn new(detector: Box<dyn FaceDetector>, config: PipelineConfig) -> Self {
        let preprocessor = FeaturePreprocessor::new(config.enhance.clone());
        Self {
            detector,
            extractor: FeatureExtractor::new(preprocessor.clone()),
            preprocessor,
            gate: QualityGate::new(config.quality.clone()),
            enrollment_gate: QualityGate::new(QualityThresholds {
                min_face_size: config.enrollment_min_face_size,
                ..config.quality.clone()
            }),
            engine: DecisionEngine::new(
                SimilarityScorer::new(config.scoring.clone()),
                config.decision.clone(),
            ),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Advisory gate over a raw frame. Does not extract or score.
    pub fn check_quality(&self, frame: &RgbImage) -> Result<QualityReport, PipelineError> {
        let enhanced = self.preprocessor.enhance(frame);
        let faces = detect_faces(self.detector.as_ref(), &enhanced)?;
        Ok(self.gate.evaluate(&enhanced, &faces))
    }

    /// Same as [`Pipeline::check_quality`], but with the smaller face size
    /// `enroll` accepts.
    pub fn check_quality_for_enrollment(&self, frame: &RgbImage) -> Result<QualityReport, PipelineError> {
        let enhanced = self.preprocessor.enhance(frame);
        let faces = detect_faces(self.detector.as_ref(), &enhanced)?;
        Ok(self.enrollment_gate.evaluate(&enhanced, &faces))
    }

    /// Identify the single face in `frame` against every enrolled identity.
    pub fn verify<R: Registry + ?Sized>(
        &self,
        frame: &RgbImage,
        registry: &R,
    ) -> Result<Outcome, PipelineError> {
        let enhanced = self.preprocessor.enhance(frame);
        let face = self.locate(&enhanced, self.config.quality.min_face_size)?;

        if registry.count()? == 0 {
            tracing::info!("verification attempted with no enrolled identities");
            return Ok(Outcome::NoEnrollments);
        }

        let probe = self.extractor.extract(&crop(&enhanced, &face))?;
        let enrolled = registry.list_all()?;
        Ok(self.engine.decide(&probe, enrolled))
    }

    /// Register (or replace) `name` with the single face in `frame`.
    pub fn enroll<R: Registry + ?Sized>(
        &self,
        name: &str,
        frame: &RgbImage,
        registry: &mut R,
    ) -> Result<Identity, PipelineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidName);
        }

        let enhanced = self.preprocessor.enhance(frame);
        let face = self.locate(&enhanced, self.config.enrollment_min_face_size)?;
        let face_crop = crop(&enhanced, &face);
        let features = self.extractor.extract(&face_crop)?;

        let registered_at = chrono::Local::now().naive_local();
        let identity = registry.upsert(name, &features, &face_crop, registered_at)?;
        tracing::info!(
            name = %identity.name,
            reference = %identity.reference,
            width = face.width,
            height = face.height,
            "identity enrolled"
        );
        Ok(identity)
    }

    fn locate(&self, enhanced: &RgbImage, min_face_size: u32) -> Result<FaceRegion, PipelineError> {
        let mut faces = detect_faces(self.detector.as_ref(), enhanced)?;
        match faces.len() {
            0 => return Err(PipelineError::NoFaceDetected),
            1 => {}
            count => return Err(PipelineError::MultipleFacesDetected { count }),
        }

        let face = faces.remove(0);
        if face.width < min_face_size || face.height < min_face_size {
            return Err(PipelineError::FaceTooSmall {
                width: face.width,
                height: face.height,
                min: min_face_size,
            });
        }
        Ok(face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::GateState;
    use crate::registry::InMemoryRegistry;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const FRAME: u32 = 240;

    struct StubDetector(Vec<FaceRegion>);

    impl FaceDetector for StubDetector {
        fn detect(&self, _: &[u8], _: u32, _: u32) -> Result<Vec<FaceRegion>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn pipeline_with(regions: Vec<FaceRegion>) -> Pipeline {
        Pipeline::new(Box::new(StubDetector(regions)), PipelineConfig::default())
    }

    fn one_face() -> Pipeline {
        pipeline_with(vec![FaceRegion::new(20, 20, 200, 200)])
    }

    /// Warm radial gradient with per-pixel noise.
    fn warm_face(seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let c = FRAME as f32 / 2.0;
        RgbImage::from_fn(FRAME, FRAME, |x, y| {
            let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
            let base = (220.0 - d * 1.2).clamp(30.0, 220.0);
            let n: f32 = rng.gen_range(-25.0..25.0);
            let v = (base + n).clamp(0.0, 255.0);
            Rgb([v as u8, (v * 0.75) as u8, (v * 0.55) as u8])
        })
    }

    /// Cool checkerboard.
    fn cool_face() -> RgbImage {
        RgbImage::from_fn(FRAME, FRAME, |x, y| {
            if (x / 12 + y / 12) % 2 == 0 {
                Rgb([40, 90, 170])
            } else {
                Rgb([150, 190, 230])
            }
        })
    }

    #[test]
    fn test_verify_accepts_enrolled_face() {
        let pipeline = one_face();
        let mut registry = InMemoryRegistry::new();
        pipeline.enroll("Alice", &warm_face(1), &mut registry).unwrap();
        pipeline.enroll("Bob", &cool_face(), &mut registry).unwrap();

        match pipeline.verify(&warm_face(1), &registry).unwrap() {
            Outcome::Accept { name, confidence } => {
                assert_eq!(name, "Alice");
                assert!(confidence > 99.9, "confidence {confidence}");
            }
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_empty_registry() {
        let registry = InMemoryRegistry::new();
        let outcome = one_face().verify(&warm_face(1), &registry).unwrap();
        assert_eq!(outcome, Outcome::NoEnrollments);
    }

    #[test]
    fn test_verify_rejects_below_threshold() {
        let config = PipelineConfig {
            decision: DecisionParams { threshold: 1.01, ..DecisionParams::default() },
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(
            Box::new(StubDetector(vec![FaceRegion::new(20, 20, 200, 200)])),
            config,
        );
        let mut registry = InMemoryRegistry::new();
        pipeline.enroll("Alice", &warm_face(1), &mut registry).unwrap();
        pipeline.enroll("Bob", &cool_face(), &mut registry).unwrap();
        pipeline.enroll("Carol", &warm_face(9), &mut registry).unwrap();

        match pipeline.verify(&warm_face(1), &registry).unwrap() {
            Outcome::Reject { top_candidates } => {
                assert_eq!(top_candidates.len(), 2);
                assert_eq!(top_candidates[0].name, "Alice");
                assert!(top_candidates[0].score >= top_candidates[1].score);
            }
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_requires_single_face() {
        let pipeline = pipeline_with(vec![
            FaceRegion::new(0, 0, 160, 160),
            FaceRegion { confidence: 0.5, ..FaceRegion::new(200, 200, 40, 40) },
        ]);
        let err = pipeline.verify(&warm_face(1), &InMemoryRegistry::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MultipleFacesDetected { count: 2 }));
    }

    #[test]
    fn test_verify_no_face() {
        let err = pipeline_with(vec![]).verify(&warm_face(1), &InMemoryRegistry::new()).unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected));
    }

    #[test]
    fn test_enrollment_accepts_smaller_face_than_verify() {
        let pipeline = pipeline_with(vec![FaceRegion::new(10, 10, 130, 130)]);
        let mut registry = InMemoryRegistry::new();
        pipeline.enroll("Dana", &warm_face(2), &mut registry).unwrap();

        let err = pipeline.verify(&warm_face(2), &registry).unwrap_err();
        assert!(matches!(err, PipelineError::FaceTooSmall { width: 130, height: 130, min: 150 }));
        assert!(err.user_message().contains("move closer"));
    }

    #[test]
    fn test_enroll_rejects_blank_name() {
        let mut registry = InMemoryRegistry::new();
        let err = one_face().enroll("   ", &warm_face(1), &mut registry).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidName));
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn test_enroll_replaces_existing_name() {
        let pipeline = one_face();
        let mut registry = InMemoryRegistry::new();
        pipeline.enroll("Jane Doe", &warm_face(1), &mut registry).unwrap();
        let second = pipeline.enroll("jane doe", &cool_face(), &mut registry).unwrap();

        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(registry.released().len(), 1);
        let stored = registry.list_all().unwrap().remove(0).unwrap();
        assert_eq!(stored.features, second.features);
    }

    #[test]
    fn test_check_quality_reports_state() {
        let report = pipeline_with(vec![]).check_quality(&warm_face(1)).unwrap();
        assert_eq!(report.state, GateState::NoFace);

        let report = pipeline_with(vec![FaceRegion::new(0, 0, 100, 100)])
            .check_quality(&warm_face(1))
            .unwrap();
        assert_eq!(report.state, GateState::TooSmall);
    }

    #[test]
    fn test_enrollment_check_uses_enrollment_face_size() {
        let pipeline = pipeline_with(vec![FaceRegion::new(10, 10, 130, 130)]);
        let live = pipeline.check_quality(&warm_face(2)).unwrap();
        assert_eq!(live.state, GateState::TooSmall);

        let enrolling = pipeline.check_quality_for_enrollment(&warm_face(2)).unwrap();
        assert_ne!(enrolling.state, GateState::TooSmall);
        assert_ne!(enrolling.state, GateState::NoFace);

        let tiny = pipeline_with(vec![FaceRegion::new(10, 10, 110, 110)]);
        assert_eq!(tiny.check_quality_for_enrollment(&warm_face(2)).unwrap().state, GateState::TooSmall);
    }
}
