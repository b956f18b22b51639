//! facecheck-core: face verification from hand-crafted image descriptors.
//!
//! A frame is enhanced, the single face in it is located and normalized to a
//! 160×160 patch, five histogram descriptors plus a reference patch are
//! extracted, and the result is scored against every enrolled identity.

pub mod decision;
pub mod detector;
pub mod features;
pub mod filters;
pub mod frame;
pub mod pipeline;
pub mod preprocess;
pub mod quality;
pub mod registry;
#[cfg(feature = "rustface")]
pub mod rustface_backend;
pub mod scorer;
pub mod stats;
pub mod types;

pub use decision::{DecisionEngine, DecisionParams, Outcome};
pub use detector::{DetectorError, FaceDetector};
pub use features::FeatureExtractor;
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use preprocess::{EnhanceParams, ExtractError, FeaturePreprocessor};
pub use quality::{GateState, QualityGate, QualityReport, QualityThresholds};
pub use registry::{EntryError, InMemoryRegistry, Registry, RegistryError};
#[cfg(feature = "rustface")]
pub use rustface_backend::{RustfaceDetector, RustfaceParams};
pub use scorer::{ScoringParams, Similarity, SimilarityScorer};
pub use types::{ComparisonResult, FaceRegion, FeatureVector, Identity, ReferenceHandle};
