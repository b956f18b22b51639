use facecheck_core::{PipelineConfig, RustfaceParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_ENV: &str = "FACECHECK_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `$XDG_DATA_HOME/facecheck`, falling back to `~/.local/share/facecheck`.
fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecheck")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON registry document.
    pub db_path: PathBuf,
    /// Directory holding one reference image per identity.
    pub faces_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let dir = data_dir();
        Self { db_path: dir.join("faces.json"), faces_dir: dir.join("faces") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`).
    pub model_path: PathBuf,
    #[serde(flatten)]
    pub params: RustfaceParams,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: data_dir().join("seeta_fd_frontal_v1.0.bin"),
            params: RustfaceParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { device: "/dev/video0".to_string(), width: 640, height: 480, warmup_frames: 5 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub detector: DetectorConfig,
    pub camera: CameraConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load from `path`, else from `$FACECHECK_CONFIG`, else defaults; then
    /// apply `FACECHECK_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `FACECHECK_*` overrides read through `lookup`. Unparsable
    /// numeric values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACECHECK_DB_PATH") {
            self.registry.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECHECK_FACES_DIR") {
            self.registry.faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECHECK_DETECTOR_MODEL") {
            self.detector.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECHECK_CAMERA_DEVICE") {
            self.camera.device = v;
        }

        let decision = &mut self.pipeline.decision;
        decision.threshold = env_f64(&lookup, "FACECHECK_THRESHOLD", decision.threshold);
        decision.ambiguity_gap = env_f64(&lookup, "FACECHECK_AMBIGUITY_GAP", decision.ambiguity_gap);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("decision.threshold", p.decision.threshold)?;
        unit("decision.ambiguity_gap", p.decision.ambiguity_gap)?;
        unit("scoring.lbp_correlation_blend", p.scoring.lbp_correlation_blend)?;

        if p.scoring.chi_square_divisor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "scoring.chi_square_divisor must be positive, got {}",
                p.scoring.chi_square_divisor
            )));
        }
        if p.quality.min_brightness > p.quality.max_brightness {
            return Err(ConfigError::Invalid(format!(
                "quality.min_brightness ({}) exceeds quality.max_brightness ({})",
                p.quality.min_brightness, p.quality.max_brightness
            )));
        }
        if p.enhance.clahe_tiles == 0 {
            return Err(ConfigError::Invalid("enhance.clahe_tiles must be at least 1".into()));
        }
        let weights = p.scoring.weights.total();
        if (weights - 1.0).abs() > 1e-6 {
            tracing::warn!(weights, "descriptor weights do not sum to 1; scores are still clamped to [0, 1]");
        }
        Ok(())
    }
}

fn env_f64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
