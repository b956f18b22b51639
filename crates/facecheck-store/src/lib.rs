//! facecheck-store: durable registry backed by a JSON document plus one
//! reference image per identity.
//!
//! Document layout:
//!
//! ```json
//! {"users": [{"name": "...", "image": "faces/Jane_Doe_20240301_120000.png",
//!             "registered_at": "2024-03-01 12:00:00",
//!             "features": {"lbp_hist": [...], "hog_hist": [...], ...}}]}
//! ```
//!
//! The document is re-read on every call and replaced atomically on write.

use chrono::NaiveDateTime;
use facecheck_core::preprocess::{ExtractError, FeaturePreprocessor};
use facecheck_core::registry::{EntryError, Registry, RegistryError};
use facecheck_core::types::{name_key, Descriptors, FeatureVector, Identity, ReferenceHandle};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("reference image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io { path, source } => RegistryError::Io(std::io::Error::new(
                source.kind(),
                format!("{}: {source}", path.display()),
            )),
            e @ StoreError::Json { .. } => RegistryError::Malformed(e.to_string()),
            e @ StoreError::Image { .. } => RegistryError::Artifact(e.to_string()),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    /// Kept untyped so one malformed entry does not invalidate the document.
    #[serde(default)]
    users: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    name: String,
    image: String,
    /// Display only; an odd value never excludes the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registered_at: Option<serde_json::Value>,
    features: serde_json::Value,
}

fn record_name(user: &serde_json::Value) -> Option<&str> {
    user.get("name").and_then(serde_json::Value::as_str)
}

fn record_image(user: &serde_json::Value) -> Option<&str> {
    user.get("image").and_then(serde_json::Value::as_str)
}

fn matches_key(user: &serde_json::Value, key: &str) -> bool {
    record_name(user).is_some_and(|name| name_key(name) == key)
}

/// File stem for a name: letters, digits, `-` and `_` survive, everything
/// else (separators, dots, whitespace) becomes `_`.
fn artifact_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.chars().all(|c| c == '_') {
        "user".to_string()
    } else {
        stem
    }
}

/// Registry listing entry that skips decoding features and images.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub name: String,
    pub registered_at: String,
    pub image: PathBuf,
}

pub struct JsonRegistry {
    db_path: PathBuf,
    faces_dir: PathBuf,
    preprocessor: FeaturePreprocessor,
}

impl JsonRegistry {
    /// Open (or prepare) a registry. The document itself is created lazily
    /// on the first write; `faces_dir` is created immediately.
    pub fn open(
        db_path: impl Into<PathBuf>,
        faces_dir: impl Into<PathBuf>,
        preprocessor: FeaturePreprocessor,
    ) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        let faces_dir = faces_dir.into();
        fs::create_dir_all(&faces_dir).map_err(io_err(&faces_dir))?;
        tracing::debug!(db = %db_path.display(), faces = %faces_dir.display(), "registry opened");
        Ok(Self { db_path, faces_dir, preprocessor })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn faces_dir(&self) -> &Path {
        &self.faces_dir
    }

    /// Names, registration times and image paths, in enrollment order.
    /// Entries without a readable name are listed as `(unnamed)`.
    pub fn summaries(&self) -> Result<Vec<UserSummary>, RegistryError> {
        Ok(self
            .load()?
            .users
            .iter()
            .map(|u| UserSummary {
                name: record_name(u).unwrap_or("(unnamed)").to_string(),
                registered_at: u
                    .get("registered_at")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                image: PathBuf::from(record_image(u).unwrap_or_default()),
            })
            .collect())
    }

    fn load(&self) -> Result<Document, StoreError> {
        let text = match fs::read_to_string(&self.db_path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(io_err(&self.db_path)(e)),
        };
        serde_json::from_str(&text).map_err(|source| StoreError::Json { path: self.db_path.clone(), source })
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let json = serde_json::to_string_pretty(doc)
            .map_err(|source| StoreError::Json { path: self.db_path.clone(), source })?;

        let temp_path = self.db_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(io_err(&temp_path))?;
        file.write_all(json.as_bytes()).map_err(io_err(&temp_path))?;
        file.sync_all().map_err(io_err(&temp_path))?;
        drop(file);

        fs::rename(&temp_path, &self.db_path).map_err(io_err(&self.db_path))?;
        Ok(())
    }

    /// `<faces_dir>/<stem>_<timestamp>.png`, with a `_N` suffix when that
    /// file exists or another entry already points at it.
    fn artifact_path(&self, doc: &Document, name: &str, registered_at: &NaiveDateTime) -> PathBuf {
        let base = format!("{}_{}", artifact_stem(name), registered_at.format(FILENAME_TIMESTAMP_FORMAT));
        let taken = |path: &Path| {
            path.exists() || doc.users.iter().any(|u| record_image(u).is_some_and(|img| Path::new(img) == path))
        };

        let mut path = self.faces_dir.join(format!("{base}.png"));
        let mut n = 2;
        while taken(&path) {
            path = self.faces_dir.join(format!("{base}_{n}.png"));
            n += 1;
        }
        path
    }

    fn release_artifact(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "reference image released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove reference image"),
        }
    }

    fn release_records(&self, records: &[serde_json::Value]) {
        for path in records.iter().filter_map(record_image) {
            self.release_artifact(Path::new(path));
        }
    }

    fn load_entry(&self, index: usize, user: serde_json::Value) -> Result<Identity, EntryError> {
        let label = record_name(&user).map_or_else(|| format!("entry #{index}"), str::to_string);
        let record: UserRecord = serde_json::from_value(user)
            .map_err(|e| EntryError::CorruptRegistryEntry { name: label, reason: e.to_string() })?;

        let descriptors: Descriptors = serde_json::from_value(record.features.clone()).map_err(|e| {
            EntryError::CorruptRegistryEntry { name: record.name.clone(), reason: e.to_string() }
        })?;

        let stamp = record.registered_at.as_ref().and_then(serde_json::Value::as_str);
        let registered_at = stamp.and_then(|stamp| {
            NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
                .map_err(|e| tracing::warn!(name = %record.name, stamp, error = %e, "unreadable registration time"))
                .ok()
        });

        let missing = |reason: String| EntryError::MissingReferenceArtifact {
            name: record.name.clone(),
            path: record.image.clone(),
            reason,
        };
        let crop = image::open(&record.image).map_err(|e| missing(e.to_string()))?.to_rgb8();
        let reference = self
            .preprocessor
            .normalize(&crop)
            .and_then(|face| face.reference_patch().map_err(ExtractError::from))
            .map_err(|e| missing(e.to_string()))?;

        Ok(Identity {
            name: record.name,
            features: FeatureVector { descriptors, reference },
            reference: ReferenceHandle(record.image),
            registered_at,
        })
    }
}

impl Registry for JsonRegistry {
    fn list_all(&self) -> Result<Vec<Result<Identity, EntryError>>, RegistryError> {
        let doc = self.load()?;
        Ok(doc.users.into_iter().enumerate().map(|(i, u)| self.load_entry(i, u)).collect())
    }

    fn upsert(
        &mut self,
        name: &str,
        features: &FeatureVector,
        face_crop: &RgbImage,
        registered_at: NaiveDateTime,
    ) -> Result<Identity, RegistryError> {
        let name = name.trim();
        let key = name_key(name);
        let mut doc = self.load()?;

        let record = UserRecord {
            name: name.to_string(),
            image: String::new(),
            registered_at: Some(registered_at.format(TIMESTAMP_FORMAT).to_string().into()),
            features: serde_json::to_value(&features.descriptors)
                .map_err(|source| StoreError::Json { path: self.db_path.clone(), source })?,
        };

        let image_path = self.artifact_path(&doc, name, &registered_at);
        face_crop
            .save(&image_path)
            .map_err(|source| StoreError::Image { path: image_path.clone(), source })?;
        let image = image_path.to_string_lossy().into_owned();

        let (replaced, kept): (Vec<_>, Vec<_>) = doc.users.into_iter().partition(|u| matches_key(u, &key));
        doc.users = kept;
        let record = UserRecord { image: image.clone(), ..record };
        doc.users.push(
            serde_json::to_value(&record).map_err(|source| StoreError::Json { path: self.db_path.clone(), source })?,
        );

        if let Err(e) = self.save(&doc) {
            self.release_artifact(&image_path);
            return Err(e.into());
        }
        self.release_records(&replaced);
        tracing::info!(name, image = %image, replaced = replaced.len(), "identity stored");

        Ok(Identity {
            name: name.to_string(),
            features: features.clone(),
            reference: ReferenceHandle(image),
            registered_at: Some(registered_at),
        })
    }

    fn delete(&mut self, name: &str) -> Result<bool, RegistryError> {
        let key = name_key(name);
        let mut doc = self.load()?;
        let (removed, kept): (Vec<_>, Vec<_>) = doc.users.into_iter().partition(|u| matches_key(u, &key));
        if removed.is_empty() {
            return Ok(false);
        }

        doc.users = kept;
        self.save(&doc)?;
        self.release_records(&removed);
        tracing::info!(name, "identity deleted");
        Ok(true)
    }

    /// Every stored entry, loadable or not.
    fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.load()?.users.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use facecheck_core::detector::{DetectorError, FaceDetector};
    use facecheck_core::types::FaceRegion;
    use facecheck_core::{DecisionParams, Outcome, Pipeline, PipelineConfig};
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;

    const FRAME: u32 = 240;

    struct StubDetector;

    impl FaceDetector for StubDetector {
        fn detect(&self, _: &[u8], _: u32, _: u32) -> Result<Vec<FaceRegion>, DetectorError> {
            Ok(vec![FaceRegion::new(20, 20, 200, 200)])
        }
    }

    fn pipeline(config: PipelineConfig) -> Pipeline {
        Pipeline::new(Box::new(StubDetector), config)
    }

    fn open(tmp: &TempDir) -> JsonRegistry {
        JsonRegistry::open(
            tmp.path().join("faces.json"),
            tmp.path().join("faces"),
            FeaturePreprocessor::new(PipelineConfig::default().enhance),
        )
        .unwrap()
    }

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

    fn cool_face() -> RgbImage {
        RgbImage::from_fn(FRAME, FRAME, |x, y| {
            if (x / 12 + y / 12) % 2 == 0 { Rgb([40, 90, 170]) } else { Rgb([150, 190, 230]) }
        })
    }

    fn at(sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 0, sec).unwrap()
    }

    fn sample_features(p: &Pipeline, frame: &RgbImage) -> (FeatureVector, RgbImage) {
        let mut mem = facecheck_core::InMemoryRegistry::new();
        let id = p.enroll("sample", frame, &mut mem).unwrap();
        (id.features, RgbImage::from_pixel(40, 40, Rgb([120, 100, 90])))
    }

    #[test]
    fn test_missing_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        let reg = open(&tmp);
        assert_eq!(reg.count().unwrap(), 0);
        assert!(reg.list_all().unwrap().is_empty());
        assert!(tmp.path().join("faces").is_dir());
    }

    #[test]
    fn test_document_format() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));
        reg.upsert("Jane Doe", &features, &crop, at(5)).unwrap();

        let text = fs::read_to_string(tmp.path().join("faces.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        let user = &json["users"][0];
        assert_eq!(user["name"], "Jane Doe");
        assert_eq!(user["registered_at"], "2024-03-01 12:00:05");
        assert!(user["image"].as_str().unwrap().ends_with("Jane_Doe_20240301_120005.png"));
        assert_eq!(user["features"]["lbp_hist"].as_array().unwrap().len(), 512);
        assert_eq!(user["features"]["edges_hist"].as_array().unwrap().len(), 36);
        assert!(!tmp.path().join("faces.json.tmp").exists());
    }

    #[test]
    fn test_upsert_replaces_and_releases_artifact() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));

        let first = reg.upsert("Jane Doe", &features, &crop, at(1)).unwrap();
        let second = reg.upsert("jane doe", &features, &crop, at(2)).unwrap();

        assert_eq!(reg.count().unwrap(), 1);
        assert!(!Path::new(&first.reference.0).exists());
        assert!(Path::new(&second.reference.0).exists());
        let summaries = reg.summaries().unwrap();
        assert_eq!(summaries[0].name, "jane doe");
        assert_eq!(summaries[0].registered_at, "2024-03-01 12:00:02");
    }

    #[test]
    fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));
        let id = reg.upsert("Alice", &features, &crop, at(1)).unwrap();

        assert!(reg.delete("ALICE").unwrap());
        assert!(!reg.delete("alice").unwrap());
        assert_eq!(reg.count().unwrap(), 0);
        assert!(!Path::new(&id.reference.0).exists());
    }

    #[test]
    fn test_malformed_document() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("faces.json"), "{not json").unwrap();
        let reg = open(&tmp);
        assert!(matches!(reg.count().unwrap_err(), RegistryError::Malformed(_)));
    }

    #[test]
    fn test_entry_errors_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(PipelineConfig::default());
        let mut reg = open(&tmp);
        p.enroll("Alice", &warm_face(1), &mut reg).unwrap();
        let ghost = p.enroll("Ghost", &warm_face(2), &mut reg).unwrap();
        fs::remove_file(&ghost.reference.0).unwrap();

        // Truncate one histogram of a third entry by hand.
        p.enroll("Broken", &cool_face(), &mut reg).unwrap();
        let path = tmp.path().join("faces.json");
        let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["users"][2]["features"]["hog_hist"] = serde_json::json!([0.5, 0.5]);
        fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let entries = reg.list_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(matches!(&entries[1], Err(EntryError::MissingReferenceArtifact { name, .. }) if name == "Ghost"));
        assert!(matches!(&entries[2], Err(EntryError::CorruptRegistryEntry { name, .. }) if name == "Broken"));

        match p.verify(&warm_face(1), &reg).unwrap() {
            Outcome::Accept { name, .. } => assert_eq!(name, "Alice"),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_records_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(PipelineConfig::default());
        let mut reg = open(&tmp);
        p.enroll("Alice", &warm_face(1), &mut reg).unwrap();

        let path = tmp.path().join("faces.json");
        let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let mut no_image = json["users"][0].clone();
        no_image["name"] = "Ghost".into();
        no_image.as_object_mut().unwrap().remove("image");
        let mut numeric_name = json["users"][0].clone();
        numeric_name["name"] = 42.into();
        let users = json["users"].as_array_mut().unwrap();
        users.push(no_image);
        users.push(numeric_name);
        fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        assert_eq!(reg.count().unwrap(), 3);
        let entries = reg.list_all().unwrap();
        assert!(entries[0].is_ok());
        assert!(matches!(&entries[1], Err(EntryError::CorruptRegistryEntry { name, .. }) if name == "Ghost"));
        assert!(matches!(&entries[2], Err(EntryError::CorruptRegistryEntry { name, .. }) if name == "entry #2"));
        assert_eq!(reg.summaries().unwrap()[2].name, "(unnamed)");

        match p.verify(&warm_face(1), &reg).unwrap() {
            Outcome::Accept { name, .. } => assert_eq!(name, "Alice"),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_registration_time_is_not_required() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(PipelineConfig::default());
        let mut reg = open(&tmp);
        p.enroll("Alice", &warm_face(1), &mut reg).unwrap();
        p.enroll("Bob", &cool_face(), &mut reg).unwrap();

        let path = tmp.path().join("faces.json");
        let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["users"][0].as_object_mut().unwrap().remove("registered_at");
        json["users"][1]["registered_at"] = "last tuesday".into();
        fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let entries = reg.list_all().unwrap();
        assert_eq!(entries[0].as_ref().unwrap().registered_at, None);
        assert_eq!(entries[1].as_ref().unwrap().registered_at, None);
        assert_eq!(reg.summaries().unwrap()[0].registered_at, "unknown");

        match p.verify(&warm_face(1), &reg).unwrap() {
            Outcome::Accept { name, .. } => assert_eq!(name, "Alice"),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn test_similar_names_get_distinct_artifacts() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));

        let spaced = reg.upsert("Jane Doe", &features, &crop, at(0)).unwrap();
        let underscored = reg.upsert("Jane_Doe", &features, &crop, at(0)).unwrap();
        assert_ne!(spaced.reference, underscored.reference);
        assert!(underscored.reference.0.ends_with("Jane_Doe_20240301_120000_2.png"));

        assert!(reg.delete("Jane_Doe").unwrap());
        assert!(Path::new(&spaced.reference.0).exists());
        let entries = reg.list_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_ref().unwrap().name, "Jane Doe");
    }

    #[test]
    fn test_artifact_stays_in_faces_dir() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));

        for name in ["../escaped", "a/b\\c", ".."] {
            let id = reg.upsert(name, &features, &crop, at(0)).unwrap();
            let path = Path::new(&id.reference.0);
            assert_eq!(path.parent(), Some(tmp.path().join("faces").as_path()), "{name}");
            assert!(path.exists());
        }
        assert!(!tmp.path().join("escaped_20240301_120000.png").exists());
        assert_eq!(artifact_stem("../escaped"), "___escaped");
        assert_eq!(artifact_stem(".."), "user");
    }

    #[test]
    fn test_failed_save_removes_new_artifact() {
        let tmp = TempDir::new().unwrap();
        let mut reg = open(&tmp);
        let (features, crop) = sample_features(&pipeline(PipelineConfig::default()), &warm_face(1));
        fs::create_dir(tmp.path().join("faces.json.tmp")).unwrap();

        assert!(reg.upsert("Alice", &features, &crop, at(0)).is_err());
        assert_eq!(fs::read_dir(tmp.path().join("faces")).unwrap().count(), 0);
        assert_eq!(reg.count().unwrap(), 0);
    }

    #[test]
    fn test_reject_against_remaining_entries() {
        let tmp = TempDir::new().unwrap();
        let strict = pipeline(PipelineConfig {
            decision: DecisionParams { threshold: 0.99, ..DecisionParams::default() },
            ..PipelineConfig::default()
        });
        let mut reg = open(&tmp);
        strict.enroll("Bob", &cool_face(), &mut reg).unwrap();
        let ghost = strict.enroll("Ghost", &warm_face(1), &mut reg).unwrap();
        fs::remove_file(&ghost.reference.0).unwrap();

        match strict.verify(&warm_face(1), &reg).unwrap() {
            Outcome::Reject { top_candidates } => {
                assert_eq!(top_candidates.len(), 1);
                assert_eq!(top_candidates[0].name, "Bob");
            }
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn test_all_entries_unusable_rejects_empty() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(PipelineConfig::default());
        let mut reg = open(&tmp);
        let ghost = p.enroll("Ghost", &warm_face(1), &mut reg).unwrap();
        fs::remove_file(&ghost.reference.0).unwrap();

        assert_eq!(p.verify(&warm_face(1), &reg).unwrap(), Outcome::Reject { top_candidates: vec![] });
    }

    #[test]
    fn test_verify_self_after_reload() {
        let tmp = TempDir::new().unwrap();
        let p = pipeline(PipelineConfig::default());
        {
            let mut reg = open(&tmp);
            p.enroll("Alice", &warm_face(3), &mut reg).unwrap();
            p.enroll("Bob", &cool_face(), &mut reg).unwrap();
        }

        let reg = open(&tmp);
        match p.verify(&warm_face(3), &reg).unwrap() {
            Outcome::Accept { name, confidence } => {
                assert_eq!(name, "Alice");
                assert!(confidence > 99.0, "confidence {confidence}");
            }
            other => panic!("expected Accept, got {other:?}"),
        }
    }
}
