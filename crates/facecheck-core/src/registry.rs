//! Enrolled-identity storage seam.

use crate::types::{name_key, FeatureVector, Identity, ReferenceHandle};
use chrono::NaiveDateTime;
use image::RgbImage;
use thiserror::Error;

/// A single registry entry that could not be loaded. Scoring skips it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error("registry entry '{name}' is corrupt: {reason}")]
    CorruptRegistryEntry { name: String, reason: String },
    #[error("reference image for '{name}' at {path} is unreadable: {reason}")]
    MissingReferenceArtifact { name: String, path: String, reason: String },
}

impl EntryError {
    pub fn name(&self) -> &str {
        match self {
            EntryError::CorruptRegistryEntry { name, .. } => name,
            EntryError::MissingReferenceArtifact { name, .. } => name,
        }
    }
}

/// The registry as a whole could not be read or written.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry document is malformed: {0}")]
    Malformed(String),
    #[error("reference artifact: {0}")]
    Artifact(String),
}

/// Durable store of enrolled identities.
///
/// Names are unique case-insensitively. Each identity owns one reference
/// artifact (the enrolled face image), released when the identity is
/// replaced or deleted.
pub trait Registry {
    /// Every entry, each loaded independently.
    fn list_all(&self) -> Result<Vec<Result<Identity, EntryError>>, RegistryError>;

    /// Insert `name`, replacing any identity whose name matches
    /// case-insensitively. `face_crop` becomes the new reference artifact.
    fn upsert(
        &mut self,
        name: &str,
        features: &FeatureVector,
        face_crop: &RgbImage,
        registered_at: NaiveDateTime,
    ) -> Result<Identity, RegistryError>;

    /// Remove `name` (case-insensitive). Returns whether anything was removed.
    fn delete(&mut self, name: &str) -> Result<bool, RegistryError>;

    fn count(&self) -> Result<usize, RegistryError>;
}

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    identities: Vec<Identity>,
    released: Vec<ReferenceHandle>,
    next_handle: u64,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles released by replacement or deletion, oldest first.
    pub fn released(&self) -> &[ReferenceHandle] {
        &self.released
    }

    fn remove_key(&mut self, key: &str) -> bool {
        let before = self.identities.len();
        let mut released = Vec::new();
        self.identities.retain(|i| {
            if name_key(&i.name) == key {
                released.push(i.reference.clone());
                false
            } else {
                true
            }
        });
        self.released.extend(released);
        self.identities.len() != before
    }
}

impl Registry for InMemoryRegistry {
    fn list_all(&self) -> Result<Vec<Result<Identity, EntryError>>, RegistryError> {
        Ok(self.identities.iter().cloned().map(Ok).collect())
    }

    fn upsert(
        &mut self,
        name: &str,
        features: &FeatureVector,
        _face_crop: &RgbImage,
        registered_at: NaiveDateTime,
    ) -> Result<Identity, RegistryError> {
        let name = name.trim();
        self.remove_key(&name_key(name));

        self.next_handle += 1;
        let identity = Identity {
            name: name.to_string(),
            features: features.clone(),
            reference: ReferenceHandle(format!("mem:{}", self.next_handle)),
            registered_at: Some(registered_at),
        };
        self.identities.push(identity.clone());
        Ok(identity)
    }

    fn delete(&mut self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.remove_key(&name_key(name)))
    }

    fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.identities.len())
    }
}
