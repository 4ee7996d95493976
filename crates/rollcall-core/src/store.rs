//! Descriptor store: reference descriptors for known identities, backed by
//! a binary cache artifact.
//!
//! The store is either fully built from the reference image directory or
//! fully loaded from the cache, never partially populated. Cache staleness
//! is detected with a content hash of the reference set, so editing the
//! directory invalidates the artifact without manual intervention.

use crate::engine::FaceEngine;
use crate::types::{Descriptor, Identity, StoreEntry};
use bincode::config::Configuration;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bumped whenever the cache layout changes; older artifacts rebuild.
const CACHE_VERSION: u32 = 1;
const CACHE_CONFIG: Configuration = bincode::config::standard();
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Identity name → roll number, from the roster configuration table.
pub type Roster = BTreeMap<String, u32>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("reference image directory unreadable: {}: {source}", .path.display())]
    ImageDir { path: PathBuf, source: io::Error },
    #[error("descriptor cache unreadable: {}: {detail}", .path.display())]
    CacheCorrupt { path: PathBuf, detail: String },
}

/// On-disk cache artifact: parallel lists, opaque outside this module.
#[derive(bincode::Encode, bincode::Decode)]
struct CacheFile {
    version: u32,
    fingerprint: [u8; 32],
    names: Vec<String>,
    rolls: Vec<Option<u32>>,
    descriptors: Vec<Vec<f32>>,
}

/// Ordered collection of (identity, descriptor) pairs for all known
/// individuals. Names are unique; iteration order is the insertion order
/// (reference files sorted by name), which the matcher's tie-break relies on.
pub struct DescriptorStore {
    entries: Vec<StoreEntry>,
    fingerprint: [u8; 32],
}

impl DescriptorStore {
    /// Load the store, preferring the cache artifact when it is present,
    /// decodable, and fingerprint-matched; otherwise build from the
    /// reference images and persist a fresh artifact.
    ///
    /// An undecodable cache is reported as [`StoreError::CacheCorrupt`];
    /// callers may recover by forcing a [`rebuild`](Self::rebuild).
    pub fn load<E: FaceEngine>(
        engine: &mut E,
        image_dir: &Path,
        roster: &Roster,
        cache_path: &Path,
    ) -> Result<Self, StoreError> {
        let files = list_reference_images(image_dir)?;
        let fingerprint = fingerprint_files(&files);

        if cache_path.exists() {
            let corrupt = |detail: String| StoreError::CacheCorrupt {
                path: cache_path.to_path_buf(),
                detail,
            };
            let bytes = fs::read(cache_path).map_err(|e| corrupt(e.to_string()))?;
            let cache: CacheFile = bincode::decode_from_slice(&bytes, CACHE_CONFIG)
                .map(|(cache, _)| cache)
                .map_err(|e| corrupt(e.to_string()))?;

            if cache.names.len() != cache.rolls.len()
                || cache.names.len() != cache.descriptors.len()
            {
                return Err(corrupt("parallel list lengths disagree".to_string()));
            }

            if cache.version == CACHE_VERSION && cache.fingerprint == fingerprint {
                let entries = cache
                    .names
                    .into_iter()
                    .zip(cache.rolls)
                    .zip(cache.descriptors)
                    .map(|((name, roll_number), values)| StoreEntry {
                        identity: Identity { name, roll_number },
                        descriptor: Descriptor::new(values),
                    })
                    .collect::<Vec<_>>();
                tracing::info!(entries = entries.len(), "descriptor cache loaded");
                return Ok(Self {
                    entries,
                    fingerprint,
                });
            }

            tracing::info!(
                cache = %cache_path.display(),
                "descriptor cache is stale; rebuilding from reference images"
            );
        }

        let store = Self::build(engine, &files, roster, fingerprint);
        store.persist(cache_path);
        Ok(store)
    }

    /// Build from the reference images unconditionally, replacing any cache
    /// artifact. Used to recover from a corrupt cache and by the `encode`
    /// subcommand.
    pub fn rebuild<E: FaceEngine>(
        engine: &mut E,
        image_dir: &Path,
        roster: &Roster,
        cache_path: &Path,
    ) -> Result<Self, StoreError> {
        let files = list_reference_images(image_dir)?;
        let fingerprint = fingerprint_files(&files);
        let store = Self::build(engine, &files, roster, fingerprint);
        store.persist(cache_path);
        Ok(store)
    }

    /// Encode every usable reference image.
    ///
    /// A file is skipped with a warning when it fails to decode, when it
    /// does not contain exactly one face, or when the engine fails on it.
    /// Skips never abort the remaining files.
    fn build<E: FaceEngine>(
        engine: &mut E,
        files: &[PathBuf],
        roster: &Roster,
        fingerprint: [u8; 32],
    ) -> Self {
        let mut entries: Vec<StoreEntry> = Vec::new();

        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if entries.iter().any(|e| e.identity.name == name) {
                tracing::warn!(name, file = %path.display(), "duplicate identity name; keeping the first file");
                continue;
            }

            let image = match image::open(path) {
                Ok(image) => image.to_luma8(),
                Err(error) => {
                    tracing::warn!(file = %path.display(), %error, "skipping undecodable reference image");
                    continue;
                }
            };
            let (width, height) = image.dimensions();
            let gray = image.into_raw();

            let regions = match engine.locate(&gray, width, height) {
                Ok(regions) => regions,
                Err(error) => {
                    tracing::warn!(name, %error, "face detection failed on reference image; skipping");
                    continue;
                }
            };
            if regions.len() != 1 {
                tracing::warn!(
                    name,
                    faces = regions.len(),
                    "reference image must contain exactly one face; skipping"
                );
                continue;
            }

            let descriptor = match engine.descriptor(&gray, width, height, &regions[0]) {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    tracing::warn!(name, %error, "descriptor encoding failed on reference image; skipping");
                    continue;
                }
            };

            entries.push(StoreEntry {
                identity: Identity {
                    name: name.to_string(),
                    roll_number: roster.get(name).copied(),
                },
                descriptor,
            });
        }

        tracing::info!(entries = entries.len(), "descriptor store built");
        Self {
            entries,
            fingerprint,
        }
    }

    /// Write the cache artifact atomically (temp sibling, then rename).
    /// Best-effort: a failure is logged and the in-memory store stands.
    fn persist(&self, cache_path: &Path) {
        let cache = CacheFile {
            version: CACHE_VERSION,
            fingerprint: self.fingerprint,
            names: self.entries.iter().map(|e| e.identity.name.clone()).collect(),
            rolls: self.entries.iter().map(|e| e.identity.roll_number).collect(),
            descriptors: self
                .entries
                .iter()
                .map(|e| e.descriptor.values.clone())
                .collect(),
        };

        let bytes = match bincode::encode_to_vec(&cache, CACHE_CONFIG) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "descriptor cache encoding failed; continuing without cache");
                return;
            }
        };

        if let Err(error) = write_atomic(cache_path, &bytes) {
            tracing::warn!(
                cache = %cache_path.display(),
                %error,
                "descriptor cache write failed; continuing without cache"
            );
        }
    }

    /// Assemble a store from pre-computed entries, bypassing the reference
    /// directory and cache entirely.
    pub fn from_entries(entries: Vec<StoreEntry>) -> Self {
        Self {
            entries,
            fingerprint: [0u8; 32],
        }
    }

    pub fn entries(&self) -> &[StoreEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Supported image files in the reference directory, sorted by file name.
/// The sort fixes the store's insertion order across runs.
fn list_reference_images(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let unreadable = |source: io::Error| StoreError::ImageDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if supported && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// SHA-256 over the sorted sequence of (file name, file contents).
fn fingerprint_files(files: &[PathBuf]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for path in files {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        match fs::read(path) {
            Ok(bytes) => hasher.update(&bytes),
            Err(error) => {
                tracing::warn!(file = %path.display(), %error, "unreadable file ignored by fingerprint");
            }
        }
        hasher.update([0u8]);
    }
    hasher.finalize().into()
}
