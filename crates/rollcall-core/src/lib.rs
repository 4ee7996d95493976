//! rollcall-core — face descriptor pipeline for attendance logging.
//!
//! Detection and descriptor encoding run via ONNX Runtime behind the
//! [`FaceEngine`] seam; the [`DescriptorStore`] holds the known identities
//! and their reference descriptors, with a fingerprinted binary cache.

pub mod detector;
pub mod encoder;
pub mod engine;
pub mod store;
pub mod types;

pub use engine::{EngineError, FaceEngine, OnnxFaceEngine};
pub use store::{DescriptorStore, Roster, StoreError};
pub use types::{Descriptor, FaceRegion, Identity, MatchResult, Matcher, NearestMatcher, StoreEntry};
