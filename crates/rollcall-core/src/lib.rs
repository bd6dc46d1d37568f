//! rollcall-core — Identity matching engine.
//!
//! Compares probe face embeddings against enrolled identity records
//! using Euclidean distance under a caller-supplied threshold. The
//! embedding extractor itself lives behind the [`FaceExtractor`]
//! boundary; this crate never sees pixels.

pub mod distance;
pub mod extractor;
pub mod matcher;
pub mod types;

pub use distance::DistanceError;
pub use extractor::{Detection, ExtractorError, FaceExtractor};
pub use matcher::{EuclideanMatcher, Matcher};
pub use types::{BoundingBox, Embedding, IdentityRecord, IdentitySummary, MatchResult};
