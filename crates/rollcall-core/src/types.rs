use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in pixel coordinates of the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (typically 128-dimensional, fixed by the extractor).
///
/// Immutable once produced; the values are compared by distance only and
/// never re-normalized or edited after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of dimensions in this embedding.
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One enrolled identity: every reference embedding on file plus metadata.
///
/// A record that exists always has at least one embedding — the store
/// never persists an empty one. Embeddings are kept in enrollment order
/// and only ever appended to; more reference shots per identity improve
/// later matching across poses and lighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Opaque unique id, stable external reference (e.g. a user id).
    pub identity_id: String,
    /// Human-readable label for diagnostics.
    pub display_name: Option<String>,
    /// Reference embeddings, one per successful enrollment.
    pub embeddings: Vec<Embedding>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Lightweight view of an identity record without the vectors,
/// for listings and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub identity_id: String,
    pub display_name: Option<String>,
    pub embedding_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            identity_id: self.identity_id.clone(),
            display_name: self.display_name.clone(),
            embedding_count: self.embeddings.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Result of matching a probe embedding against enrolled identities.
///
/// "No match" is a successful outcome, not an error: `matched=false`
/// with `identity_id=None` means no enrolled identity came under
/// threshold (or, for a 1:1 check, that the claimed identity is not
/// enrolled at all). `distance` reports the best distance observed even
/// on a non-match so callers can log near-misses; it is `None` only
/// when there was nothing to compare against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Identity the probe was compared against (1:1) or best-matched (1:N).
    pub identity_id: Option<String>,
    /// Euclidean distance of the best comparison. Lower = more similar.
    pub distance: Option<f32>,
    /// Display name of the matched identity, if any.
    pub display_name: Option<String>,
}

impl MatchResult {
    /// A non-match with nothing compared (unknown identity or empty store).
    pub fn no_match() -> Self {
        Self {
            matched: false,
            identity_id: None,
            distance: None,
            display_name: None,
        }
    }
}
