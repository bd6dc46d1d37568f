use rollcall_core::{
    Detection, DistanceError, Embedding, EuclideanMatcher, ExtractorError, FaceExtractor,
    IdentitySummary, MatchResult, Matcher,
};
use rollcall_store::{IdentityStore, StoreError};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no face detected in the supplied image")]
    NoFaceDetected,
    #[error("{count} faces detected — enrollment requires exactly one subject in frame")]
    MultipleFacesDetected { count: usize },
    #[error("probe has {actual} dimensions, store is configured for {expected}")]
    InvalidProbe { expected: usize, actual: usize },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractorError),
    #[error("distance error: {0}")]
    Distance(#[from] DistanceError),
}

/// Result of a successful enrollment.
#[derive(Debug, Clone)]
pub struct EnrollResult {
    pub identity_id: String,
    /// Total reference embeddings now on file for this identity.
    pub embeddings_on_file: usize,
}

/// Caller-facing facade over the identity store and matching engine.
///
/// Every method is a plain synchronous call and keeps no state between
/// calls beyond what lives in the store, so the service can be shared
/// across threads freely. Nothing here retries on transient store
/// failures: enroll is not idempotent (a blind retry appends a duplicate
/// embedding), so retry policy belongs to the caller.
pub struct RollcallService {
    store: IdentityStore,
    matcher: EuclideanMatcher,
}

impl RollcallService {
    pub fn new(store: IdentityStore) -> Self {
        Self {
            store,
            matcher: EuclideanMatcher,
        }
    }

    /// Open the store described by `config` and wrap it in a service.
    pub fn open(config: &Config) -> Result<Self, ServiceError> {
        let store = IdentityStore::open(&config.db_path, config.embedding_dim)?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    /// Enroll extractor output for `identity_id`.
    ///
    /// Requires exactly one detected face: zero detections is
    /// [`ServiceError::NoFaceDetected`], more than one is
    /// [`ServiceError::MultipleFacesDetected`] — with two people in frame
    /// there is no way to know which face the caller meant, and silently
    /// enrolling the wrong one would be a security hole. On failure the
    /// store is untouched. Re-enrollment appends, never overwrites.
    pub fn enroll(
        &self,
        identity_id: &str,
        display_name: Option<&str>,
        detections: &[Detection],
    ) -> Result<EnrollResult, ServiceError> {
        let detection = match detections {
            [] => return Err(ServiceError::NoFaceDetected),
            [single] => single,
            many => {
                return Err(ServiceError::MultipleFacesDetected { count: many.len() })
            }
        };

        let total = self.store.upsert(
            identity_id,
            display_name,
            std::slice::from_ref(&detection.embedding),
        )?;

        tracing::info!(
            identity_id,
            confidence = detection.bbox.confidence,
            embeddings_on_file = total,
            "enrolled"
        );

        Ok(EnrollResult {
            identity_id: identity_id.to_string(),
            embeddings_on_file: total,
        })
    }

    /// Run `extractor` over raw image bytes and enroll the result.
    ///
    /// Convenience for hosting layers that hold the image; the extractor
    /// stays a black box and its errors pass through untouched.
    pub fn enroll_image(
        &self,
        extractor: &dyn FaceExtractor,
        image: &[u8],
        identity_id: &str,
        display_name: Option<&str>,
    ) -> Result<EnrollResult, ServiceError> {
        let detections = extractor.extract(image)?;
        self.enroll(identity_id, display_name, &detections)
    }

    /// 1:1 verification: does `probe` match the claimed `identity_id`?
    ///
    /// An unknown identity folds into `matched=false` with
    /// `identity_id=None` — an unrecognized claim is an expected outcome,
    /// not a fault.
    pub fn verify(
        &self,
        probe: &Embedding,
        identity_id: &str,
        threshold: f32,
    ) -> Result<MatchResult, ServiceError> {
        self.check_probe(probe)?;

        let Some(record) = self.store.get(identity_id)? else {
            tracing::debug!(identity_id, "verify: identity not enrolled");
            return Ok(MatchResult::no_match());
        };

        let result = self.matcher.verify(probe, &record, threshold)?;
        tracing::info!(
            identity_id,
            matched = result.matched,
            distance = result.distance,
            "verify"
        );
        Ok(result)
    }

    /// 1:N identification: which enrolled identity does `probe` best match?
    ///
    /// An empty store is a normal non-match. Scans every embedding on
    /// file per call; exact and reproducible, sized for stores up to low
    /// tens of thousands of embeddings.
    pub fn identify(&self, probe: &Embedding, threshold: f32) -> Result<MatchResult, ServiceError> {
        self.check_probe(probe)?;

        let records = self.store.all()?;
        let result = self.matcher.identify(probe, &records, threshold)?;
        tracing::info!(
            matched = result.matched,
            identity_id = result.identity_id.as_deref(),
            distance = result.distance,
            candidates = records.len(),
            "identify"
        );
        Ok(result)
    }

    /// Administrative removal of an enrolled identity. Idempotent.
    pub fn remove_identity(&self, identity_id: &str) -> Result<bool, ServiceError> {
        Ok(self.store.remove(identity_id)?)
    }

    /// Enrollment summaries (no vectors), ordered by `identity_id`.
    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>, ServiceError> {
        Ok(self.store.all()?.iter().map(|r| r.summary()).collect())
    }

    fn check_probe(&self, probe: &Embedding) -> Result<(), ServiceError> {
        if probe.dim() != self.store.dim() {
            return Err(ServiceError::InvalidProbe {
                expected: self.store.dim(),
                actual: probe.dim(),
            });
        }
        Ok(())
    }
}
