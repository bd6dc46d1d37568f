//! Embedding-extractor boundary.
//!
//! The extractor is an external collaborator: given decoded image bytes it
//! returns zero or more detections, each a fixed-length embedding plus its
//! bounding box. Everything on this side of the boundary consumes
//! embeddings only and never looks at pixels.

use crate::types::{BoundingBox, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("extractor backend failed: {0}")]
    Backend(String),
}

/// One detected face: its embedding and where it was found in the image.
#[derive(Debug, Clone)]
pub struct Detection {
    pub embedding: Embedding,
    pub bbox: BoundingBox,
}

/// Face detection + embedding extraction over a still image.
///
/// The sequence length equals the number of detected faces (0, 1, or
/// more). Input is one well-defined binary image representation; any
/// base64 or multipart decoding is a transport concern upstream.
pub trait FaceExtractor {
    fn extract(&self, image: &[u8]) -> Result<Vec<Detection>, ExtractorError>;
}
