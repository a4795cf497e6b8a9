//! Generated images
//!
//! Images returned by the generation API are content-addressed by their
//! SHA-256 hash and stored on entities as self-contained `data:` URLs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

use crate::metadata::PNG_SIGNATURE;

/// Image bytes returned by a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub hash: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    /// Wrap raw image bytes, sniffing the MIME type
    pub fn new(data: Vec<u8>) -> Self {
        let mime_type = sniff_mime_type(&data).to_string();
        Self {
            hash: compute_hash(&data),
            data,
            mime_type,
        }
    }

    /// Reference stored in an entity's result list
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }

    /// Short hash prefix for log lines
    pub fn short_hash(&self) -> &str {
        &self.hash[..12.min(self.hash.len())]
    }
}

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Best-effort MIME type from magic bytes
pub fn sniff_mime_type(data: &[u8]) -> &'static str {
    if data.starts_with(&PNG_SIGNATURE) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}
