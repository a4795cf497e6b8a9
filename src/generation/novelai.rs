//! HTTP client for the remote image API
//!
//! Requests are posted as JSON with a bearer key. A successful response body
//! is a zip archive holding exactly one image.

use std::io::{Cursor, Read};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{GenerationClient, GenerationError, GenerationRequest};
use crate::images::GeneratedImage;

/// Remote image generation client
#[derive(Debug, Clone)]
pub struct NovelAiClient {
    client: Client,
    base_url: String,
}

impl NovelAiClient {
    /// Create a new client for `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint receiving generation requests
    pub fn endpoint(&self) -> String {
        format!("{}/ai/generate-image", self.base_url)
    }
}

#[async_trait]
impl GenerationClient for NovelAiClient {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError> {
        if api_key.is_empty() {
            return Err(GenerationError::remote("API key not configured"));
        }

        debug!(
            "Sending generation request ({}x{}, {} steps)",
            request.parameters.width, request.parameters.height, request.parameters.steps
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::remote(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Generation API error: {} - {}", status, body);
            return Err(GenerationError::remote(format!(
                "API error: {} - {}",
                status, body
            )));
        }

        let archive = response
            .bytes()
            .await
            .map_err(|e| GenerationError::remote(format!("Failed to read response: {}", e)))?;

        let data = extract_single_file(&archive)?;
        Ok(GeneratedImage::new(data))
    }
}

/// Return the bytes of the single file inside a zip archive.
///
/// Extra entries are ignored; an empty archive is an error.
pub fn extract_single_file(archive: &[u8]) -> Result<Vec<u8>, GenerationError> {
    let mut archive = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| GenerationError::remote(format!("Invalid ZIP response: {}", e)))?;

    if archive.is_empty() {
        return Err(GenerationError::remote("ZIP response contained no image"));
    }
    if archive.len() > 1 {
        debug!("ZIP response has {} entries, using the first", archive.len());
    }

    let mut file = archive
        .by_index(0)
        .map_err(|e| GenerationError::remote(format!("Failed to open image entry: {}", e)))?;

    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)
        .map_err(|e| GenerationError::remote(format!("Failed to read image entry: {}", e)))?;

    Ok(data)
}
