//! Metadata import endpoint
//!
//! POST /metadata/extract - raw PNG body in, parsed generation parameters out

use axum::{body::Bytes, extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Serialize;
use tracing::debug;

use super::AppState;
use crate::generation::GenerationParameters;
use crate::metadata::{read_metadata, GenerationMetadata, ParsedMetadata};

/// Build the metadata router
pub fn router() -> Router<AppState> {
    Router::new().route("/metadata/extract", post(extract))
}

#[derive(Debug, Serialize)]
struct ExtractResponse {
    /// "json", "text" or "unrecognized"
    format: &'static str,
    metadata: Option<GenerationMetadata>,
    /// Current parameters with the recovered values applied
    parameters: Option<GenerationParameters>,
}

/// Unsupported input is not an error: the response says `unrecognized`
async fn extract(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let parsed = read_metadata(&body);
    let format = match parsed {
        ParsedMetadata::Json(_) => "json",
        ParsedMetadata::Text(_) => "text",
        ParsedMetadata::Unrecognized => "unrecognized",
    };
    debug!("Metadata import of {} bytes: {}", body.len(), format);

    let metadata = parsed.into_metadata();
    let parameters = metadata.as_ref().map(|metadata| {
        let mut params = state.context.read().parameters.clone();
        metadata.apply_to(&mut params);
        params
    });

    Json(ExtractResponse {
        format,
        metadata,
        parameters,
    })
}
