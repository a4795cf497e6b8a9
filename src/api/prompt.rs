//! Prompt compilation and tag endpoints

use std::collections::HashMap;

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::prompt::{
    compile_with_overrides, compile_with_variables, extract_variables, ModuleOverrides,
    PromptChain,
};
use crate::tags::{self, Tag};

/// Build the prompt router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prompt/compile", post(compile))
        .route("/prompt/variables", post(variables))
        .route("/tags/parse", post(parse_tags))
        .route("/tags/format", post(format_tags))
}

/// Compile request
#[derive(Debug, Deserialize)]
struct CompileRequest {
    chain: PromptChain,
    /// Falls back to the chain's own subject
    subject: Option<String>,
    /// Session module toggles by module id
    #[serde(default)]
    overrides: ModuleOverrides,
    /// Placeholder values; without them `{tag}` emphasis is left alone
    variables: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct CompileResponse {
    prompt: String,
    negative_prompt: String,
}

/// POST /prompt/compile
async fn compile(Json(request): Json<CompileRequest>) -> impl IntoResponse {
    let subject = request
        .subject
        .as_deref()
        .unwrap_or(&request.chain.subject);
    let prompt = match request.variables {
        Some(ref variables) if !variables.is_empty() => {
            compile_with_variables(&request.chain, subject, &request.overrides, variables)
        }
        _ => compile_with_overrides(&request.chain, subject, &request.overrides),
    };

    Json(CompileResponse {
        prompt,
        negative_prompt: request.chain.negative_prompt.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct VariablesResponse {
    variables: Vec<String>,
}

/// POST /prompt/variables
async fn variables(Json(request): Json<TextRequest>) -> impl IntoResponse {
    Json(VariablesResponse {
        variables: extract_variables(&request.text),
    })
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    tags: Vec<Tag>,
}

/// Prefix like `artist:` built from the configured entity tag
fn tag_prefix(state: &AppState) -> Option<String> {
    (!state.entity_tag.is_empty()).then(|| format!("{}:", state.entity_tag))
}

/// POST /tags/parse
/// Batch import: comma/newline separated, bracket-weighted tags
async fn parse_tags(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let prefix = tag_prefix(&state);
    Json(TagsResponse {
        tags: tags::parse_batch(&request.text, prefix.as_deref()),
    })
}

#[derive(Debug, Deserialize)]
struct FormatRequest {
    tags: Vec<Tag>,
}

#[derive(Debug, Serialize)]
struct FormatResponse {
    text: String,
}

/// POST /tags/format
async fn format_tags(
    State(state): State<AppState>,
    Json(request): Json<FormatRequest>,
) -> impl IntoResponse {
    let prefix = tag_prefix(&state);
    Json(FormatResponse {
        text: tags::format_batch(&request.tags, prefix.as_deref()),
    })
}
