//! Interpretation of extracted metadata text
//!
//! Two encodings are recognised:
//! - JSON objects with `prompt`, `uc`, `steps`, `scale`, `seed`, `sampler`, `width`, `height`
//! - Legacy text: `<prompt> Negative prompt: <negative> Steps: 28, Sampler: Euler a, ...`

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::GenerationMetadata;
use crate::generation::normalize_sampler;

const NEGATIVE_MARKER: &str = "Negative prompt:";
const STEPS_MARKER: &str = "Steps:";

fn param_regex(key: &str) -> Regex {
    Regex::new(&format!(r"{}:\s*([^,]+)", regex::escape(key))).unwrap()
}

static STEPS_REGEX: LazyLock<Regex> = LazyLock::new(|| param_regex("Steps"));
static SAMPLER_REGEX: LazyLock<Regex> = LazyLock::new(|| param_regex("Sampler"));
static SCALE_REGEX: LazyLock<Regex> = LazyLock::new(|| param_regex("CFG scale"));
static SEED_REGEX: LazyLock<Regex> = LazyLock::new(|| param_regex("Seed"));
static SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| param_regex("Size"));

/// Metadata resolved once at parse time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "metadata", rename_all = "snake_case")]
pub enum ParsedMetadata {
    Json(GenerationMetadata),
    Text(GenerationMetadata),
    Unrecognized,
}

impl ParsedMetadata {
    /// The parsed record, if any
    pub fn metadata(&self) -> Option<&GenerationMetadata> {
        match self {
            ParsedMetadata::Json(m) | ParsedMetadata::Text(m) => Some(m),
            ParsedMetadata::Unrecognized => None,
        }
    }

    pub fn into_metadata(self) -> Option<GenerationMetadata> {
        match self {
            ParsedMetadata::Json(m) | ParsedMetadata::Text(m) => Some(m),
            ParsedMetadata::Unrecognized => None,
        }
    }
}

/// Parse metadata text in whichever encoding it uses
pub fn parse(text: &str) -> ParsedMetadata {
    if text.trim_start().starts_with('{') {
        if let Some(metadata) = parse_json(text) {
            return ParsedMetadata::Json(metadata);
        }
    }

    match parse_text(text) {
        Some(metadata) => ParsedMetadata::Text(metadata),
        None => ParsedMetadata::Unrecognized,
    }
}

fn parse_json(text: &str) -> Option<GenerationMetadata> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    let string = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    Some(GenerationMetadata {
        prompt: string("prompt").unwrap_or_default(),
        negative_prompt: string("uc").unwrap_or_default(),
        steps: object.get("steps").and_then(as_u64).map(|n| n as u32),
        scale: object.get("scale").and_then(as_f64),
        seed: object.get("seed").and_then(as_u64),
        sampler: string("sampler").map(|s| normalize_sampler(&s)),
        width: object.get("width").and_then(as_u64).map(|n| n as u32),
        height: object.get("height").and_then(as_u64).map(|n| n as u32),
    })
}

/// Numbers may arrive as JSON numbers or numeric strings
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_text(text: &str) -> Option<GenerationMetadata> {
    let params_start = text.find(STEPS_MARKER)?;
    let negative_start = text.find(NEGATIVE_MARKER).filter(|&i| i < params_start);

    let prompt_end = negative_start.unwrap_or(params_start);
    let negative_prompt = negative_start
        .map(|i| clean_segment(&text[i + NEGATIVE_MARKER.len()..params_start]))
        .unwrap_or_default();

    let block = &text[params_start..];
    let capture = |re: &Regex| {
        re.captures(block)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let (width, height) = capture(&SIZE_REGEX)
        .and_then(|size| {
            let (w, h) = size.split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
        .map_or((None, None), |(w, h)| (Some(w), Some(h)));

    Some(GenerationMetadata {
        prompt: clean_segment(&text[..prompt_end]),
        negative_prompt,
        steps: capture(&STEPS_REGEX).and_then(|s| s.parse().ok()),
        scale: capture(&SCALE_REGEX).and_then(|s| s.parse().ok()),
        seed: capture(&SEED_REGEX).and_then(|s| s.parse().ok()),
        sampler: capture(&SAMPLER_REGEX).map(|s| normalize_sampler(&s)),
        width,
        height,
    })
}

/// Trim whitespace and a dangling separator comma
fn clean_segment(segment: &str) -> String {
    segment.trim().trim_end_matches(',').trim().to_string()
}
