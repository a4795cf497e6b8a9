//! Generation metadata embedded in PNG images
//!
//! Provides:
//! - tEXt chunk extraction from raw PNG bytes
//! - Parsing of JSON and legacy text parameter encodings
//! - Import of a parsed record into generation parameters
//!
//! Malformed input never fails; callers get `None` or `Unrecognized`.

mod parse;
mod png;

use serde::Serialize;

use crate::generation::{GenerationParameters, Seed};

pub use parse::{parse, ParsedMetadata};
pub use png::{chunks, extract, is_png, split_text_chunk, Chunk, Chunks, PNG_SIGNATURE};

/// Generation parameters recovered from an image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: Option<u32>,
    pub scale: Option<f64>,
    pub seed: Option<u64>,
    pub sampler: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl GenerationMetadata {
    /// Overwrite the parameters this record carries, leaving the rest alone
    pub fn apply_to(&self, params: &mut GenerationParameters) {
        if let Some(steps) = self.steps {
            params.steps = steps;
        }
        if let Some(scale) = self.scale {
            params.scale = scale;
        }
        if let Some(seed) = self.seed {
            params.seed = Seed::Fixed(seed);
        }
        if let Some(ref sampler) = self.sampler {
            params.sampler = sampler.clone();
        }
        if let Some(width) = self.width {
            params.width = width;
        }
        if let Some(height) = self.height {
            params.height = height;
        }
    }
}

/// Extract and parse generation metadata from PNG bytes
pub fn read_metadata(data: &[u8]) -> ParsedMetadata {
    match extract(data) {
        Some(text) => parse(&text),
        None => ParsedMetadata::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::png::tests::{png_with, text_chunk};
    use super::*;

    #[test]
    fn test_read_json_metadata() {
        let png = png_with(&[text_chunk("Description", r#"{"prompt":"x","steps":20}"#)]);
        let parsed = read_metadata(&png);
        assert!(matches!(parsed, ParsedMetadata::Json(_)));

        let metadata = parsed.into_metadata().unwrap();
        assert_eq!(metadata.prompt, "x");
        assert_eq!(metadata.steps, Some(20));
    }

    #[test]
    fn test_read_legacy_metadata() {
        let png = png_with(&[text_chunk(
            "Comment",
            "catgirl, Negative prompt: bad, Steps: 28, Sampler: Euler a, CFG scale: 7, Seed: 42, Size: 832x1216,",
        )]);
        let metadata = read_metadata(&png).into_metadata().unwrap();
        assert_eq!(metadata.prompt, "catgirl");
        assert_eq!(metadata.seed, Some(42));
    }

    #[test]
    fn test_read_rejects_non_png() {
        assert_eq!(read_metadata(b"not a png"), ParsedMetadata::Unrecognized);
    }

    #[test]
    fn test_apply_to_parameters() {
        let metadata = GenerationMetadata {
            steps: Some(20),
            seed: Some(0),
            sampler: Some("euler_a".to_string()),
            ..Default::default()
        };
        let mut params = GenerationParameters::default();
        metadata.apply_to(&mut params);

        assert_eq!(params.steps, 20);
        assert_eq!(params.seed, Seed::Fixed(0));
        assert_eq!(params.sampler, "euler_a");
        assert_eq!(params.width, 832);
    }
}
