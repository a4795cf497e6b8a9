//! Image generation requests
//!
//! Provides:
//! - Generation parameters and the seed convention
//! - The wire request sent to the remote image API
//! - Classified generation failures
//! - The `GenerationClient` seam and its HTTP implementation

mod novelai;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::images::GeneratedImage;

pub use novelai::{extract_single_file, NovelAiClient};

/// Model identifier sent with every request unless configured otherwise
pub const DEFAULT_MODEL: &str = "nai-diffusion-4-5-full";

/// Highest step count the remote API accepts without extra cost
pub const MAX_STEPS: u32 = 28;

/// Seed selection.
///
/// Absence means "let the server pick". `0` is a valid fixed seed; the
/// legacy `-1` and `"random"` markers are accepted on input and read as random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seed {
    #[default]
    Random,
    Fixed(u64),
}

impl Seed {
    /// The fixed value, if any
    pub fn value(&self) -> Option<u64> {
        match self {
            Seed::Random => None,
            Seed::Fixed(seed) => Some(*seed),
        }
    }

    /// The fixed value, or `fallback` when random
    pub fn or_fallback(&self, fallback: u64) -> u64 {
        self.value().unwrap_or(fallback)
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Seed::Random => serializer.serialize_none(),
            Seed::Fixed(seed) => serializer.serialize_some(seed),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeed {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seed = match Option::<RawSeed>::deserialize(deserializer)? {
            None => Seed::Random,
            Some(RawSeed::Int(n)) if n >= 0 => Seed::Fixed(n as u64),
            Some(RawSeed::Int(_)) => Seed::Random,
            Some(RawSeed::Float(f)) if f >= 0.0 && f.fract() == 0.0 => Seed::Fixed(f as u64),
            Some(RawSeed::Float(_)) => Seed::Random,
            Some(RawSeed::Text(text)) => match text.trim().parse::<u64>() {
                Ok(n) => Seed::Fixed(n),
                Err(_) => Seed::Random,
            },
        };
        Ok(seed)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Random => write!(f, "random"),
            Seed::Fixed(seed) => write!(f, "{}", seed),
        }
    }
}

/// Lowercase a sampler name and replace spaces with underscores
/// (`"Euler a"` -> `"euler_a"`)
pub fn normalize_sampler(sampler: &str) -> String {
    sampler.trim().to_lowercase().replace(' ', "_")
}

/// Parameters shared by every request of a chain or benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParameters {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub scale: f64,
    pub sampler: String,
    pub seed: Seed,
    pub quality_toggle: bool,
    /// Index of a server-side negative prompt bundle
    pub uc_preset: Option<u32>,
    pub cfg_rescale: Option<f64>,
    pub variety_boost: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            width: 832,
            height: 1216,
            steps: MAX_STEPS,
            scale: 5.0,
            sampler: "k_euler_ancestral".to_string(),
            seed: Seed::Random,
            quality_toggle: true,
            uc_preset: None,
            cfg_rescale: None,
            variety_boost: false,
        }
    }
}

impl GenerationParameters {
    /// Step count capped at [`MAX_STEPS`]
    pub fn clamped_steps(&self) -> u32 {
        self.steps.clamp(1, MAX_STEPS)
    }
}

/// Caption block of the v4 prompt format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Caption {
    pub base_caption: String,
    pub char_captions: Vec<serde_json::Value>,
}

impl Caption {
    fn new(text: &str) -> Self {
        Self {
            base_caption: text.to_string(),
            char_captions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V4Prompt {
    pub caption: Caption,
    pub use_coords: bool,
    pub use_order: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V4NegativePrompt {
    pub caption: Caption,
    pub legacy_uc: bool,
}

/// The `parameters` object of a generation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestParameters {
    pub params_version: u8,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub sampler: String,
    pub steps: u32,
    pub n_samples: u32,
    #[serde(rename = "ucPreset")]
    pub uc_preset: u32,
    #[serde(rename = "qualityToggle")]
    pub quality_toggle: bool,
    pub cfg_rescale: f64,
    pub variety_boost: bool,
    pub sm: bool,
    pub sm_dyn: bool,
    pub dynamic_thresholding: bool,
    pub controlnet_strength: u32,
    pub legacy: bool,
    pub add_original_image: bool,
    pub uncond_scale: u32,
    pub noise_schedule: String,
    pub negative_prompt: String,
    /// Omitted entirely when the server should choose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub v4_prompt: V4Prompt,
    pub v4_negative_prompt: V4NegativePrompt,
}

/// A complete request to the remote image API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub input: String,
    pub model: String,
    pub action: String,
    pub parameters: RequestParameters,
}

impl GenerationRequest {
    /// Build a request for a compiled prompt
    pub fn new(model: &str, prompt: &str, negative: &str, params: &GenerationParameters) -> Self {
        Self {
            input: prompt.to_string(),
            model: model.to_string(),
            action: "generate".to_string(),
            parameters: RequestParameters {
                params_version: 3,
                width: params.width,
                height: params.height,
                scale: params.scale,
                sampler: normalize_sampler(&params.sampler),
                steps: params.clamped_steps(),
                n_samples: 1,
                uc_preset: params.uc_preset.unwrap_or(0),
                quality_toggle: params.quality_toggle,
                cfg_rescale: params.cfg_rescale.unwrap_or(0.0),
                variety_boost: params.variety_boost,
                sm: false,
                sm_dyn: false,
                dynamic_thresholding: false,
                controlnet_strength: 1,
                legacy: false,
                add_original_image: true,
                uncond_scale: 1,
                noise_schedule: "karras".to_string(),
                negative_prompt: negative.to_string(),
                seed: params.seed.value(),
                v4_prompt: V4Prompt {
                    caption: Caption::new(prompt),
                    use_coords: false,
                    use_order: true,
                },
                v4_negative_prompt: V4NegativePrompt {
                    caption: Caption::new(negative),
                    legacy_uc: false,
                },
            },
        }
    }
}

/// How a failed task is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Remote API throttled the request; expected and retried manually
    RateLimited,
    /// The entity or slot for a task no longer exists
    Lookup,
    /// Any other remote failure (network, validation, quota)
    Remote,
}

impl FailureKind {
    /// Whether the user should be alerted about this failure
    pub fn alerts_user(&self) -> bool {
        !matches!(self, FailureKind::RateLimited)
    }
}

/// Markers the remote API uses for throttling
const RATE_LIMIT_MARKERS: &[&str] = &["429", "concurrent", "locked"];

/// Classify a remote failure from its message text
pub fn classify(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
        FailureKind::RateLimited
    } else {
        FailureKind::Remote
    }
}

/// A classified generation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub kind: FailureKind,
    pub message: String,
}

impl GenerationError {
    /// Remote failure, classified from its message
    pub fn remote(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify(&message),
            message,
        }
    }

    /// Missing entity or slot
    pub fn lookup(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Lookup,
            message: message.into(),
        }
    }
}

/// Issues a single generation request
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError>;
}
