//! Benchmark configuration
//!
//! A benchmark is an ordered list of slots, each a prompt scenario. Every
//! entity gets one generated image per slot; the slot's position is the
//! index into the entity's result list.

use serde::{Deserialize, Serialize};

use crate::generation::{GenerationParameters, Seed};
use crate::prompt::cleanup;

/// One benchmark scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub label: String,
    pub prompt: String,
}

impl Slot {
    pub fn new(label: &str, prompt: &str) -> Self {
        Self {
            label: label.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

/// Slots plus the parameters shared by every benchmark request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BenchmarkConfig {
    pub slots: Vec<Slot>,
    pub negative_prompt: String,
    pub seed: Seed,
    pub steps: u32,
    pub scale: f64,
    /// Overrides the queue's inter-request delay
    pub interval_ms: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            negative_prompt: String::new(),
            seed: Seed::Random,
            steps: 28,
            scale: 5.0,
            interval_ms: None,
        }
    }
}

impl BenchmarkConfig {
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Position of the slot with `label`
    pub fn slot_index(&self, label: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.label == label)
    }

    /// Request parameters: `base` with this config's steps and scale, and a
    /// concrete seed (`fallback_seed` when the configured seed is random)
    pub fn parameters(
        &self,
        base: &GenerationParameters,
        fallback_seed: u64,
    ) -> GenerationParameters {
        GenerationParameters {
            steps: self.steps,
            scale: self.scale,
            seed: Seed::Fixed(self.seed.or_fallback(fallback_seed)),
            ..base.clone()
        }
    }
}

/// Prompt for one entity in one slot: `<tag>:<name>, <slot prompt>`
pub fn slot_prompt(tag: &str, entity_name: &str, slot: &Slot) -> String {
    let subject = if tag.is_empty() {
        entity_name.to_string()
    } else {
        format!("{}:{}", tag, entity_name)
    };
    cleanup(&format!("{}, {}", subject, slot.prompt))
}
