//! Prompt chains and the prompt compiler
//!
//! A chain is a base segment, an ordered list of togglable modules and a
//! negative prompt. Compiling a chain for a subject yields one prompt string:
//!
//! `base, <active pre modules>, subject, <active post modules>`

mod compiler;
mod variables;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::generation::GenerationParameters;

pub use compiler::{cleanup, compile, compile_with_overrides, compile_with_variables};
pub use variables::{extract_variables, substitute};

/// Where a module is emitted relative to the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Pre,
    #[default]
    Post,
}

/// A named, independently togglable prompt fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptModule {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Missing or null means post
    #[serde(default, deserialize_with = "deserialize_position")]
    pub position: Position,
}

fn default_active() -> bool {
    true
}

fn deserialize_position<'de, D>(deserializer: D) -> Result<Position, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Position>::deserialize(deserializer)?.unwrap_or_default())
}

impl PromptModule {
    pub fn new(name: &str, content: &str, position: Position) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            content: content.to_string(),
            is_active: true,
            position,
        }
    }
}

/// Per-session active flags keyed by module id.
///
/// Overrides never touch the persisted `is_active` values until the chain is
/// explicitly saved with [`PromptChain::commit_overrides`].
pub type ModuleOverrides = HashMap<String, bool>;

/// A compilable prompt definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptChain {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_prompt: String,
    #[serde(default)]
    pub modules: Vec<PromptModule>,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub parameters: GenerationParameters,
    /// Default subject used when none is supplied at compile time
    #[serde(default)]
    pub subject: String,
}

impl PromptChain {
    /// Active state of a module with session overrides applied
    pub fn is_module_active(&self, module: &PromptModule, overrides: &ModuleOverrides) -> bool {
        overrides
            .get(&module.id)
            .copied()
            .unwrap_or(module.is_active)
    }

    /// Modules with their session active state resolved, in original order
    pub fn effective_modules(&self, overrides: &ModuleOverrides) -> Vec<PromptModule> {
        self.modules
            .iter()
            .map(|m| PromptModule {
                is_active: self.is_module_active(m, overrides),
                ..m.clone()
            })
            .collect()
    }

    /// Persist session overrides into the chain (the "save" action)
    pub fn commit_overrides(&mut self, overrides: &ModuleOverrides) {
        for module in &mut self.modules {
            if let Some(&active) = overrides.get(&module.id) {
                module.is_active = active;
            }
        }
    }
}
