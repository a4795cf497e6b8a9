//! Prompt compilation and cleanup

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{substitute, ModuleOverrides, Position, PromptChain, PromptModule};

/// A comma followed by one or more whitespace-separated commas
static COMMA_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*,)+").unwrap());

static LEADING_COMMA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*,\s*").unwrap());

static TRAILING_COMMA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*$").unwrap());

/// Compile a chain for a subject using the persisted module states
pub fn compile(chain: &PromptChain, subject: &str) -> String {
    cleanup(&assemble(chain, &chain.modules, subject))
}

/// Compile a chain for a subject with per-session module toggles applied
pub fn compile_with_overrides(
    chain: &PromptChain,
    subject: &str,
    overrides: &ModuleOverrides,
) -> String {
    let modules = chain.effective_modules(overrides);
    cleanup(&assemble(chain, &modules, subject))
}

/// Compile a chain and fill `{name}` placeholders from `variables`.
///
/// Unknown placeholders become empty and the resulting gaps are cleaned up.
/// With no variables at all nothing is substituted, so weight-1 tags such as
/// `{masterpiece}` survive.
pub fn compile_with_variables(
    chain: &PromptChain,
    subject: &str,
    overrides: &ModuleOverrides,
    variables: &HashMap<String, String>,
) -> String {
    if variables.is_empty() {
        return compile_with_overrides(chain, subject, overrides);
    }
    let modules = chain.effective_modules(overrides);
    let raw = assemble(chain, &modules, subject);
    cleanup(&substitute(&raw, variables))
}

/// Join the ordered segments: base, pre modules, subject, post modules
fn assemble(chain: &PromptChain, modules: &[PromptModule], subject: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    if !chain.base_prompt.trim().is_empty() {
        segments.push(chain.base_prompt.trim());
    }

    segments.extend(
        modules
            .iter()
            .filter(|m| m.is_active && m.position == Position::Pre)
            .map(|m| m.content.trim()),
    );

    if !subject.trim().is_empty() {
        segments.push(subject.trim());
    }

    segments.extend(
        modules
            .iter()
            .filter(|m| m.is_active && m.position == Position::Post)
            .map(|m| m.content.trim()),
    );

    segments.join(", ")
}

/// Normalize comma runs and strip leading/trailing separators.
///
/// Idempotent: `cleanup(cleanup(s)) == cleanup(s)`.
pub fn cleanup(prompt: &str) -> String {
    let collapsed = COMMA_RUN_REGEX.replace_all(prompt, ",");
    let collapsed = LEADING_COMMA_REGEX.replace(&collapsed, "");
    let collapsed = TRAILING_COMMA_REGEX.replace(&collapsed, "");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(content: &str, position: Position, active: bool) -> PromptModule {
        let mut m = PromptModule::new(content, content, position);
        m.is_active = active;
        m
    }

    fn chain(post_active: bool) -> PromptChain {
        PromptChain {
            base_prompt: "A".to_string(),
            modules: vec![
                module("D", Position::Post, post_active),
                module("B", Position::Pre, true),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_ordering() {
        assert_eq!(compile(&chain(true), "C"), "A, B, C, D");
    }

    #[test]
    fn test_compile_skips_inactive() {
        assert_eq!(compile(&chain(false), "C"), "A, B, C");
    }

    #[test]
    fn test_compile_preserves_module_order() {
        let chain = PromptChain {
            modules: vec![
                module("p2", Position::Post, true),
                module("x1", Position::Pre, true),
                module("p1", Position::Post, true),
                module("x2", Position::Pre, true),
            ],
            ..Default::default()
        };
        assert_eq!(compile(&chain, "s"), "x1, x2, s, p2, p1");
    }

    #[test]
    fn test_compile_empty_segments() {
        let chain = PromptChain {
            base_prompt: "".to_string(),
            modules: vec![
                module("", Position::Pre, true),
                module("tail", Position::Post, true),
            ],
            ..Default::default()
        };
        assert_eq!(compile(&chain, ""), "tail");
        assert_eq!(compile(&PromptChain::default(), ""), "");
    }

    #[test]
    fn test_cleanup_idempotent() {
        assert_eq!(cleanup("A, , B,"), "A, B");
        assert_eq!(cleanup("A, B"), "A, B");
        assert_eq!(cleanup(&cleanup("A, , B,")), "A, B");
        assert_eq!(cleanup(", A,,, B, , "), "A, B");
    }

    #[test]
    fn test_compile_with_overrides() {
        let chain = chain(true);
        let post_id = chain.modules[0].id.clone();

        let mut overrides = ModuleOverrides::new();
        overrides.insert(post_id, false);

        assert_eq!(compile_with_overrides(&chain, "C", &overrides), "A, B, C");
        assert_eq!(compile(&chain, "C"), "A, B, C, D");
    }

    #[test]
    fn test_compile_with_variables() {
        let chain = PromptChain {
            base_prompt: "{style}".to_string(),
            modules: vec![module("{missing}", Position::Post, true)],
            ..Default::default()
        };
        let mut vars = HashMap::new();
        vars.insert("style".to_string(), "watercolor".to_string());

        let prompt = compile_with_variables(&chain, "1girl", &ModuleOverrides::new(), &vars);
        assert_eq!(prompt, "watercolor, 1girl");
    }

    #[test]
    fn test_compile_without_variables_keeps_weighted_tags() {
        let chain = PromptChain {
            base_prompt: "{masterpiece}, [lowres]".to_string(),
            ..Default::default()
        };
        let prompt =
            compile_with_variables(&chain, "1girl", &ModuleOverrides::new(), &HashMap::new());
        assert_eq!(prompt, "{masterpiece}, [lowres], 1girl");
        assert_eq!(prompt, compile(&chain, "1girl"));
    }
}
