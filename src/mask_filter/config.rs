// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Configuration types for the masking filter

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ConfigError;

/// Replacement policies applied to a matched span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaskingStrategy {
    /// Replace the whole match with a fixed token
    Full {
        #[serde(default = "default_token")]
        token: String,
    },
    /// Keep a prefix and suffix, mask everything in between
    Partial {
        #[serde(default)]
        keep_prefix: usize,
        #[serde(default)]
        keep_suffix: usize,
        #[serde(default = "default_mask_char")]
        mask_char: char,
    },
    /// Replace with a short SHA-256 digest (e.g. [HASH:abc12345])
    Hash {
        #[serde(default = "default_hash_length")]
        length: usize,
    },
    /// Replace with the match length (e.g. LENGTH:8)
    Length {
        #[serde(default = "default_length_template")]
        template: String,
    },
    /// Replace with a random token (e.g. [TOKEN:xyz78901])
    Tokenize,
    /// Remove entirely
    Remove,
}

impl Default for MaskingStrategy {
    fn default() -> Self {
        MaskingStrategy::Full {
            token: default_token(),
        }
    }
}

impl MaskingStrategy {
    pub fn full(token: impl Into<String>) -> Self {
        MaskingStrategy::Full {
            token: token.into(),
        }
    }

    pub fn partial(keep_prefix: usize, keep_suffix: usize) -> Self {
        MaskingStrategy::Partial {
            keep_prefix,
            keep_suffix,
            mask_char: default_mask_char(),
        }
    }

    pub fn hash() -> Self {
        MaskingStrategy::Hash {
            length: default_hash_length(),
        }
    }

    pub fn length(template: impl Into<String>) -> Self {
        MaskingStrategy::Length {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskingStrategy::Full { .. } => "full",
            MaskingStrategy::Partial { .. } => "partial",
            MaskingStrategy::Hash { .. } => "hash",
            MaskingStrategy::Length { .. } => "length",
            MaskingStrategy::Tokenize => "tokenize",
            MaskingStrategy::Remove => "remove",
        }
    }
}

fn default_token() -> String {
    "***".to_string()
}

fn default_mask_char() -> char {
    '*'
}

fn default_hash_length() -> usize {
    8
}

fn default_length_template() -> String {
    "LENGTH:{len}".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Text syntaxes a field selector understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    /// `name=value` pairs in URIs and form bodies
    Query,
    /// `"name": value` members in JSON text
    Json,
}

fn default_formats() -> Vec<FieldFormat> {
    vec![FieldFormat::Query, FieldFormat::Json]
}

/// What a rule looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Regular expression; `group` restricts the masked span to one capture group
    Regex {
        pattern: String,
        #[serde(default)]
        group: Option<usize>,
    },
    /// Named field in query strings, form bodies, JSON text or structured arguments
    Field {
        name: String,
        #[serde(default = "default_formats")]
        formats: Vec<FieldFormat>,
    },
}

impl Selector {
    /// Source text shown in diagnostics
    pub fn describe(&self) -> &str {
        match self {
            Selector::Regex { pattern, .. } => pattern,
            Selector::Field { name, .. } => name,
        }
    }
}

/// A single rule as supplied by the host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub selector: Selector,
    #[serde(default)]
    pub strategy: MaskingStrategy,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl RuleSpec {
    pub fn regex(id: impl Into<String>, pattern: impl Into<String>, strategy: MaskingStrategy) -> Self {
        Self::new(
            id,
            Selector::Regex {
                pattern: pattern.into(),
                group: None,
            },
            strategy,
        )
    }

    pub fn field(id: impl Into<String>, name: impl Into<String>, strategy: MaskingStrategy) -> Self {
        Self::new(
            id,
            Selector::Field {
                name: name.into(),
                formats: default_formats(),
            },
            strategy,
        )
    }

    fn new(id: impl Into<String>, selector: Selector, strategy: MaskingStrategy) -> Self {
        Self {
            id: id.into(),
            selector,
            strategy,
            priority: 0,
            case_insensitive: false,
            enabled: true,
            description: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mask only the given capture group. No effect on field selectors.
    pub fn with_group(mut self, group: usize) -> Self {
        if let Selector::Regex { group: g, .. } = &mut self.selector {
            *g = Some(group);
        }
        self
    }

    /// Restrict a field selector to the given formats. No effect on regex selectors.
    pub fn with_formats(mut self, formats: &[FieldFormat]) -> Self {
        if let Selector::Field { formats: f, .. } = &mut self.selector {
            *f = formats.to_vec();
        }
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What the adapter does when masking a payload fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Emit the original, unmasked payload. Logging stays available but the
    /// event may leak sensitive data.
    #[default]
    PassThrough,
    /// Suppress the event entirely.
    Drop,
}

/// What rule set construction does with a rule that fails to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPatternPolicy {
    /// Exclude the rule, warn, and keep the rest
    #[default]
    Skip,
    /// Abort construction with the first error
    Fail,
}

/// Configuration for the masking filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Global switch. When false, events pass through untouched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // Rules
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Prepend the built-in rules (sensitive data tags, oversized blobs, credential fields)
    #[serde(default)]
    pub builtin_rules: bool,
    /// Matched values that also match one of these patterns are left alone
    #[serde(default)]
    pub allowlist: Vec<String>,

    // Behavior
    #[serde(default)]
    pub fallback: FallbackMode,
    #[serde(default)]
    pub on_invalid_pattern: InvalidPatternPolicy,
    /// Longest text payload, in bytes, the engine will scan
    #[serde(default)]
    pub max_input_len: Option<usize>,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
            builtin_rules: false,
            allowlist: Vec::new(),
            fallback: FallbackMode::PassThrough,
            on_invalid_pattern: InvalidPatternPolicy::Skip,
            max_input_len: None,
        }
    }
}

impl MaskingConfig {
    /// Parse configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn with_rule(mut self, rule: RuleSpec) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in configuration order, built-ins first when enabled
    pub fn effective_rules(&self) -> Vec<RuleSpec> {
        let mut rules = if self.builtin_rules {
            super::patterns::presets::default_rules()
        } else {
            Vec::new()
        };
        rules.extend(self.rules.iter().cloned());
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MaskingConfig::default();
        assert!(config.enabled);
        assert!(config.rules.is_empty());
        assert_eq!(config.fallback, FallbackMode::PassThrough);
        assert_eq!(config.on_invalid_pattern, InvalidPatternPolicy::Skip);
    }

    #[test]
    fn test_strategy_as_str() {
        assert_eq!(MaskingStrategy::default().as_str(), "full");
        assert_eq!(MaskingStrategy::partial(2, 2).as_str(), "partial");
        assert_eq!(MaskingStrategy::Remove.as_str(), "remove");
    }

    #[test]
    fn test_parse_json_config() {
        let json = r#"{
            "fallback": "drop",
            "rules": [
                {
                    "id": "card",
                    "selector": {"regex": {"pattern": "\\d{16}"}},
                    "strategy": {"type": "partial", "keep_prefix": 4, "keep_suffix": 4},
                    "priority": 5
                },
                {
                    "id": "password",
                    "selector": {"field": {"name": "password"}}
                }
            ]
        }"#;

        let config = MaskingConfig::from_json_str(json).unwrap();
        assert_eq!(config.fallback, FallbackMode::Drop);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].priority, 5);
        assert_eq!(config.rules[0].strategy, MaskingStrategy::partial(4, 4));
        assert_eq!(config.rules[1].strategy, MaskingStrategy::full("***"));
        assert!(config.rules[1].enabled);
        match &config.rules[1].selector {
            Selector::Field { name, formats } => {
                assert_eq!(name, "password");
                assert_eq!(formats, &vec![FieldFormat::Query, FieldFormat::Json]);
            }
            other => panic!("unexpected selector {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        let json = r#"{"rules": [{"id": "x", "selector": {"regex": {"pattern": "a"}},
                       "strategy": {"type": "scramble"}}]}"#;
        assert!(matches!(
            MaskingConfig::from_json_str(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_effective_rules_prepends_builtins() {
        let config = MaskingConfig {
            builtin_rules: true,
            ..Default::default()
        }
        .with_rule(RuleSpec::regex("mine", "x", MaskingStrategy::Remove));

        let rules = config.effective_rules();
        assert!(rules.len() > 1);
        assert_eq!(rules.last().unwrap().id, "mine");
    }
}
