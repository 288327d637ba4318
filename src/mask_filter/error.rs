// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Error types for configuration and masking

use thiserror::Error;

/// A rule whose matcher could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern for rule '{rule_id}' ({pattern}): {reason}")]
pub struct InvalidPatternError {
    pub rule_id: String,
    pub pattern: String,
    pub reason: String,
}

impl InvalidPatternError {
    pub fn new(rule_id: &str, pattern: &str, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading configuration or building a rule set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    InvalidPattern(#[from] InvalidPatternError),

    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("invalid allowlist pattern '{pattern}': {reason}")]
    InvalidAllowlist { pattern: String, reason: String },

    #[error("failed to parse masking configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read masking configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while masking a single payload.
///
/// These never cross the adapter boundary; the adapter turns them into a
/// pass-through or a dropped event depending on its fallback mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MaskingRuntimeError {
    #[error("payload of {len} bytes exceeds the masking limit of {limit} bytes")]
    InputTooLarge { len: usize, limit: usize },

    #[error("masking panicked: {0}")]
    Panicked(String),
}
