// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Replacement policies for masked spans

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::config::MaskingStrategy;

/// Produce the replacement for a matched value
pub fn apply_strategy(value: &str, strategy: &MaskingStrategy) -> String {
    match strategy {
        MaskingStrategy::Full { token } => token.clone(),
        MaskingStrategy::Partial {
            keep_prefix,
            keep_suffix,
            mask_char,
        } => partial_mask(value, *keep_prefix, *keep_suffix, *mask_char),
        MaskingStrategy::Hash { length } => hash_mask(value, *length),
        MaskingStrategy::Length { template } => length_mask(value, template),
        MaskingStrategy::Tokenize => tokenize_mask(),
        MaskingStrategy::Remove => String::new(),
    }
}

/// Partial masking - keep first/last characters, mask the middle
///
/// Works on chars so multi-byte values are never split. A value that is not
/// longer than the kept characters is masked completely.
fn partial_mask(value: &str, keep_prefix: usize, keep_suffix: usize, mask_char: char) -> String {
    let len = value.chars().count();
    if len <= keep_prefix.saturating_add(keep_suffix) {
        return std::iter::repeat(mask_char).take(len).collect();
    }

    let suffix_start = len.saturating_sub(keep_suffix);
    let mut out = String::with_capacity(value.len());
    for (idx, c) in value.chars().enumerate() {
        if idx < keep_prefix || idx >= suffix_start {
            out.push(c);
        } else {
            out.push(mask_char);
        }
    }
    out
}

/// Hash masking using SHA256
fn hash_mask(value: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let length = length.clamp(1, digest.len());
    format!("[HASH:{}]", &digest[..length])
}

fn length_mask(value: &str, template: &str) -> String {
    template.replace("{len}", &value.chars().count().to_string())
}

/// Tokenize using UUID v4
fn tokenize_mask() -> String {
    let token = Uuid::new_v4();
    format!("[TOKEN:{}]", &token.simple().to_string()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mask() {
        let result = apply_strategy("a@b.com", &MaskingStrategy::full("[EMAIL]"));
        assert_eq!(result, "[EMAIL]");
    }

    #[test]
    fn test_partial_mask_card() {
        let result = apply_strategy("1234567812345678", &MaskingStrategy::partial(4, 4));
        assert_eq!(result, "1234********5678");
    }

    #[test]
    fn test_partial_mask_short_value() {
        assert_eq!(partial_mask("abc", 2, 2, '*'), "***");
        assert_eq!(partial_mask("abcd", 2, 2, '*'), "****");
        assert_eq!(partial_mask("", 2, 2, '*'), "");
    }

    #[test]
    fn test_partial_mask_huge_keep_counts() {
        let card = "1234567812345678";
        assert_eq!(partial_mask(card, usize::MAX, 4, '*'), "*".repeat(16));
        assert_eq!(partial_mask(card, 4, usize::MAX, '*'), "*".repeat(16));
        assert_eq!(partial_mask(card, usize::MAX, usize::MAX, '*'), "*".repeat(16));
        assert_eq!(partial_mask(card, 0, 20, '*'), "*".repeat(16));
    }

    #[test]
    fn test_partial_mask_multibyte() {
        assert_eq!(partial_mask("żółwik", 1, 1, '#'), "ż####k");
    }

    #[test]
    fn test_hash_mask() {
        let result = hash_mask("sensitive", 8);
        assert!(result.starts_with("[HASH:"));
        assert!(result.ends_with(']'));
        assert_eq!(result.len(), 15); // [HASH:xxxxxxxx]
        assert_eq!(result, hash_mask("sensitive", 8));
        assert_ne!(result, hash_mask("other", 8));
    }

    #[test]
    fn test_hash_mask_clamps_length() {
        assert_eq!(hash_mask("x", 0).len(), "[HASH:]".len() + 1);
        assert_eq!(hash_mask("x", 500).len(), "[HASH:]".len() + 64);
    }

    #[test]
    fn test_length_mask() {
        assert_eq!(
            apply_strategy("DEADBEEF", &MaskingStrategy::length("LENGTH:{len}")),
            "LENGTH:8"
        );
        assert_eq!(length_mask("abcdef", "<TOO BIG:{len}>"), "<TOO BIG:6>");
    }

    #[test]
    fn test_tokenize_mask() {
        let result = tokenize_mask();
        assert!(result.starts_with("[TOKEN:"));
        assert!(result.ends_with(']'));
        assert_eq!(result.len(), 16);
    }

    #[test]
    fn test_remove() {
        assert_eq!(apply_strategy("secret", &MaskingStrategy::Remove), "");
    }
}
