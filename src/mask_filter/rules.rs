// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Rule set: ordered rules, overlap resolution and span replacement

use log::{debug, warn};
use regex::{Regex, RegexBuilder, RegexSet};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::config::{InvalidPatternPolicy, MaskingConfig, RuleSpec};
use super::error::ConfigError;
use super::patterns::{dedup_overlaps, PatternRule, Span};
use super::strategy::apply_strategy;

/// A span of the original text that was replaced, and the rule that won it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedSpan {
    pub rule_id: Arc<str>,
    pub start: usize,
    pub end: usize,
}

/// Outcome of masking one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskResult<'a> {
    pub original_len: usize,
    pub text: Cow<'a, str>,
    /// Replaced spans in ascending offset order
    pub spans: Vec<MaskedSpan>,
    /// Rules that masked at least one span, in evaluation order
    pub matched_rule_ids: Vec<Arc<str>>,
}

impl<'a> MaskResult<'a> {
    fn unchanged(text: &'a str) -> Self {
        Self {
            original_len: text.len(),
            text: Cow::Borrowed(text),
            spans: Vec::new(),
            matched_rule_ids: Vec::new(),
        }
    }

    pub fn is_masked(&self) -> bool {
        !self.spans.is_empty()
    }

    pub fn into_text(self) -> Cow<'a, str> {
        self.text
    }
}

/// Ordered, immutable collection of compiled rules
///
/// Rules are kept in evaluation order: descending priority, then ascending id.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
    /// Prefilter over every matcher of every rule, in rule order
    regex_set: Option<RegexSet>,
    allowlist: Vec<Regex>,
    rejected: Vec<ConfigError>,
}

impl RuleSet {
    /// Compile rules, skipping or failing on bad entries according to `policy`
    pub fn compile(
        specs: &[RuleSpec],
        allowlist: &[String],
        policy: InvalidPatternPolicy,
    ) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for spec in specs {
            if !spec.enabled {
                debug!(
                    "Masking rule '{}' ({}) is disabled",
                    spec.id,
                    spec.selector.describe()
                );
                continue;
            }
            if !seen.insert(spec.id.as_str()) {
                reject(policy, ConfigError::DuplicateRule(spec.id.clone()), &mut rejected)?;
                continue;
            }
            match PatternRule::compile(spec) {
                Ok(rule) => rules.push(rule),
                Err(e) => reject(policy, e.into(), &mut rejected)?,
            }
        }

        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let mut allow = Vec::with_capacity(allowlist.len());
        for pattern in allowlist {
            match RegexBuilder::new(pattern).build() {
                Ok(regex) => allow.push(regex),
                Err(e) => reject(
                    policy,
                    ConfigError::InvalidAllowlist {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    },
                    &mut rejected,
                )?,
            }
        }

        let set_patterns: Vec<&str> = rules
            .iter()
            .flat_map(|r| r.matchers.iter().map(|m| m.set_pattern.as_str()))
            .collect();
        let regex_set = if set_patterns.is_empty() {
            Some(RegexSet::empty())
        } else {
            match RegexSet::new(&set_patterns) {
                Ok(set) => Some(set),
                Err(e) => {
                    // Still correct without the prefilter, every rule just gets scanned
                    warn!("Masking prefilter disabled: {}", e);
                    None
                }
            }
        };

        debug!(
            "Compiled {} masking rules ({} patterns, {} rejected)",
            rules.len(),
            set_patterns.len(),
            rejected.len()
        );

        Ok(Self {
            rules,
            regex_set,
            allowlist: allow,
            rejected,
        })
    }

    /// Compile the effective rules of a configuration
    pub fn from_config(config: &MaskingConfig) -> Result<Self, ConfigError> {
        Self::compile(
            &config.effective_rules(),
            &config.allowlist,
            config.on_invalid_pattern,
        )
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules excluded at construction time under `InvalidPatternPolicy::Skip`
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    pub fn get(&self, id: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| &*r.id == id)
    }

    /// Whether a matched value is exempt from masking
    pub fn is_allowlisted(&self, value: &str) -> bool {
        self.allowlist.iter().any(|pattern| pattern.is_match(value))
    }

    /// Mask `text` with every rule
    ///
    /// Each rule scans the original text once. Overlapping spans resolve by
    /// priority, then earliest start, then longest span, then rule id.
    /// Replaced text is never scanned again.
    pub fn apply<'a>(&self, text: &'a str) -> MaskResult<'a> {
        if text.is_empty() || self.rules.is_empty() {
            return MaskResult::unchanged(text);
        }

        let hits = self.regex_set.as_ref().map(|set| set.matches(text));
        if let Some(hits) = &hits {
            if !hits.matched_any() {
                return MaskResult::unchanged(text);
            }
        }

        // (rule index, span) for every candidate, rule index doubles as id order
        let mut candidates: Vec<(usize, Span)> = Vec::new();
        let mut set_offset = 0;
        for (rule_idx, rule) in self.rules.iter().enumerate() {
            let mut spans = Vec::new();
            for (matcher_idx, matcher) in rule.matchers.iter().enumerate() {
                let hit = hits
                    .as_ref()
                    .map_or(true, |h| h.matched(set_offset + matcher_idx));
                if hit {
                    matcher.collect_spans(text, &mut spans);
                }
            }
            set_offset += rule.matchers.len();

            for span in dedup_overlaps(spans) {
                if !self.is_allowlisted(&text[span.start..span.end]) {
                    candidates.push((rule_idx, span));
                }
            }
        }

        if candidates.is_empty() {
            return MaskResult::unchanged(text);
        }

        candidates.sort_by(|(ra, a), (rb, b)| {
            self.rules[*rb]
                .priority
                .cmp(&self.rules[*ra].priority)
                .then(a.start.cmp(&b.start))
                .then(b.len().cmp(&a.len()))
                .then(ra.cmp(rb))
        });

        let mut accepted: BTreeMap<usize, (Span, usize)> = BTreeMap::new();
        for (rule_idx, span) in candidates {
            let blocked = accepted
                .range(..span.end)
                .next_back()
                .is_some_and(|(_, (prev, _))| prev.overlaps(&span));
            if !blocked {
                accepted.insert(span.start, (span, rule_idx));
            }
        }

        // Assemble left to right; spans are offsets into the original text
        let mut out = String::with_capacity(text.len());
        let mut spans = Vec::with_capacity(accepted.len());
        let mut used_rules: Vec<usize> = Vec::new();
        let mut cursor = 0;
        for (span, rule_idx) in accepted.into_values() {
            let rule = &self.rules[rule_idx];
            out.push_str(&text[cursor..span.start]);
            out.push_str(&apply_strategy(&text[span.start..span.end], &rule.strategy));
            cursor = span.end;

            spans.push(MaskedSpan {
                rule_id: rule.id.clone(),
                start: span.start,
                end: span.end,
            });
            used_rules.push(rule_idx);
        }
        out.push_str(&text[cursor..]);

        used_rules.sort_unstable();
        used_rules.dedup();

        MaskResult {
            original_len: text.len(),
            text: Cow::Owned(out),
            spans,
            matched_rule_ids: used_rules
                .into_iter()
                .map(|idx| self.rules[idx].id.clone())
                .collect(),
        }
    }
}

fn reject(
    policy: InvalidPatternPolicy,
    err: ConfigError,
    rejected: &mut Vec<ConfigError>,
) -> Result<(), ConfigError> {
    match policy {
        InvalidPatternPolicy::Fail => Err(err),
        InvalidPatternPolicy::Skip => {
            warn!("Skipping masking rule: {}", err);
            rejected.push(err);
            Ok(())
        }
    }
}
