// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Pattern rules: compiled matchers with their masking strategy
// All matching goes through the `regex` crate, which runs in linear time

use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use super::config::{FieldFormat, MaskingStrategy, RuleSpec, Selector};
use super::error::InvalidPatternError;

/// A contiguous matched region, as byte offsets into the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One compiled regex and the capture group it masks
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    pub regex: Regex,
    /// Pattern as fed to the rule set's `RegexSet` (case flag inlined)
    pub set_pattern: String,
    pub group: usize,
}

impl CompiledMatcher {
    fn compile(
        rule_id: &str,
        pattern: &str,
        group: usize,
        case_insensitive: bool,
    ) -> Result<Self, InvalidPatternError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| InvalidPatternError::new(rule_id, pattern, e.to_string()))?;

        if group >= regex.captures_len() {
            return Err(InvalidPatternError::new(
                rule_id,
                pattern,
                format!(
                    "capture group {} does not exist (pattern has {})",
                    group,
                    regex.captures_len() - 1
                ),
            ));
        }

        let set_pattern = if case_insensitive {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };

        Ok(Self {
            regex,
            set_pattern,
            group,
        })
    }

    /// Push every non-empty match (or target group) of this matcher
    pub fn collect_spans(&self, text: &str, spans: &mut Vec<Span>) {
        if self.group == 0 {
            spans.extend(
                self.regex
                    .find_iter(text)
                    .map(|m| Span::new(m.start(), m.end()))
                    .filter(|s| !s.is_empty()),
            );
            return;
        }

        for caps in self.regex.captures_iter(text) {
            if let Some(m) = caps.get(self.group) {
                let span = Span::new(m.start(), m.end());
                if !span.is_empty() {
                    spans.push(span);
                }
            }
        }
    }
}

/// A single compiled masking rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: Arc<str>,
    pub priority: i32,
    pub strategy: MaskingStrategy,
    pub matchers: Vec<CompiledMatcher>,
    field: Option<String>,
    case_insensitive: bool,
    description: Option<String>,
}

impl PatternRule {
    /// Compile a [`RuleSpec`]. Fails fast on malformed patterns.
    pub fn compile(spec: &RuleSpec) -> Result<Self, InvalidPatternError> {
        let (sources, field) = match &spec.selector {
            Selector::Regex { pattern, group } => {
                (vec![(pattern.clone(), group.unwrap_or(0))], None)
            }
            Selector::Field { name, formats } => {
                if name.is_empty() {
                    return Err(InvalidPatternError::new(
                        &spec.id,
                        name,
                        "field name must not be empty",
                    ));
                }
                (field_patterns(name, formats), Some(name.clone()))
            }
        };

        let matchers = sources
            .iter()
            .map(|(pattern, group)| {
                CompiledMatcher::compile(&spec.id, pattern, *group, spec.case_insensitive)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: Arc::from(spec.id.as_str()),
            priority: spec.priority,
            strategy: spec.strategy.clone(),
            matchers,
            field,
            case_insensitive: spec.case_insensitive,
            description: spec.description.clone(),
        })
    }

    /// All non-overlapping, non-empty spans of this rule in `text`
    pub fn matches(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        for matcher in &self.matchers {
            matcher.collect_spans(text, &mut spans);
        }
        dedup_overlaps(spans)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this rule selects the value stored under `key` in structured input
    pub fn selects_field(&self, key: &str) -> bool {
        match &self.field {
            Some(name) if self.case_insensitive => name.eq_ignore_ascii_case(key),
            Some(name) => name == key,
            None => false,
        }
    }
}

/// Keep the earliest (then longest) span of every overlapping group
pub(crate) fn dedup_overlaps(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.len().cmp(&a.len())));
    let mut kept: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match kept.last() {
            Some(last) if last.overlaps(&span) => {}
            _ => kept.push(span),
        }
    }
    kept
}

/// Regexes (and the group holding the value) for a named field
fn field_patterns(name: &str, formats: &[FieldFormat]) -> Vec<(String, usize)> {
    let key = regex::escape(name);
    let mut patterns = Vec::new();

    for format in formats {
        match format {
            FieldFormat::Query => {
                // A field starting with a word char must not be the tail of a longer name
                let boundary = if name.starts_with(|c: char| c.is_alphanumeric() || c == '_') {
                    r"\b"
                } else {
                    ""
                };
                patterns.push((format!(r"{}{}=([^&\s]*)", boundary, key), 1));
            }
            FieldFormat::Json => {
                // string
                patterns.push((format!(r#""{}"\s*:\s*"((?:\\.|[^"\\])*)""#, key), 1));
                // number or bool
                patterns.push((
                    format!(
                        r#""{}"\s*:\s*([+-]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?|true|false)"#,
                        key
                    ),
                    1,
                ));
                // array
                patterns.push((format!(r#""{}"\s*:\s*\[([^\[\]]*)\]"#, key), 1));
                // object, one level of nesting
                patterns.push((
                    format!(
                        r#""{}"\s*:\s*\{{([^{{}}]*(?:\{{[^{{}}]*\}}[^{{}}]*)*)\}}"#,
                        key
                    ),
                    1,
                ));
            }
        }
    }

    patterns
}

/// Built-in rules for common sensitive log content
pub mod presets {
    use once_cell::sync::Lazy;

    use super::super::config::{MaskingStrategy, RuleSpec};

    /// Shortest run of hex/base64 characters treated as an inline binary blob
    pub const MAX_INLINE_BLOB: usize = 1000;

    /// Pattern definitions (id, pattern, capture group, description)
    type PatternDef = (&'static str, String, usize, &'static str);

    // <SensitiveData> payloads, masked down to their length
    const SENSITIVE_TAG_PATTERNS: [(&str, &str, usize, &str); 2] = [
        (
            "sensitive-data-tag",
            r"(<SensitiveData>)([0-9a-zA-Z+/]*={0,3})(</{1,2}SensitiveData>)",
            2,
            "Hex or base64 content of a <SensitiveData> tag",
        ),
        (
            "sensitive-data-hex-tag",
            r"(3c53656e736974697665446174613e)([0-9a-f]*?)(3c2f53656e736974697665446174613e)",
            2,
            "Hex-encoded <SensitiveData> tag",
        ),
    ];

    // Large inline blobs (dumped files, images, keys)
    static BLOB_PATTERNS: Lazy<Vec<PatternDef>> = Lazy::new(|| {
        vec![
            (
                "oversized-hex",
                format!("[0-9a-fA-F]{{{},}}", MAX_INLINE_BLOB),
                0,
                "Hex blob",
            ),
            (
                "oversized-base64",
                format!("[0-9a-zA-Z+/]{{{},}}={{0,3}}", MAX_INLINE_BLOB),
                0,
                "Base64 blob",
            ),
        ]
    });

    /// Credential-like field names masked in query strings, form bodies and JSON
    pub const SENSITIVE_FIELDS: [&str; 7] = [
        "password",
        "token",
        "access_token",
        "client_secret",
        "authorization",
        "api_key",
        "secret",
    ];

    /// The built-in rule list, highest priority first
    pub fn default_rules() -> Vec<RuleSpec> {
        let mut rules = Vec::new();

        for (id, pattern, group, description) in SENSITIVE_TAG_PATTERNS {
            let mut rule = RuleSpec::regex(id, pattern, MaskingStrategy::length("LENGTH:{len}"))
                .with_group(group)
                .with_priority(30)
                .with_description(description);
            if id == "sensitive-data-hex-tag" {
                rule = rule.case_insensitive();
            }
            rules.push(rule);
        }

        for (id, pattern, _, description) in BLOB_PATTERNS.iter() {
            rules.push(
                RuleSpec::regex(*id, pattern.clone(), MaskingStrategy::length("<TOO BIG:{len}>"))
                    .with_priority(20)
                    .with_description(*description),
            );
        }

        for name in SENSITIVE_FIELDS {
            rules.push(
                RuleSpec::field(
                    format!("sensitive-field-{}", name),
                    name,
                    MaskingStrategy::full("<MASKED>"),
                )
                .with_priority(10)
                .with_description("Credential field"),
            );
        }

        rules
    }
}
