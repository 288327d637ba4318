// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Masking engine: applies a rule set to plain text or structured arguments

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use super::config::MaskingConfig;
use super::error::{ConfigError, MaskingRuntimeError};
use super::patterns::PatternRule;
use super::rules::{MaskResult, MaskedSpan, RuleSet};
use super::strategy::apply_strategy;

/// Input to the engine
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Structured(&'a Value),
}

/// Output of the engine, mirroring the input kind
#[derive(Debug, Clone, PartialEq)]
pub enum MaskedPayload<'a> {
    Text(MaskResult<'a>),
    Structured(StructuredMaskResult),
}

/// Outcome of masking a structured value
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredMaskResult {
    pub value: Value,
    /// Rules that masked at least one leaf, in evaluation order
    pub matched_rule_ids: Vec<Arc<str>>,
    /// Number of leaves whose content changed
    pub masked_leaves: usize,
}

impl StructuredMaskResult {
    pub fn is_masked(&self) -> bool {
        self.masked_leaves > 0
    }
}

/// The operation a host integration needs from a masker
pub trait Redactor: Send + Sync {
    fn mask_text<'a>(&self, text: &'a str) -> Result<MaskResult<'a>, MaskingRuntimeError>;

    fn mask_value(&self, value: &Value) -> Result<StructuredMaskResult, MaskingRuntimeError>;
}

/// Applies a shared, read-only rule set
#[derive(Debug, Clone)]
pub struct MaskingEngine {
    rules: Arc<RuleSet>,
    max_input_len: Option<usize>,
}

impl MaskingEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            max_input_len: None,
        }
    }

    /// Compile the configured rules into a new engine
    pub fn from_config(config: &MaskingConfig) -> Result<Self, ConfigError> {
        let rules = RuleSet::from_config(config)?;
        Ok(Self {
            rules: Arc::new(rules),
            max_input_len: config.max_input_len,
        })
    }

    /// Refuse text payloads longer than `limit` bytes
    pub fn with_max_input_len(mut self, limit: usize) -> Self {
        self.max_input_len = Some(limit);
        self
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// Mask a payload. Keys of structured input are never touched.
    pub fn mask<'a>(&self, payload: Payload<'a>) -> Result<MaskedPayload<'a>, MaskingRuntimeError> {
        match payload {
            Payload::Text(text) => self.mask_text(text).map(MaskedPayload::Text),
            Payload::Structured(value) => self.mask_value(value).map(MaskedPayload::Structured),
        }
    }

    fn check_len(&self, text: &str) -> Result<(), MaskingRuntimeError> {
        match self.max_input_len {
            Some(limit) if text.len() > limit => Err(MaskingRuntimeError::InputTooLarge {
                len: text.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Highest-priority field rule selecting `key`
    fn field_rule(&self, key: &str) -> Option<&PatternRule> {
        self.rules.rules().iter().find(|rule| rule.selects_field(key))
    }

    /// Whether an accepted text span beats a whole-leaf span of field rule `field`
    ///
    /// Same ordering as `RuleSet::apply`: priority, then start, then length,
    /// then rule id. The whole-leaf span starts at 0 and is never shorter.
    fn outranks(&self, span: &MaskedSpan, field: &PatternRule, leaf_len: usize) -> bool {
        let Some(rule) = self.rules.get(&span.rule_id) else {
            return false;
        };
        rule.priority > field.priority
            || (rule.priority == field.priority
                && span.start == 0
                && span.end == leaf_len
                && rule.id < field.id)
    }

    fn mask_node(
        &self,
        value: &Value,
        selected: Option<&PatternRule>,
        acc: &mut Accumulator,
    ) -> Result<Value, MaskingRuntimeError> {
        match value {
            Value::String(text) => Ok(self
                .mask_leaf(text, selected, acc)?
                .map(Value::String)
                .unwrap_or_else(|| value.clone())),

            // Numbers are matched on their textual form; a masked number becomes a string
            Value::Number(number) => {
                let text = number.to_string();
                Ok(self
                    .mask_leaf(&text, selected, acc)?
                    .map(Value::String)
                    .unwrap_or_else(|| value.clone()))
            }

            Value::Object(map) => {
                let mut masked = Map::with_capacity(map.len());
                for (key, item) in map {
                    let rule = selected.or_else(|| self.field_rule(key));
                    masked.insert(key.clone(), self.mask_node(item, rule, acc)?);
                }
                Ok(Value::Object(masked))
            }

            Value::Array(items) => items
                .iter()
                .map(|item| self.mask_node(item, selected, acc))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            Value::Bool(_) | Value::Null => Ok(value.clone()),
        }
    }

    /// Masked replacement for a scalar leaf, or `None` when it is left alone
    fn mask_leaf(
        &self,
        text: &str,
        selected: Option<&PatternRule>,
        acc: &mut Accumulator,
    ) -> Result<Option<String>, MaskingRuntimeError> {
        self.check_len(text)?;

        let result = self.rules.apply(text);

        // The selected field rule competes as one span covering the whole leaf
        if let Some(rule) = selected {
            let blocked = text.is_empty()
                || self.rules.is_allowlisted(text)
                || result
                    .spans
                    .iter()
                    .any(|span| self.outranks(span, rule, text.len()));
            if !blocked {
                acc.record([rule.id.clone()]);
                return Ok(Some(apply_strategy(text, &rule.strategy)));
            }
        }

        if !result.is_masked() {
            return Ok(None);
        }
        acc.record(result.matched_rule_ids);
        Ok(Some(result.text.into_owned()))
    }
}

impl Redactor for MaskingEngine {
    fn mask_text<'a>(&self, text: &'a str) -> Result<MaskResult<'a>, MaskingRuntimeError> {
        self.check_len(text)?;
        Ok(self.rules.apply(text))
    }

    fn mask_value(&self, value: &Value) -> Result<StructuredMaskResult, MaskingRuntimeError> {
        let mut acc = Accumulator::default();
        let masked = self.mask_node(value, None, &mut acc)?;

        let matched_rule_ids = self
            .rules
            .rules()
            .iter()
            .filter(|rule| acc.rule_ids.contains(&rule.id))
            .map(|rule| rule.id.clone())
            .collect();

        Ok(StructuredMaskResult {
            value: masked,
            matched_rule_ids,
            masked_leaves: acc.masked_leaves,
        })
    }
}

#[derive(Default)]
struct Accumulator {
    rule_ids: HashSet<Arc<str>>,
    masked_leaves: usize,
}

impl Accumulator {
    /// One masked leaf and the rules that masked it
    fn record(&mut self, rule_ids: impl IntoIterator<Item = Arc<str>>) {
        self.rule_ids.extend(rule_ids);
        self.masked_leaves += 1;
    }
}
