// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Masking filter - sensitive data redaction for log output
//
// - RegexSet prefilter so rules that cannot match are never scanned
// - Linear-time matching from the regex crate, no backtracking stalls
// - Copy-on-write results: unmatched messages are never copied

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod patterns;
pub mod rules;
pub mod strategy;

#[cfg(feature = "python")]
pub mod python;

pub use adapter::{
    Diagnostic, DiagnosticSink, LogDiagnostics, MaskedEvent, MaskingAdapter, MaskingLogger,
    StatsSnapshot, DIAGNOSTICS_TARGET,
};
pub use config::{
    FallbackMode, FieldFormat, InvalidPatternPolicy, MaskingConfig, MaskingStrategy, RuleSpec,
    Selector,
};
pub use engine::{MaskedPayload, MaskingEngine, Payload, Redactor, StructuredMaskResult};
pub use error::{ConfigError, InvalidPatternError, MaskingRuntimeError};
pub use patterns::{PatternRule, Span};
pub use rules::{MaskResult, MaskedSpan, RuleSet};
