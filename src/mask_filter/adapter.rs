// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Integration adapter invoked on the logging call path
//
// The adapter never fails: masking errors (and panics) turn into either a
// pass-through of the original event or a dropped event, plus a diagnostic.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde_json::{Map, Value};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::config::{FallbackMode, MaskingConfig};
use super::engine::{MaskingEngine, Redactor};
use super::error::{ConfigError, MaskingRuntimeError};

/// `log` target used for the adapter's own diagnostics
pub const DIAGNOSTICS_TARGET: &str = "log_masking::diagnostics";

/// Module path carried by records that [`LogDiagnostics`] emits
const DIAGNOSTICS_MODULE: &str = module_path!();

/// Internal events worth telling the operator about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    MaskingFailed {
        error: MaskingRuntimeError,
        fallback: FallbackMode,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MaskingFailed {
                error,
                fallback: FallbackMode::PassThrough,
            } => write!(f, "{}; event logged UNMASKED", error),
            Diagnostic::MaskingFailed {
                error,
                fallback: FallbackMode::Drop,
            } => write!(f, "{}; event dropped", error),
        }
    }
}

/// Where diagnostics go. Must not route back through the masked channel.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Reports diagnostics through the `log` facade under [`DIAGNOSTICS_TARGET`]
///
/// [`MaskingLogger`] forwards that target straight to its inner logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        log::warn!(target: DIAGNOSTICS_TARGET, "{}", diagnostic);
    }
}

/// Advisory counters, updated with relaxed atomics
#[derive(Debug, Default)]
pub struct MaskingStats {
    events: AtomicU64,
    masked_events: AtomicU64,
    replacements: AtomicU64,
    passed_through: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`MaskingStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub events: u64,
    pub masked_events: u64,
    pub replacements: u64,
    pub passed_through: u64,
    pub dropped: u64,
}

impl MaskingStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            masked_events: self.masked_events.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// A log event after masking
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedEvent<'a> {
    pub message: Cow<'a, str>,
    pub arguments: Map<String, Value>,
    pub matched_rule_ids: Vec<Arc<str>>,
    /// Spans replaced in the message plus leaves replaced in the arguments
    pub replacements: usize,
}

impl<'a> MaskedEvent<'a> {
    fn unchanged(message: &'a str, arguments: &Map<String, Value>) -> Self {
        Self {
            message: Cow::Borrowed(message),
            arguments: arguments.clone(),
            matched_rule_ids: Vec::new(),
            replacements: 0,
        }
    }

    pub fn is_masked(&self) -> bool {
        self.replacements > 0
    }
}

/// Thin layer between a host logging pipeline and a [`Redactor`]
pub struct MaskingAdapter {
    redactor: Arc<dyn Redactor>,
    fallback: FallbackMode,
    enabled: AtomicBool,
    diagnostics: Arc<dyn DiagnosticSink>,
    stats: MaskingStats,
}

impl fmt::Debug for MaskingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskingAdapter")
            .field("fallback", &self.fallback)
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MaskingAdapter {
    pub fn new(redactor: Arc<dyn Redactor>) -> Self {
        Self {
            redactor,
            fallback: FallbackMode::default(),
            enabled: AtomicBool::new(true),
            diagnostics: Arc::new(LogDiagnostics),
            stats: MaskingStats::default(),
        }
    }

    /// Build the engine and adapter described by a configuration
    pub fn from_config(config: &MaskingConfig) -> Result<Self, ConfigError> {
        let engine = MaskingEngine::from_config(config)?;
        let adapter = Self::new(Arc::new(engine)).with_fallback(config.fallback);
        adapter.set_enabled(config.enabled);
        Ok(adapter)
    }

    pub fn with_fallback(mut self, fallback: FallbackMode) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn fallback(&self) -> FallbackMode {
        self.fallback
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Toggle masking at runtime. Disabled adapters pass events through untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Mask one log event
    ///
    /// Returns `None` only when masking failed and the fallback is
    /// [`FallbackMode::Drop`].
    pub fn transform<'a>(
        &self,
        message: &'a str,
        arguments: &Map<String, Value>,
    ) -> Option<MaskedEvent<'a>> {
        MaskingStats::bump(&self.stats.events, 1);

        if !self.is_enabled() {
            return Some(MaskedEvent::unchanged(message, arguments));
        }

        match self.try_mask(message, arguments) {
            Ok(event) => {
                if event.is_masked() {
                    MaskingStats::bump(&self.stats.masked_events, 1);
                    MaskingStats::bump(&self.stats.replacements, event.replacements as u64);
                }
                Some(event)
            }
            Err(error) => {
                self.diagnostics.report(&Diagnostic::MaskingFailed {
                    error,
                    fallback: self.fallback,
                });
                match self.fallback {
                    FallbackMode::PassThrough => {
                        MaskingStats::bump(&self.stats.passed_through, 1);
                        Some(MaskedEvent::unchanged(message, arguments))
                    }
                    FallbackMode::Drop => {
                        MaskingStats::bump(&self.stats.dropped, 1);
                        None
                    }
                }
            }
        }
    }

    /// Mask a message with no structured arguments
    pub fn transform_message<'a>(&self, message: &'a str) -> Option<Cow<'a, str>> {
        self.transform(message, &Map::new()).map(|event| event.message)
    }

    fn try_mask<'a>(
        &self,
        message: &'a str,
        arguments: &Map<String, Value>,
    ) -> Result<MaskedEvent<'a>, MaskingRuntimeError> {
        let redactor = &self.redactor;
        let (text, args) = catch_unwind(AssertUnwindSafe(|| {
            let text = redactor.mask_text(message)?;
            let args = if arguments.is_empty() {
                None
            } else {
                Some(redactor.mask_value(&Value::Object(arguments.clone()))?)
            };
            Ok::<_, MaskingRuntimeError>((text, args))
        }))
        .map_err(|payload| MaskingRuntimeError::Panicked(panic_message(payload.as_ref())))??;

        let mut replacements = text.spans.len();
        let mut matched_rule_ids = text.matched_rule_ids;
        let arguments = match args {
            Some(result) => {
                replacements += result.masked_leaves;
                for id in result.matched_rule_ids {
                    if !matched_rule_ids.contains(&id) {
                        matched_rule_ids.push(id);
                    }
                }
                match result.value {
                    Value::Object(map) => map,
                    _ => arguments.clone(),
                }
            }
            None => arguments.clone(),
        };

        Ok(MaskedEvent {
            message: text.text,
            arguments,
            matched_rule_ids,
            replacements,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A [`Log`] implementation that masks every record before handing it to `inner`
///
/// Only records emitted by [`LogDiagnostics`] skip masking. Application
/// records logged under [`DIAGNOSTICS_TARGET`] are masked like any other.
pub struct MaskingLogger<L> {
    inner: L,
    adapter: MaskingAdapter,
}

impl<L: Log> MaskingLogger<L> {
    pub fn new(inner: L, adapter: MaskingAdapter) -> Self {
        Self { inner, adapter }
    }

    pub fn adapter(&self) -> &MaskingAdapter {
        &self.adapter
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Install as the global `log` logger
    pub fn init(self, max_level: LevelFilter) -> Result<(), SetLoggerError>
    where
        L: 'static,
    {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl<L: Log> Log for MaskingLogger<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }

        // Our own diagnostics skip masking so they cannot loop
        if is_own_diagnostic(record) {
            self.inner.log(record);
            return;
        }

        let message = match record.args().as_str() {
            Some(text) => Cow::Borrowed(text),
            None => Cow::Owned(record.args().to_string()),
        };

        if let Some(masked) = self.adapter.transform_message(&message) {
            self.inner.log(
                &Record::builder()
                    .args(format_args!("{}", masked))
                    .metadata(record.metadata().clone())
                    .module_path(record.module_path())
                    .file(record.file())
                    .line(record.line())
                    .build(),
            );
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn is_own_diagnostic(record: &Record<'_>) -> bool {
    record.target() == DIAGNOSTICS_TARGET && record.module_path() == Some(DIAGNOSTICS_MODULE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask_filter::config::{InvalidPatternPolicy, MaskingStrategy, RuleSpec};
    use crate::mask_filter::rules::{MaskResult, RuleSet};
    use crate::mask_filter::engine::StructuredMaskResult;
    use log::Level;
    use serde_json::json;
    use std::sync::Mutex;

    struct FailingRedactor;

    impl Redactor for FailingRedactor {
        fn mask_text<'a>(&self, text: &'a str) -> Result<MaskResult<'a>, MaskingRuntimeError> {
            Err(MaskingRuntimeError::InputTooLarge {
                len: text.len(),
                limit: 0,
            })
        }

        fn mask_value(&self, _value: &Value) -> Result<StructuredMaskResult, MaskingRuntimeError> {
            Err(MaskingRuntimeError::InputTooLarge { len: 1, limit: 0 })
        }
    }

    struct PanickingRedactor;

    impl Redactor for PanickingRedactor {
        fn mask_text<'a>(&self, _text: &'a str) -> Result<MaskResult<'a>, MaskingRuntimeError> {
            panic!("rule exploded")
        }

        fn mask_value(&self, _value: &Value) -> Result<StructuredMaskResult, MaskingRuntimeError> {
            panic!("rule exploded")
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<Diagnostic>>);

    impl DiagnosticSink for CollectingSink {
        fn report(&self, diagnostic: &Diagnostic) {
            self.0.lock().unwrap().push(diagnostic.clone());
        }
    }

    #[derive(Default)]
    struct CapturingLogger(Mutex<Vec<(Level, String, String)>>);

    impl Log for CapturingLogger {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            self.0.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    fn card_engine() -> Arc<MaskingEngine> {
        let specs = vec![RuleSpec::regex(
            "card",
            r"\d{16}",
            MaskingStrategy::partial(4, 4),
        )];
        let rules = RuleSet::compile(&specs, &[], InvalidPatternPolicy::Skip).unwrap();
        Arc::new(MaskingEngine::new(Arc::new(rules)))
    }

    #[test]
    fn test_transform_masks_message_and_arguments() {
        let adapter = MaskingAdapter::new(card_engine());
        let mut args = Map::new();
        args.insert("card".to_string(), json!("1234567812345678"));
        args.insert("amount".to_string(), json!(12));

        let event = adapter
            .transform("paid with 1234567812345678", &args)
            .unwrap();
        assert_eq!(event.message, "paid with 1234********5678");
        assert_eq!(event.arguments["card"], json!("1234********5678"));
        assert_eq!(event.arguments["amount"], json!(12));
        assert_eq!(event.replacements, 2);
        assert_eq!(event.matched_rule_ids, vec![Arc::<str>::from("card")]);

        let stats = adapter.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.masked_events, 1);
        assert_eq!(stats.replacements, 2);
    }

    #[test]
    fn test_disabled_passes_through() {
        let adapter = MaskingAdapter::new(card_engine());
        adapter.set_enabled(false);
        let out = adapter.transform_message("1234567812345678").unwrap();
        assert_eq!(out, "1234567812345678");
        adapter.set_enabled(true);
        assert_eq!(
            adapter.transform_message("1234567812345678").unwrap(),
            "1234********5678"
        );
    }

    #[test]
    fn test_pass_through_on_failure() {
        let sink = Arc::new(CollectingSink::default());
        let adapter = MaskingAdapter::new(Arc::new(FailingRedactor))
            .with_fallback(FallbackMode::PassThrough)
            .with_diagnostics(sink.clone());

        let out = adapter.transform_message("secret stuff").unwrap();
        assert_eq!(out, "secret stuff");

        let diagnostics = sink.0.lock().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::MaskingFailed {
                fallback: FallbackMode::PassThrough,
                ..
            }
        ));
        assert_eq!(adapter.stats().passed_through, 1);
    }

    #[test]
    fn test_drop_on_failure() {
        let sink = Arc::new(CollectingSink::default());
        let adapter = MaskingAdapter::new(Arc::new(FailingRedactor))
            .with_fallback(FallbackMode::Drop)
            .with_diagnostics(sink.clone());

        assert!(adapter.transform_message("secret stuff").is_none());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(adapter.stats().dropped, 1);
    }

    #[test]
    fn test_panic_is_contained() {
        let sink = Arc::new(CollectingSink::default());
        let adapter = MaskingAdapter::new(Arc::new(PanickingRedactor))
            .with_diagnostics(sink.clone());

        let out = adapter.transform_message("hello").unwrap();
        assert_eq!(out, "hello");
        let diagnostics = sink.0.lock().unwrap();
        assert_eq!(
            diagnostics[0],
            Diagnostic::MaskingFailed {
                error: MaskingRuntimeError::Panicked("rule exploded".to_string()),
                fallback: FallbackMode::PassThrough,
            }
        );
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::MaskingFailed {
            error: MaskingRuntimeError::Panicked("x".to_string()),
            fallback: FallbackMode::Drop,
        };
        assert_eq!(diagnostic.to_string(), "masking panicked: x; event dropped");
    }

    #[test]
    fn test_logger_masks_records() {
        let logger = MaskingLogger::new(CapturingLogger::default(), MaskingAdapter::new(card_engine()));
        logger.log(
            &Record::builder()
                .args(format_args!("card {} ok", "1234567812345678"))
                .level(Level::Info)
                .target("app")
                .build(),
        );

        let records = logger.inner().0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, Level::Info);
        assert_eq!(records[0].1, "app");
        assert_eq!(records[0].2, "card 1234********5678 ok");
    }

    #[test]
    fn test_logger_drops_and_bypasses_diagnostics() {
        let adapter = MaskingAdapter::new(Arc::new(FailingRedactor))
            .with_fallback(FallbackMode::Drop)
            .with_diagnostics(Arc::new(CollectingSink::default()));
        let logger = MaskingLogger::new(CapturingLogger::default(), adapter);

        logger.log(
            &Record::builder()
                .args(format_args!("password=hunter2"))
                .level(Level::Info)
                .target("app")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("masking failed"))
                .level(Level::Warn)
                .target(DIAGNOSTICS_TARGET)
                .module_path(Some(DIAGNOSTICS_MODULE))
                .build(),
        );

        let records = logger.inner().0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, DIAGNOSTICS_TARGET);
        assert_eq!(logger.adapter().stats().dropped, 1);
    }

    #[test]
    fn test_logger_masks_app_records_on_diagnostics_target() {
        let logger = MaskingLogger::new(CapturingLogger::default(), MaskingAdapter::new(card_engine()));
        logger.log(
            &Record::builder()
                .args(format_args!("card {}", "1234567812345678"))
                .level(Level::Warn)
                .target(DIAGNOSTICS_TARGET)
                .module_path(Some("app::billing"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("card {}", "1234567812345678"))
                .level(Level::Warn)
                .target(DIAGNOSTICS_TARGET)
                .build(),
        );

        let records = logger.inner().0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].2, "card 1234********5678");
        assert_eq!(records[1].2, "card 1234********5678");
    }
}
