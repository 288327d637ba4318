// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// PyO3 bindings: the masking adapter as a Python logging filter

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::borrow::Cow;
use std::sync::Arc;

use super::adapter::MaskingAdapter;
use super::config::MaskingConfig;
use super::engine::{MaskingEngine, Redactor};

/// Masking filter exposed to Python
///
/// # Example (Python)
/// ```python
/// import logging
/// from log_masking import MaskingFilterRust
///
/// config = {
///     "builtin_rules": True,
///     "fallback": "drop",
///     "rules": [
///         {"id": "card", "selector": {"regex": {"pattern": "\\d{16}"}},
///          "strategy": {"type": "partial", "keep_prefix": 4, "keep_suffix": 4}},
///     ],
/// }
/// handler = logging.StreamHandler()
/// handler.addFilter(MaskingFilterRust(config))
///
/// logging.getLogger().addHandler(handler)
/// logging.warning("card %s", "1234567812345678")  # card 1234********5678
/// ```
#[pyclass]
pub struct MaskingFilterRust {
    engine: Arc<MaskingEngine>,
    adapter: MaskingAdapter,
}

#[pymethods]
impl MaskingFilterRust {
    /// Create a filter
    ///
    /// # Arguments
    /// * `config_dict` - Python dictionary with the same shape as the JSON
    ///   configuration. When omitted, only the built-in rules are active.
    #[new]
    #[pyo3(signature = (config_dict=None))]
    pub fn new(py: Python<'_>, config_dict: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let config = match config_dict {
            Some(dict) => {
                let json: String = py
                    .import("json")?
                    .call_method1("dumps", (dict,))?
                    .extract()?;
                MaskingConfig::from_json_str(&json)
                    .map_err(|e| PyValueError::new_err(format!("Invalid config: {}", e)))?
            }
            None => MaskingConfig {
                builtin_rules: true,
                ..Default::default()
            },
        };

        let engine = MaskingEngine::from_config(&config)
            .map(Arc::new)
            .map_err(|e| PyValueError::new_err(format!("Rule compilation failed: {}", e)))?;
        let adapter = MaskingAdapter::new(engine.clone()).with_fallback(config.fallback);
        adapter.set_enabled(config.enabled);

        Ok(Self { engine, adapter })
    }

    /// Mask text directly, bypassing the fallback policy
    ///
    /// # Raises
    /// * `RuntimeError` - If the input exceeds `max_input_len`
    pub fn mask(&self, text: &str) -> PyResult<String> {
        self.engine
            .mask_text(text)
            .map(|result| result.into_text().into_owned())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Mask a message. Returns `None` when the event should be dropped.
    pub fn transform(&self, message: &str) -> Option<String> {
        self.adapter
            .transform_message(message)
            .map(Cow::into_owned)
    }

    /// `logging.Filter` protocol: rewrite the record in place, `False` drops it
    pub fn filter(&self, record: &Bound<'_, PyAny>) -> PyResult<bool> {
        let message: String = record.call_method0("getMessage")?.extract()?;

        match self.adapter.transform_message(&message) {
            Some(Cow::Owned(masked)) => {
                record.setattr("msg", masked)?;
                record.setattr("args", ())?;
                Ok(true)
            }
            Some(Cow::Borrowed(_)) => Ok(true),
            None => Ok(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.adapter.set_enabled(enabled);
    }

    /// Advisory counters as a dict
    pub fn stats<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let stats = self.adapter.stats();
        let dict = PyDict::new(py);
        dict.set_item("events", stats.events)?;
        dict.set_item("masked_events", stats.masked_events)?;
        dict.set_item("replacements", stats.replacements)?;
        dict.set_item("passed_through", stats.passed_through)?;
        dict.set_item("dropped", stats.dropped)?;
        Ok(dict)
    }
}
