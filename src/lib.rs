// Copyright 2025
// SPDX-License-Identifier: Apache-2.0
//
// Sensitive data masking for log output
// Optional PyO3 bindings for Python logging integration

#![cfg_attr(feature = "python", allow(non_local_definitions))]

pub mod mask_filter;

pub use mask_filter::{
    ConfigError, MaskingAdapter, MaskingConfig, MaskingEngine, MaskingLogger, MaskingStrategy,
    RuleSet, RuleSpec,
};

/// Python module: log_masking
///
/// Log masking filter backed by the Rust engine.
///
/// # Examples
///
/// ```python
/// from log_masking import MaskingFilterRust
///
/// config = {
///     "rules": [
///         {"id": "email", "selector": {"regex": {"pattern": "[\\w.]+@[\\w.]+"}},
///          "strategy": {"type": "full", "token": "[EMAIL]"}, "priority": 10},
///     ],
/// }
/// masking = MaskingFilterRust(config)
///
/// print(masking.transform("contact a@b.com now"))  # "contact [EMAIL] now"
/// ```
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn log_masking(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use pyo3::prelude::*;

    m.add_class::<mask_filter::python::MaskingFilterRust>()?;

    // Module metadata
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Sensitive data masking for log output")?;

    Ok(())
}
