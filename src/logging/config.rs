// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `proxy.logging` configuration.

use crate::logging::structured::{LogFormat, LoggerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Use slog instead of env_logger
    pub structured: bool,

    /// `terminal` or `json` (structured only)
    pub format: String,

    /// Log level name
    pub level: String,

    /// Include the module path in structured records
    pub include_location: bool,

    /// Accept a trace id sent by the client
    pub propagate_trace_id: bool,

    /// Echo the trace id back on the response
    pub include_trace_id: bool,

    /// Header carrying the trace id
    pub trace_id_header: String,

    /// Fields added to every structured record, e.g. `service = "replacer"`
    pub static_fields: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            structured: false,
            format: "terminal".to_string(),
            level: "info".to_string(),
            include_location: true,
            propagate_trace_id: true,
            include_trace_id: true,
            trace_id_header: "X-Trace-ID".to_string(),
            static_fields: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Convert to the slog-side settings.
    pub fn to_logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: match self.format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Terminal,
            },
            level: match self.level.to_lowercase().as_str() {
                "trace" => slog::Level::Trace,
                "debug" => slog::Level::Debug,
                "warn" | "warning" => slog::Level::Warning,
                "error" => slog::Level::Error,
                "critical" => slog::Level::Critical,
                _ => slog::Level::Info,
            },
            include_location: self.include_location,
            static_fields: self
                .static_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
