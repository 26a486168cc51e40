// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider implementation.
//!
//! `REPLACER_SERVER_PORT=9090` becomes `server.port`.  Underscores and dots
//! are interchangeable on lookup, so `REPLACER_REWRITE_RULES_FILE` also
//! answers `rewrite.rules_file`.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::env;

use super::ConfigError;
use super::ConfigProvider;

/// Prefix used when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "REPLACER_";

/// Configuration provider that retrieves values from environment variables.
#[derive(Debug)]
pub struct EnvConfigProvider {
    prefix: String,
    /// Normalised key -> raw value, captured at construction.
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    /// Create a provider for every variable starting with `prefix`.
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the process environment.
    pub fn refresh_cache(&mut self) {
        self.cache = env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (normalise(rest), value))
            })
            .collect();
    }

    fn parse_value(value: &str) -> Value {
        // JSON first so lists like `["accept","cookie"]` work
        if let Ok(json_value) = serde_json::from_str(value) {
            return json_value;
        }
        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        }
        if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }
        json!(value)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(&normalise(key))
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.cache.get(&normalise(key)).map(|v| Self::parse_value(v)))
    }
}

fn normalise(key: &str) -> String {
    key.to_ascii_lowercase().replace('_', ".")
}
