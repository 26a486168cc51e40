// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration subsystem
//!
//! A running gateway is created from an ordered list of [`ConfigProvider`]s;
//! later providers override earlier ones.  The loader stacks them like this:
//!
//! 1. `FileConfigProvider` – `replacer.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `REPLACER_SERVER_PORT=9090`
//! 3. *your* provider implementing [`ConfigProvider`]
//!
//! Reading a key through [`ConfigProviderExt::get`] is therefore *deterministic*: the last provider
//! in the chain that has a key wins.
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host`           | string     | `127.0.0.1` | Address to bind                         |
//! | `server.port`           | u16        | `8080`      | Proxy port                              |
//! | `server.health_port`    | u16        | `8081`      | Health/readiness port                   |
//! | `proxy.timeout`         | u64 (s)    | `30`        | Wait for origin response headers        |
//! | `proxy.forward_headers` | [string]   | see filters | Request headers passed to the origin    |
//! | `proxy.logging`         | object     | –           | See `logging::LoggingConfig`            |
//! | `rewrite.rules_file`    | path       | –           | `match,replacement` lines; required     |
//! | `rewrite.content_types` | [string]   | see filters | Content-Type prefixes that get rewritten |

mod env;
pub mod error;
mod file;


pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Core configuration provider trait that all configuration sources must implement.
/// This trait is object-safe since it doesn't contain generic methods.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Check if the configuration provider has a value for the given key.
    fn has(&self, key: &str) -> bool;

    /// Get the name of the configuration provider for debugging purposes.
    fn provider_name(&self) -> &str;

    /// Get a raw configuration value by key.
    /// Returns a JSON Value that can be later deserialized into specific types.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of [`ConfigProvider::get_raw`].  Generic, so not
/// object-safe; [`Config`] gets it through its own `ConfigProvider` impl.
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a configuration value by key and deserialize it to the specified type.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| {
                    ConfigError::ParseError(format!("cannot read '{key}' from {}: {e}", self.provider_name()))
                })
            })
            .transpose()
    }

    /// Like [`get`](Self::get), falling back to `default` when no provider has `key`.
    fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

// Implement ConfigProviderExt for any type that implements ConfigProvider
impl<T: ConfigProvider> ConfigProviderExt for T {}

/// Builder for the configuration system.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration provider.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a provider that is already shared.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Main configuration struct that holds all providers and handles retrieving values.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Value from the last provider that has `key`.
    fn lookup(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self.providers.iter().rev().find(|p| p.has(key)) {
            Some(provider) => provider.get_raw(key),
            None => Ok(None),
        }
    }

    /// Create a configuration backed by a single file.
    pub fn default_file(file_path: &str) -> Result<Self, ConfigError> {
        let provider = FileConfigProvider::new(file_path)?;
        Ok(Self::builder().with_provider(provider).build())
    }
}

/// A whole configuration can sit inside another one as a single layer.
impl ConfigProvider for Config {
    fn has(&self, key: &str) -> bool {
        self.providers.iter().any(|p| p.has(key))
    }

    fn provider_name(&self) -> &str {
        "config"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        self.lookup(key)
    }
}
