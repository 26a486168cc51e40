// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point – "turn the key and go".
//!
//! The [`ReplacerLoader`] consumes configuration, initialises logging, loads
//! the replacement rules and wires the filters into a [`ProxyCore`].  Any
//! problem with the rules file stops startup here, before a socket is bound.

#[cfg(test)]
mod tests;

use log::LevelFilter;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{
    Config, ConfigError, ConfigProvider, ConfigProviderExt, EnvConfigProvider, FileConfigProvider,
};
use crate::core::{Filter, ProxyCore, ProxyError};
use crate::filters::{ForwardHeadersConfig, ForwardHeadersFilter, RewriteConfig, RewriteFilter};
use crate::logging::config::LoggingConfig;
use crate::rewrite::{RuleError, RuleSet};
use crate::router::OriginRouter;
use crate::server::{ProxyServer, ServerConfig};
use crate::{info_fmt, logging, warn_fmt};

/// Errors that can occur while starting the gateway.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// The replacement rules could not be loaded
    #[error("rules error: {0}")]
    RulesError(#[from] RuleError),

    /// Proxy error
    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Builder for initializing and configuring the gateway.
#[derive(Debug, Default)]
pub struct ReplacerLoader {
    config: Option<Config>,
    config_file_path: Option<PathBuf>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    rules: Option<RuleSet>,
    rules_file: Option<PathBuf>,
    custom_filters: Vec<Arc<dyn Filter>>,
    skip_logging: bool,
}

impl ReplacerLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration instead of building one.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a configuration file to load.
    pub fn with_config_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.config_file_path = Some(file_path.into());
        self
    }

    /// Layer `REPLACER_*` environment variables over the file.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Set a custom prefix for environment variables.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a provider on top of the file and environment.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Use these rules; `rewrite.rules_file` is then ignored.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Load rules from this file instead of `rewrite.rules_file`.
    pub fn with_rules_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_file = Some(path.into());
        self
    }

    /// Add a filter after the built-in ones.
    pub fn with_filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.custom_filters.push(Arc::new(filter));
        self
    }

    /// Leave logging alone, e.g. when the embedding program set it up.
    pub fn without_logging_init(mut self) -> Self {
        self.skip_logging = true;
        self
    }

    /// Build and initialize the gateway.
    pub async fn build(self) -> Result<Replacer, LoaderError> {
        let config = match self.config {
            Some(config) => self
                .providers
                .into_iter()
                .fold(Config::builder().with_shared_provider(Arc::new(config)), |b, p| {
                    b.with_shared_provider(p)
                })
                .build(),
            None => {
                let mut builder = Config::builder();

                if let Some(file_path) = &self.config_file_path {
                    builder = builder.with_provider(FileConfigProvider::new(file_path)?);
                }

                if self.use_env_vars {
                    let env_provider = match &self.env_prefix {
                        Some(prefix) => EnvConfigProvider::new(prefix),
                        None => EnvConfigProvider::default(),
                    };
                    builder = builder.with_provider(env_provider);
                }

                self.providers
                    .into_iter()
                    .fold(builder, |b, p| b.with_shared_provider(p))
                    .build()
            }
        };
        let config = Arc::new(config);

        let logging_config: LoggingConfig = config.get_or_default("proxy.logging", LoggingConfig::default())?;
        if !self.skip_logging {
            let level = env::var("RUST_LOG_LEVEL")
                .ok()
                .and_then(|l| logging::parse_level(&l))
                .or_else(|| logging::parse_level(&logging_config.level))
                .unwrap_or(LevelFilter::Info);
            logging::init_with_config(level, &logging_config);
        }

        info_fmt!("Startup", "Replacer starting up");

        /* ---------- rules: fatal if missing or malformed ---------- */
        let rules = match self.rules {
            Some(rules) => rules,
            None => {
                let path = match self.rules_file {
                    Some(path) => path,
                    None => config
                        .get::<String>("rewrite.rules_file")?
                        .map(PathBuf::from)
                        .ok_or(RuleError::NotConfigured)?,
                };
                RuleSet::load(&path).map_err(|e| logging::log_error("Startup", e))?
            }
        };
        if rules.is_empty() {
            warn_fmt!("Startup", "No replacement rules loaded; bodies pass through unchanged");
        } else {
            info_fmt!("Startup", "Loaded {} replacement rule(s)", rules.len());
        }
        let rules = Arc::new(rules);

        /* ---------- core + filters ---------- */
        let proxy_core = ProxyCore::new(config.clone(), Arc::new(OriginRouter::new()))?;

        let forward = ForwardHeadersConfig {
            headers: config.get_or_default("proxy.forward_headers", ForwardHeadersConfig::default().headers)?,
        };
        proxy_core.add_filter(Arc::new(ForwardHeadersFilter::new(forward))).await;

        let content_types = config.get_or_default("rewrite.content_types", RewriteConfig::default().content_types)?;
        proxy_core
            .add_filter(Arc::new(RewriteFilter::new(rules.clone(), content_types)))
            .await;

        for filter in self.custom_filters {
            info_fmt!("Startup", "Added filter: {}", filter.name());
            proxy_core.add_filter(filter).await;
        }

        /* ---------- server ---------- */
        let defaults = ServerConfig::default();
        let server_config = ServerConfig {
            host: config.get_or_default("server.host", defaults.host)?,
            port: config.get_or_default("server.port", defaults.port)?,
            health_port: config.get_or_default("server.health_port", defaults.health_port)?,
        };

        let server = ProxyServer::new(server_config, Arc::new(proxy_core)).with_logging(logging_config);

        Ok(Replacer {
            config,
            rules,
            server,
        })
    }
}

/// A fully wired gateway, ready to start.
#[derive(Debug, Clone)]
pub struct Replacer {
    config: Arc<Config>,
    rules: Arc<RuleSet>,
    server: ProxyServer,
}

impl Replacer {
    /// Create a new loader.
    pub fn loader() -> ReplacerLoader {
        ReplacerLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The rules every response is rewritten with.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn server(&self) -> &ProxyServer {
        &self.server
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ProxyError)
    }
}
