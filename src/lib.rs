// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Replacer - a rewriting reverse proxy.
//!
//! A request for `/{origin}/{path}?{query}` is forwarded to
//! `http://{origin}/{path}?{query}`.  The response comes back with every
//! configured literal `match -> replacement` rule applied to its `Location`
//! header and, for text-like content types, to its body.  Bodies are
//! rewritten as they stream: no response is ever buffered whole.
//!
//! # Rules
//!
//! One rule per line, `match,replacement`; there are no comments, every
//! non-blank line is a rule.  Rules apply in file order, each one reading
//! the output of the one before:
//!
//! ```text
//! www.example.com/static,cdn.example.com/static
//! http://cdn.example.com,https://cdn.example.com
//! ```
//!
//! # Embedding
//!
//! ```rust,no_run
//! use replacer::{Replacer, rewrite::RuleSet};
//!
//! # async fn run() -> Result<(), replacer::LoaderError> {
//! let proxy = Replacer::loader()
//!     .with_env_vars()
//!     .with_rules(RuleSet::from_pairs([("origin.example.com", "proxy.example.com")]))
//!     .build()
//!     .await?;
//! proxy.start().await
//! # }
//! ```
//!
//! Extra behaviour is added through the [`Filter`] trait, exactly like the
//! built-in header and rewrite filters.

pub mod config;
pub mod core;
pub mod filters;
pub mod loader;
pub mod logging;
pub mod rewrite;
pub mod router;
pub mod server;

pub use config::{ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{
    Filter, FilterType, HttpMethod, ProxyError, ProxyRequest, ProxyResponse, RequestContext,
    ResponseContext, Route, Router,
};
pub use filters::{ForwardHeadersFilter, RewriteFilter};
pub use loader::{LoaderError, Replacer, ReplacerLoader};
pub use rewrite::{FilterChain, PatternFilter, RuleError, RuleSet};
pub use router::OriginRouter;
pub use server::{ProxyServer, ServerConfig};
