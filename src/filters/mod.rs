// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in filters
//!
//! The loader installs both of these on every gateway:
//!
//! | filter | type | configuration key |
//! |--------|------|-------------------|
//! | [`ForwardHeadersFilter`] | pre  | `proxy.forward_headers` |
//! | [`RewriteFilter`]        | post | `rewrite.content_types` |


use async_trait::async_trait;
use http_body_util::BodyExt;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::{Filter, FilterType, ProxyError, ProxyRequest, ProxyResponse};
use crate::rewrite::{ChunkFeed, FilterChain, RuleSet, rewrite_with_chain};
use crate::{debug_fmt, trace_fmt, warn_fmt};

/// Request headers copied to the origin when nothing is configured.
pub const DEFAULT_FORWARD_HEADERS: &[&str] = &[
    "accept",
    "user-agent",
    "accept-language",
    "accept-charset",
    "cookie",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-server",
];

/// Content-Type prefixes whose bodies are rewritten when nothing is configured.
pub const DEFAULT_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "application/x-javascript",
    "text/css",
    "application/json",
    "application/xhtml+xml",
    "text/xml",
    "application/rss+xml",
    "application/rdf+xml",
    "application/atom+xml",
];

fn default_forward_headers() -> Vec<String> {
    DEFAULT_FORWARD_HEADERS.iter().map(|h| h.to_string()).collect()
}

fn default_content_types() -> Vec<String> {
    DEFAULT_CONTENT_TYPES.iter().map(|t| t.to_string()).collect()
}

/// Configuration for the request header allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardHeadersConfig {
    /// Header names, any case
    #[serde(default = "default_forward_headers")]
    pub headers: Vec<String>,
}

impl Default for ForwardHeadersConfig {
    fn default() -> Self {
        Self {
            headers: default_forward_headers(),
        }
    }
}

/// Drops every request header that is not on the allow-list.
#[derive(Debug)]
pub struct ForwardHeadersFilter {
    allowed: Vec<HeaderName>,
}

impl Default for ForwardHeadersFilter {
    fn default() -> Self {
        Self::new(ForwardHeadersConfig::default())
    }
}

impl ForwardHeadersFilter {
    /// Names that are not valid header names are skipped with a warning.
    pub fn new(config: ForwardHeadersConfig) -> Self {
        let mut allowed: Vec<HeaderName> = Vec::with_capacity(config.headers.len());
        for name in &config.headers {
            match HeaderName::from_bytes(name.trim().as_bytes()) {
                Ok(header) if !allowed.contains(&header) => allowed.push(header),
                Ok(_) => {}
                Err(_) => warn_fmt!("ForwardHeadersFilter", "Ignoring invalid header name '{}'", name),
            }
        }
        Self { allowed }
    }

    pub fn allowed(&self) -> &[HeaderName] {
        &self.allowed
    }

    fn retain_allowed(&self, headers: &HeaderMap) -> HeaderMap {
        let mut kept = HeaderMap::new();
        for name in &self.allowed {
            for value in headers.get_all(name) {
                kept.append(name.clone(), value.clone());
            }
        }
        kept
    }
}

#[async_trait]
impl Filter for ForwardHeadersFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::Pre
    }

    fn name(&self) -> &str {
        "forward_headers"
    }

    async fn pre_filter(&self, mut request: ProxyRequest) -> Result<ProxyRequest, ProxyError> {
        let kept = self.retain_allowed(&request.headers);
        trace_fmt!(
            "ForwardHeadersFilter",
            "Forwarding {} of {} request headers",
            kept.len(),
            request.headers.len()
        );
        request.headers = kept;
        Ok(request)
    }
}

/// Configuration for response rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Path of the `match,replacement` rules file
    #[serde(default)]
    pub rules_file: Option<String>,

    /// Content-Type prefixes whose bodies go through the filter chain
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            rules_file: None,
            content_types: default_content_types(),
        }
    }
}

/// Rewrites `Location` headers and text-like bodies with the loaded rules.
#[derive(Debug)]
pub struct RewriteFilter {
    rules: Arc<RuleSet>,
    content_types: Vec<String>,
}

impl RewriteFilter {
    pub fn new(rules: Arc<RuleSet>, content_types: Vec<String>) -> Self {
        let content_types = content_types
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            rules,
            content_types,
        }
    }

    pub fn with_defaults(rules: Arc<RuleSet>) -> Self {
        Self::new(rules, default_content_types())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Whether a response with this `Content-Type` gets its body rewritten.
    pub fn is_rewritable(&self, content_type: Option<&HeaderValue>) -> bool {
        let Some(value) = content_type.and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let value = value.trim().to_ascii_lowercase();
        self.content_types.iter().any(|prefix| value.starts_with(prefix))
    }

    /// Pass every `Location` value through the rules.
    fn rewrite_locations(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(header::LOCATION) {
            return;
        }

        let originals: Vec<HeaderValue> = headers
            .get_all(header::LOCATION)
            .iter()
            .cloned()
            .collect();
        headers.remove(header::LOCATION);

        for original in originals {
            let rewritten = self
                .rules
                .rewrite_bytes(original.as_bytes())
                .ok()
                .and_then(|bytes| HeaderValue::from_bytes(&bytes).ok());

            match rewritten {
                Some(value) => {
                    if value != original {
                        debug_fmt!(
                            "RewriteFilter",
                            "Location {:?} -> {:?}",
                            original,
                            value
                        );
                    }
                    headers.append(header::LOCATION, value);
                }
                None => {
                    warn_fmt!(
                        "RewriteFilter",
                        "Rewritten Location for {:?} is not a valid header value; keeping original",
                        original
                    );
                    headers.append(header::LOCATION, original);
                }
            }
        }
    }
}

#[async_trait]
impl Filter for RewriteFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::Post
    }

    fn name(&self) -> &str {
        "rewrite"
    }

    async fn post_filter(
        &self,
        request: ProxyRequest,
        mut response: ProxyResponse,
    ) -> Result<ProxyResponse, ProxyError> {
        self.rewrite_locations(&mut response.headers);

        if !self.is_rewritable(response.headers.get(header::CONTENT_TYPE)) {
            trace_fmt!(
                "RewriteFilter",
                "Passing {} body through untouched",
                request.path
            );
            return Ok(response);
        }

        let chain = FilterChain::from_rules(ChunkFeed::new(), &self.rules);
        let description = chain.to_string();
        debug_fmt!(
            "RewriteFilter",
            "Attaching filter chain {} to {}",
            description,
            request.path
        );

        // the rewritten length is unknown up front
        response.headers.remove(header::CONTENT_LENGTH);

        let body = std::mem::replace(&mut response.body, reqwest::Body::from(""));
        response.body = reqwest::Body::wrap_stream(rewrite_with_chain(body.into_data_stream(), chain));
        response.context.write().await.rewrite_chain = Some(description);

        Ok(response)
    }
}
