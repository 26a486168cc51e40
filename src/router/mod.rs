// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Origin selection.
//!
//! The first path segment names the origin; everything after it is forwarded
//! verbatim.
//!
//! | client request                     | origin request                       |
//! |------------------------------------|--------------------------------------|
//! | `/example.com/a/b.css?v=2`         | `http://example.com/a/b.css?v=2`     |
//! | `/example.com`                     | `http://example.com/`                |
//! | `/localhost:8080/x`                | `http://localhost:8080/x`            |
//! | `/` or `//x`                       | rejected, 400                        |

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use reqwest::Url;

use crate::core::{ProxyError, ProxyRequest, Route, Router};
use crate::trace_fmt;

/// Routes on the first path segment.
#[derive(Debug, Clone, Default)]
pub struct OriginRouter;

impl OriginRouter {
    pub fn new() -> Self {
        Self
    }

    /// Split a client path into a [`Route`] without touching the network.
    pub fn resolve(path: &str) -> Result<Route, ProxyError> {
        let rest = path.strip_prefix('/').unwrap_or(path);
        let (origin, forward) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        validate_origin(origin)?;

        let forward_path = if forward.is_empty() {
            "/".to_string()
        } else {
            forward.to_string()
        };

        Ok(Route {
            origin: origin.to_string(),
            target_base_url: format!("http://{origin}"),
            forward_path,
        })
    }
}

#[async_trait]
impl Router for OriginRouter {
    async fn route(&self, request: &ProxyRequest) -> Result<Route, ProxyError> {
        let route = Self::resolve(&request.path)?;
        trace_fmt!(
            "Router",
            "{} -> origin {} path {}",
            request.path,
            route.origin,
            route.forward_path
        );
        Ok(route)
    }
}

/// The segment must be a bare `host[:port]`.
fn validate_origin(origin: &str) -> Result<(), ProxyError> {
    if origin.is_empty() {
        return Err(ProxyError::MalformedRequest(
            "request path has no origin segment".to_string(),
        ));
    }

    let url = Url::parse(&format!("http://{origin}/")).map_err(|e| {
        ProxyError::MalformedRequest(format!("invalid origin '{origin}': {e}"))
    })?;

    let bare = url.host_str().is_some_and(|h| !h.is_empty())
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none();

    if !bare {
        return Err(ProxyError::MalformedRequest(format!(
            "invalid origin '{origin}'"
        )));
    }
    Ok(())
}
