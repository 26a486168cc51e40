// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – requests, responses, filters & routing.
//!
//! Everything that physically moves through the gateway is defined in this
//! module.  No protocol-level logic lives here; that sits in `server` (IO)
//! and `filters` (behaviour).


use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderName};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::config::{Config, ConfigProviderExt};
use crate::{debug_fmt, warn_fmt};

/// Seconds to wait for the origin's response headers.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while proxying a request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The request path does not name an origin.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The origin answered 404.
    #[error("origin returned not found: {0}")]
    OriginNotFound(String),

    /// The origin could not be connected to.
    #[error("origin unreachable: {origin}: {source}")]
    OriginUnreachable {
        origin: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Timeout error
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Filter error
    #[error("filter error: {0}")]
    FilterError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<crate::config::error::ConfigError> for ProxyError {
    fn from(err: crate::config::error::ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}

/// HTTP method of a proxied request.
///
/// Anything outside the standard set (`PROPFIND`, `MKCOL`, ...) travels as
/// [`HttpMethod::Extension`] and reaches the origin unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
    Extension(reqwest::Method),
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Extension(method) => method.as_str(),
        };
        f.write_str(name)
    }
}

impl From<&reqwest::Method> for HttpMethod {
    fn from(method: &reqwest::Method) -> Self {
        match *method {
            reqwest::Method::POST => HttpMethod::Post,
            reqwest::Method::PUT => HttpMethod::Put,
            reqwest::Method::DELETE => HttpMethod::Delete,
            reqwest::Method::HEAD => HttpMethod::Head,
            reqwest::Method::OPTIONS => HttpMethod::Options,
            reqwest::Method::PATCH => HttpMethod::Patch,
            reqwest::Method::TRACE => HttpMethod::Trace,
            reqwest::Method::CONNECT => HttpMethod::Connect,
            reqwest::Method::GET => HttpMethod::Get,
            _ => HttpMethod::Extension(method.clone()),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
            HttpMethod::Extension(method) => method,
        }
    }
}

/// An inbound request on its way to an origin.
///
/// `path` is the full client path, origin segment included; the router
/// splits it.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
    pub context: Arc<RwLock<RequestContext>>,
}

impl Clone for ProxyRequest {
    fn clone(&self) -> Self {
        // A streaming body can't be duplicated.  Give filters an empty one.
        Self {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: reqwest::Body::from(""),
            context: self.context.clone(),
        }
    }
}

/// An origin response on its way back to the client.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
    pub context: Arc<RwLock<ResponseContext>>,
}

/// Per-request data shared with filters.
#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    /// The original client's IP address
    pub client_ip: Option<String>,
    /// When the request arrived
    pub start_time: Option<Instant>,
    /// Trace id used in log lines for this request
    pub trace_id: Option<String>,
}

/// Per-response data shared with filters.
#[derive(Debug, Default, Clone)]
pub struct ResponseContext {
    /// When the origin's headers arrived
    pub receive_time: Option<Instant>,
    /// Provenance of the rewrite chain attached to the body, if any
    pub rewrite_chain: Option<String>,
}

/// Headers that describe a single connection and never cross the proxy.
pub const HOP_BY_HOP_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove connection-scoped headers in place.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// The gateway's request pipeline.
#[derive(Debug)]
pub struct ProxyCore {
    /// Configuration for the proxy
    pub config: Arc<Config>,
    /// HTTP client for talking to origins
    pub client: reqwest::Client,
    /// Resolves the origin for each request
    pub router: Arc<dyn Router>,
    /// Filters applied to every request and response
    pub filters: Arc<RwLock<Vec<Arc<dyn Filter>>>>,
    timeout: Duration,
}

impl ProxyCore {
    /// Create a new proxy core with the given configuration and router.
    pub fn new(config: Arc<Config>, router: Arc<dyn Router>) -> Result<Self, ProxyError> {
        let timeout_secs: u64 = config.get_or_default("proxy.timeout", DEFAULT_TIMEOUT_SECS)?;
        let timeout = Duration::from_secs(timeout_secs);

        // Redirects go back to the client so their Location can be rewritten.
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ProxyError::ClientError)?;

        Ok(Self {
            config,
            client,
            router,
            filters: Arc::new(RwLock::new(Vec::new())),
            timeout,
        })
    }

    /// Add a filter to the end of the pipeline.
    pub async fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.filters.write().await.push(filter);
    }

    /// Forward a request to its origin and run the response back through
    /// the filters.
    pub async fn process_request(
        &self,
        mut request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let overall_start = Instant::now();

        /* ---------- routing (before any connection) ---------- */
        let route = self.router.route(&request).await?;

        /* ---------- PRE-filters ---------- */
        let filters = self.filters.read().await.clone();
        for f in &filters {
            if f.filter_type().is_pre() {
                request = f.pre_filter(request).await?;
            }
        }

        /* ---------- build outbound req ---------- */
        let url = route.url(request.query.as_deref());
        let outbound_body = mem::replace(&mut request.body, reqwest::Body::from(""));

        debug_fmt!("Core", "Forwarding {} {} -> {}", request.method, request.path, url);

        let builder = self
            .client
            .request(request.method.clone().into(), &url)
            .headers(request.headers.clone())
            .body(outbound_body);

        /* ---------- send with timeout ---------- */
        let upstream_start = Instant::now();
        let resp = timeout(self.timeout, builder.send())
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))?
            .map_err(|e| {
                if e.is_connect() {
                    ProxyError::OriginUnreachable {
                        origin: route.origin.clone(),
                        source: e,
                    }
                } else {
                    ProxyError::ClientError(e)
                }
            })?;
        let upstream_elapsed = upstream_start.elapsed();

        let status = resp.status().as_u16();
        if status == 404 {
            // the body is dropped unread along with the connection
            warn_fmt!("Core", "Origin returned 404 for {}", url);
            return Err(ProxyError::OriginNotFound(url));
        }

        /* ---------- wrap streaming response ---------- */
        let mut headers = resp.headers().clone();
        strip_hop_by_hop_headers(&mut headers);
        let body = reqwest::Body::wrap_stream(resp.bytes_stream());

        let mut proxy_resp = ProxyResponse {
            status,
            headers,
            body,
            context: Arc::new(RwLock::new(ResponseContext {
                receive_time: Some(Instant::now()),
                rewrite_chain: None,
            })),
        };

        /* ---------- POST-filters ---------- */
        for f in &filters {
            if f.filter_type().is_post() {
                proxy_resp = f.post_filter(request.clone(), proxy_resp).await?;
            }
        }

        /* ---------- timing log ---------- */
        let overall_elapsed = overall_start.elapsed();
        let internal_elapsed = overall_elapsed.saturating_sub(upstream_elapsed);

        log::debug!(
            "[timing] {} {} -> {} | total={:?} upstream={:?} internal={:?}",
            request.method,
            request.path,
            proxy_resp.status,
            overall_elapsed,
            upstream_elapsed,
            internal_elapsed
        );

        Ok(proxy_resp)
    }
}

/// Describes when a filter should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Filter applied before the request is sent to the origin
    Pre,
    /// Filter applied after the response is received from the origin
    Post,
    /// Filter applied both before and after
    Both,
}

impl FilterType {
    /// Returns true if this is a pre-filter or both.
    pub fn is_pre(&self) -> bool {
        matches!(self, FilterType::Pre | FilterType::Both)
    }

    /// Returns true if this is a post-filter or both.
    pub fn is_post(&self) -> bool {
        matches!(self, FilterType::Post | FilterType::Both)
    }
}

/// A filter that processes requests and responses.
#[async_trait::async_trait]
pub trait Filter: fmt::Debug + Send + Sync {
    /// Get the filter type.
    fn filter_type(&self) -> FilterType;

    /// Get the filter name.
    fn name(&self) -> &str;

    /// Process a request before it is sent to the origin.
    async fn pre_filter(&self, request: ProxyRequest) -> Result<ProxyRequest, ProxyError> {
        Ok(request)
    }

    /// Process a response after it is received from the origin.
    async fn post_filter(
        &self,
        _request: ProxyRequest,
        response: ProxyResponse,
    ) -> Result<ProxyResponse, ProxyError> {
        Ok(response)
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Origin authority taken from the request, e.g. `example.com:8080`
    pub origin: String,
    /// `http://{origin}`
    pub target_base_url: String,
    /// Path forwarded to the origin, always starting with `/`
    pub forward_path: String,
}

impl Route {
    /// Full origin URL, query string appended verbatim.
    pub fn url(&self, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.target_base_url, self.forward_path, q),
            _ => format!("{}{}", self.target_base_url, self.forward_path),
        }
    }
}

/// Resolves the origin a request should be forwarded to.
#[async_trait::async_trait]
pub trait Router: fmt::Debug + Send + Sync {
    /// Find the route for the given request.
    async fn route(&self, request: &ProxyRequest) -> Result<Route, ProxyError>;
}
