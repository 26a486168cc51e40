// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access logging with a per-request trace id.

use hyper::header::{HeaderName, HeaderValue, USER_AGENT};
use hyper::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::logging::config::LoggingConfig;
use crate::logging::is_structured_logging;
use crate::logging::structured::{RequestInfo, generate_trace_id};

/// Logs request receipt and completion, tagging both with a trace id.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    config: Arc<LoggingConfig>,
    trace_header: HeaderName,
}

impl LoggingMiddleware {
    pub fn new(config: LoggingConfig) -> Self {
        let trace_header = HeaderName::from_bytes(config.trace_id_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-trace-id"));
        Self {
            config: Arc::new(config),
            trace_header,
        }
    }

    /// Describe and log an incoming request.
    pub fn process<B>(&self, req: &Request<B>, remote_addr: Option<SocketAddr>) -> RequestInfo {
        let remote_addr = remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let propagated = self
            .config
            .propagate_trace_id
            .then(|| req.headers().get(&self.trace_header))
            .flatten()
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let info = RequestInfo {
            trace_id: propagated.unwrap_or_else(generate_trace_id),
            ..RequestInfo::new(
                req.method().to_string(),
                req.uri().path().to_string(),
                remote_addr,
                user_agent,
            )
        };

        if is_structured_logging() {
            slog::info!(slog_scope::logger(), "Request received";
                "trace_id" => &info.trace_id,
                "method" => &info.method,
                "path" => &info.path,
                "remote_addr" => &info.remote_addr,
                "user_agent" => &info.user_agent
            );
        } else {
            log::info!(
                "Request received: {} {} from {} (trace_id: {})",
                info.method,
                info.path,
                info.remote_addr,
                info.trace_id
            );
        }

        info
    }

    /// Log completion and, if configured, echo the trace id on the response.
    pub fn finish<B>(&self, response: &mut Response<B>, info: &RequestInfo) {
        let status = response.status().as_u16();
        let elapsed_ms = info.elapsed_ms();

        if is_structured_logging() {
            slog::info!(slog_scope::logger(), "Response completed";
                "trace_id" => &info.trace_id,
                "method" => &info.method,
                "path" => &info.path,
                "status" => status,
                "elapsed_ms" => elapsed_ms as u64
            );
        } else {
            log::info!(
                "[timing] {} {} -> {} | total={}ms (trace_id: {})",
                info.method,
                info.path,
                status,
                elapsed_ms,
                info.trace_id
            );
        }

        if self.config.include_trace_id {
            if let Ok(value) = HeaderValue::from_str(&info.trace_id) {
                response.headers_mut().insert(self.trace_header.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;

    fn request_with(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().method(Method::GET).uri("/origin.example/page");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_process_describes_request() {
        let middleware = LoggingMiddleware::new(LoggingConfig::default());
        let req = request_with(&[("user-agent", "curl/8.0")]);
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();

        let info = middleware.process(&req, Some(addr));

        assert_eq!(info.method, "GET");
        assert_eq!(info.path, "/origin.example/page");
        assert_eq!(info.remote_addr, "10.0.0.1:4000");
        assert_eq!(info.user_agent, "curl/8.0");
        assert_eq!(info.trace_id.len(), 36);
    }

    #[test]
    fn test_trace_id_propagation() {
        let middleware = LoggingMiddleware::new(LoggingConfig::default());
        let req = request_with(&[("x-trace-id", "abc-123")]);
        assert_eq!(middleware.process(&req, None).trace_id, "abc-123");

        let empty = request_with(&[("x-trace-id", "")]);
        assert_ne!(middleware.process(&empty, None).trace_id, "");
    }

    #[test]
    fn test_trace_id_not_propagated_when_disabled() {
        let config = LoggingConfig {
            propagate_trace_id: false,
            ..LoggingConfig::default()
        };
        let middleware = LoggingMiddleware::new(config);
        let req = request_with(&[("x-trace-id", "abc-123")]);

        let info = middleware.process(&req, None);
        assert_ne!(info.trace_id, "abc-123");
        assert_eq!(info.remote_addr, "unknown");
        assert_eq!(info.user_agent, "unknown");
    }

    #[test]
    fn test_finish_echoes_trace_id() {
        let middleware = LoggingMiddleware::new(LoggingConfig::default());
        let info = middleware.process(&request_with(&[("x-trace-id", "t-1")]), None);
        let mut response = Response::builder().status(200).body(()).unwrap();

        middleware.finish(&mut response, &info);
        assert_eq!(response.headers().get("x-trace-id").unwrap(), "t-1");
    }

    #[test]
    fn test_finish_without_trace_header() {
        let config = LoggingConfig {
            include_trace_id: false,
            trace_id_header: "not a header".to_string(),
            ..LoggingConfig::default()
        };
        let middleware = LoggingMiddleware::new(config);
        let info = middleware.process(&request_with(&[]), None);
        let mut response = Response::builder().status(404).body(()).unwrap();

        middleware.finish(&mut response, &info);
        assert!(response.headers().is_empty());
    }
}
