// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP front end.
//!
//! A thin wrapper around **hyper-util**: it owns the listening socket,
//! converts between Hyper's types and [`ProxyRequest`] / [`ProxyResponse`],
//! and turns [`ProxyError`]s into status codes.
//!
//! `hyper_util::server::conn::auto::Builder` serves HTTP/1.1 *and* HTTP/2 on
//! the same connection.  Bodies are streamed in both directions.

mod health;
#[cfg(test)]
mod tests;

pub use health::HealthServer;

use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinSet;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::core::{HttpMethod, ProxyCore, ProxyError, ProxyRequest, ProxyResponse, RequestContext};
use crate::logging::config::LoggingConfig;
use crate::logging::log_error;
use crate::logging::middleware::LoggingMiddleware;

/// How long open connections get to finish after a shutdown signal.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port to listen on for health/readiness checks
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_health_port() -> u16 {
    8081
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            health_port: default_health_port(),
        }
    }
}

impl ServerConfig {
    fn socket_addr(&self, port: u16) -> Result<SocketAddr, ProxyError> {
        format!("{}:{}", self.host, port)
            .parse::<SocketAddr>()
            .map_err(|e| ProxyError::ConfigError(format!("invalid server address: {e}")))
    }
}

/// HTTP server for the gateway.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    core: Arc<ProxyCore>,
    logging: LoggingMiddleware,
    /// Shutdown senders for each open connection, keyed by connection number
    shutdown_senders: Arc<RwLock<HashMap<u64, oneshot::Sender<()>>>>,
    next_connection: Arc<AtomicU64>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, core: Arc<ProxyCore>) -> Self {
        Self {
            config,
            core,
            logging: LoggingMiddleware::new(LoggingConfig::default()),
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
            next_connection: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use `config` for access logging and trace ids.
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = LoggingMiddleware::new(config);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn core(&self) -> &Arc<ProxyCore> {
        &self.core
    }

    /// Connections that have not finished yet.
    pub async fn open_connections(&self) -> usize {
        self.shutdown_senders.read().await.len()
    }

    /// Bind both listeners and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let addr = self.config.socket_addr(self.config.port)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| log_error("Server", ProxyError::IoError(e)))?;
        info!("Replacer listening on http://{}", addr);

        let health_addr = self.config.socket_addr(self.config.health_port)?;
        let health_server = HealthServer::bind(health_addr)
            .await
            .map_err(|e| log_error("Server", ProxyError::IoError(e)))?;
        health_server.set_ready();

        // install SIGTERM before serving so an early signal isn't lost
        #[cfg(unix)]
        let mut term_stream = signal(SignalKind::terminate())
            .map_err(|e| ProxyError::Other(format!("cannot install SIGTERM handler: {e}")))?;

        let shutdown = async move {
            #[cfg(unix)]
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl-C; initiating graceful shutdown"),
                _ = term_stream.recv() => info!("Received SIGTERM; initiating graceful shutdown"),
            }
            #[cfg(not(unix))]
            {
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl-C; initiating graceful shutdown");
            }
        };

        let result = self.serve(listener, shutdown).await;
        drop(health_server);
        result
    }

    /// Serve connections from `listener` until `shutdown` resolves, then
    /// drain open connections for up to [`SHUTDOWN_DRAIN`].
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accept = listener.accept() => {
                    let (stream, remote_addr) = match accept {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let core = self.core.clone();
                    let logging = self.logging.clone();
                    let (tx, rx) = oneshot::channel();
                    let senders = shutdown_senders.clone();

                    // registered before the task exists so its removal can't run first
                    let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
                    shutdown_senders.write().await.insert(connection_id, tx);

                    join_set.spawn(async move {

                        let service = service_fn(move |req: Request<Incoming>| {
                            handle_request(req, core.clone(), logging.clone(), remote_addr)
                        });

                        let mut builder = AutoBuilder::new(TokioExecutor::new());
                        builder.http1();
                        builder.http2();
                        let connection = builder.serve_connection(TokioIo::new(stream), service);
                        let mut conn = std::pin::pin!(connection);

                        tokio::select! {
                            res = &mut conn => log_connection_result(res),
                            _ = rx => {
                                debug!("Connection received shutdown signal, waiting for graceful close");
                                conn.as_mut().graceful_shutdown();
                                log_connection_result(conn.await);
                            }
                        }

                        senders.write().await.remove(&connection_id);
                    });
                }
            }
        }

        info!("Shutting down; waiting for {} connection(s)", join_set.len());
        for (_, sender) in shutdown_senders.write().await.drain() {
            let _ = sender.send(());
        }

        let start = Instant::now();
        let drain = async {
            while let Some(res) = join_set.join_next().await {
                if let Err(e) = res {
                    if !e.is_cancelled() {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        };

        match tokio::time::timeout(SHUTDOWN_DRAIN, drain).await {
            Ok(()) => info!(
                "All connections drained gracefully in {:.1}s",
                start.elapsed().as_secs_f32()
            ),
            Err(_) => {
                warn!(
                    "Shutdown timed out after {} seconds, closing remaining connections",
                    SHUTDOWN_DRAIN.as_secs()
                );
                join_set.shutdown().await;
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn log_connection_result<E: std::fmt::Display>(res: Result<(), E>) {
    if let Err(e) = res {
        let msg = e.to_string();
        if !msg.contains("connection closed") && !msg.contains("connection reset") {
            error!("Connection error: {}", e);
        }
    }
}

/// Status code sent to the client for a failed request.
pub fn status_for(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        ProxyError::OriginNotFound(_) | ProxyError::OriginUnreachable { .. } => StatusCode::NOT_FOUND,
        ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProxyError::ClientError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode) -> Response<Body> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Body::from(reason));
    *response.status_mut() = status;
    response
}

/// Convert a hyper request to a proxy request.
fn convert_hyper_request(
    req: Request<Incoming>,
    client_ip: String,
    trace_id: String,
) -> ProxyRequest {
    let method = HttpMethod::from(req.method());
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);
    let headers = req.headers().clone();

    // no body: don't turn a plain GET into a chunked upload
    let body = if req.body().size_hint().exact() == Some(0) {
        Body::from("")
    } else {
        Body::wrap_stream(req.into_body().into_data_stream())
    };

    ProxyRequest {
        method,
        path,
        query,
        headers,
        body,
        context: Arc::new(RwLock::new(RequestContext {
            client_ip: Some(client_ip),
            start_time: Some(Instant::now()),
            trace_id: Some(trace_id),
        })),
    }
}

/// Convert a proxy response to a hyper response.
fn convert_proxy_response(resp: ProxyResponse) -> Result<Response<Body>, ProxyError> {
    let stream = resp.body.into_data_stream().map_err(|e| {
        // the client sees a truncated body; nothing else can be done
        error!("Error streaming response body: {}", e);
        std::io::Error::other(e)
    });

    let mut response = Response::builder()
        .status(resp.status)
        .body(Body::wrap_stream(stream))
        .map_err(|e| ProxyError::Other(format!("failed to build response: {e}")))?;
    *response.headers_mut() = resp.headers;
    Ok(response)
}

/// Handle one client request end to end.
async fn handle_request(
    req: Request<Incoming>,
    core: Arc<ProxyCore>,
    logging: LoggingMiddleware,
    remote_addr: SocketAddr,
) -> Result<Response<Body>, Infallible> {
    let info = logging.process(&req, Some(remote_addr));
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let proxy_req = convert_hyper_request(req, remote_addr.ip().to_string(), info.trace_id.clone());

    let mut response = match core.process_request(proxy_req).await {
        Ok(proxy_resp) => {
            debug!("Processed {} {} -> {}", method, path, proxy_resp.status);
            convert_proxy_response(proxy_resp).unwrap_or_else(|e| {
                error!("Failed to convert response for {} {}: {}", method, path, e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR)
            })
        }
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
                error!("{} {} failed: {}", method, path, e);
            } else {
                warn!("{} {} -> {}: {}", method, path, status.as_u16(), e);
            }
            error_response(status)
        }
    };

    logging.finish(&mut response, &info);
    Ok(response)
}
