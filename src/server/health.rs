// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Liveness and readiness endpoints on their own port.
//!
//! `GET /health` answers `OK` as soon as the listener is up; `GET /ready`
//! answers `READY` once the proxy listener is serving, `503` before that.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming as IncomingBody;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::{debug_fmt, info_fmt};

#[derive(Debug)]
pub struct HealthServer {
    is_ready: Arc<AtomicBool>,
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl HealthServer {
    /// Bind `addr` and start answering probes in the background.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info_fmt!("Health", "Health checks on http://{}", local_addr);

        let is_ready = Arc::new(AtomicBool::new(false));
        let ready = is_ready.clone();

        let handle = tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        debug_fmt!("Health", "Accept failed: {}", e);
                        continue;
                    }
                };

                let ready = ready.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<IncomingBody>| {
                        let is_ready = ready.load(Ordering::Relaxed);
                        async move { Ok::<_, Infallible>(probe(req.uri().path(), is_ready)) }
                    });

                    let builder = AutoBuilder::new(TokioExecutor::new());
                    if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
                        debug_fmt!("Health", "Connection error: {}", err);
                    }
                });
            }
        });

        Ok(Self {
            is_ready,
            local_addr,
            handle,
        })
    }

    pub fn set_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for HealthServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn probe(path: &str, ready: bool) -> Response<Full<Bytes>> {
    let (status, body) = match path {
        "/health" => (StatusCode::OK, "OK"),
        "/ready" if ready => (StatusCode::OK, "READY"),
        "/ready" => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
        _ => (StatusCode::NOT_FOUND, "Not Found"),
    };
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
