// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::core::{ProxyCore, ProxyError};
    use crate::router::OriginRouter;
    use crate::server::{ProxyServer, ServerConfig, status_for};
    use hyper::StatusCode;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Running {
        addr: SocketAddr,
        server: ProxyServer,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<Result<(), ProxyError>>,
    }

    async fn run_server() -> Running {
        let config = Arc::new(Config::builder().build());
        let core = Arc::new(ProxyCore::new(config, Arc::new(OriginRouter::new())).unwrap());
        let server = ProxyServer::new(ServerConfig::default(), core);
        let serving = server.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            serving
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await
        });

        Running {
            addr,
            server,
            stop,
            handle,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ProxyError::MalformedRequest("no origin".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ProxyError::OriginNotFound("http://x/".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ProxyError::Timeout(Duration::from_secs(30))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ProxyError::FilterError("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_config_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.health_port, 8081);
    }

    #[tokio::test]
    async fn test_serve_forwards_and_shuts_down() {
        let origin = MockServer::start().await;
        Mock::given(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&origin)
            .await;

        let running = run_server().await;
        let url = format!("http://{}/{}/hello", running.addr, origin.address());

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().contains_key("x-trace-id"));
        assert_eq!(response.text().await.unwrap(), "hi");

        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_trace_id_is_propagated() {
        let running = run_server().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{}/", running.addr))
            .header("x-trace-id", "trace-42")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        assert_eq!(response.headers().get("x-trace-id").unwrap(), "trace-42");
        let _ = running.stop.send(());
    }

    #[tokio::test]
    async fn test_closed_connections_are_forgotten() {
        let running = run_server().await;

        for _ in 0..5 {
            let response = reqwest::Client::new()
                .get(format!("http://{}/", running.addr))
                .header("connection", "close")
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400);
        }

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while running.server.open_connections().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "closed connections still registered");

        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();
    }
}
