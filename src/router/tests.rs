// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod router_tests {
    use crate::core::RequestContext;
    use crate::router::OriginRouter;
    use crate::{HttpMethod, ProxyError, ProxyRequest, Router};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn create_test_request(path: &str, query: Option<&str>) -> ProxyRequest {
        ProxyRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            query: query.map(|q| q.to_string()),
            headers: reqwest::header::HeaderMap::new(),
            body: reqwest::Body::from(""),
            context: Arc::new(RwLock::new(RequestContext::default())),
        }
    }

    fn assert_malformed(path: &str) {
        match OriginRouter::resolve(path) {
            Err(ProxyError::MalformedRequest(_)) => {}
            other => panic!("expected MalformedRequest for {path:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_first_segment_is_origin() {
        let route = OriginRouter::resolve("/seattletimes.nwsource.com/news/index.html").unwrap();
        assert_eq!(route.origin, "seattletimes.nwsource.com");
        assert_eq!(route.target_base_url, "http://seattletimes.nwsource.com");
        assert_eq!(route.forward_path, "/news/index.html");
    }

    #[test]
    fn test_bare_origin_forwards_root() {
        let route = OriginRouter::resolve("/example.com").unwrap();
        assert_eq!(route.forward_path, "/");
        assert_eq!(route.url(None), "http://example.com/");

        let route = OriginRouter::resolve("/example.com/").unwrap();
        assert_eq!(route.forward_path, "/");
    }

    #[test]
    fn test_rest_of_path_is_verbatim() {
        let route = OriginRouter::resolve("/example.com/a//b/%7Euser/x.css").unwrap();
        assert_eq!(route.forward_path, "/a//b/%7Euser/x.css");
    }

    #[test]
    fn test_origin_with_port() {
        let route = OriginRouter::resolve("/127.0.0.1:8080/health").unwrap();
        assert_eq!(route.origin, "127.0.0.1:8080");
        assert_eq!(route.url(Some("a=1")), "http://127.0.0.1:8080/health?a=1");
    }

    #[test]
    fn test_missing_origin_is_malformed() {
        assert_malformed("/");
        assert_malformed("");
        assert_malformed("//example.com/a");
    }

    #[test]
    fn test_invalid_origin_is_malformed() {
        assert_malformed("/user:pass@example.com/a");
        assert_malformed("/exa mple.com/a");
        assert_malformed("/example.com:notaport/a");
    }

    #[tokio::test]
    async fn test_router_trait() {
        let router = OriginRouter::new();
        let request = create_test_request("/cdn.example.net/img/logo.png", Some("w=100"));

        let route = router.route(&request).await.unwrap();
        assert_eq!(route.url(request.query.as_deref()), "http://cdn.example.net/img/logo.png?w=100");

        let bad = create_test_request("/", None);
        assert!(matches!(
            router.route(&bad).await,
            Err(ProxyError::MalformedRequest(_))
        ));
    }
}
