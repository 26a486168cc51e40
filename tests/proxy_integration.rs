// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests: a real client, the gateway, and a mock origin.

use replacer::rewrite::RuleSet;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{TestConfigProvider, client, start_gateway};

#[tokio::test]
async fn test_html_body_is_rewritten() {
    let origin = MockServer::start().await;
    let page = format!(
        "<a href=\"http://{0}/news\">news</a>{1}<img src=\"http://{0}/logo.png\">",
        origin.address(),
        "filler ".repeat(4000)
    );
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page.clone(), "text/html; charset=utf-8"))
        .mount(&origin)
        .await;

    let rules = RuleSet::from_pairs([(format!("http://{}", origin.address()), "https://cdn.example.com".to_string())]);
    let gateway = start_gateway(rules, TestConfigProvider::new()).await.unwrap();

    let response = client()
        .get(gateway.url(&format!("/{}/index.html", origin.address())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    let expected = page.replace(&format!("http://{}", origin.address()), "https://cdn.example.com");
    assert_eq!(body, expected);

    gateway.stop().await;
}

#[tokio::test]
async fn test_binary_body_is_untouched() {
    let origin = MockServer::start().await;
    let image: Vec<u8> = b"\x89PNG\r\n\x1a\nfoo foo foo"
        .iter()
        .copied()
        .chain((0..=255u8).cycle().take(20_000))
        .collect();
    Mock::given(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(image.clone(), "image/png"))
        .mount(&origin)
        .await;

    let gateway = start_gateway(RuleSet::from_pairs([("foo", "bar")]), TestConfigProvider::new())
        .await
        .unwrap();

    let response = client()
        .get(gateway.url(&format!("/{}/logo.png", origin.address())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(response.bytes().await.unwrap().as_ref(), image.as_slice());

    gateway.stop().await;
}

#[tokio::test]
async fn test_redirect_location_is_rewritten() {
    let origin = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "http://origin.example.com/new")
                .insert_header("content-type", "image/gif"),
        )
        .mount(&origin)
        .await;

    let rules = RuleSet::from_pairs([("http://origin.example.com", "https://proxy.example.com/origin.example.com")]);
    let gateway = start_gateway(rules, TestConfigProvider::new()).await.unwrap();

    let response = client()
        .get(gateway.url(&format!("/{}/old", origin.address())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://proxy.example.com/origin.example.com/new"
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_rules_apply_in_sequence() {
    let origin = MockServer::start().await;
    Mock::given(path("/chain"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("foo bar", "text/plain"))
        .mount(&origin)
        .await;

    let provider = TestConfigProvider::new().with_value("rewrite.content_types", json!(["text/plain"]));
    let gateway = start_gateway(RuleSet::from_pairs([("foo", "bar"), ("bar", "baz")]), provider)
        .await
        .unwrap();

    let body = client()
        .get(gateway.url(&format!("/{}/chain", origin.address())))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "baz baz");

    gateway.stop().await;
}

#[tokio::test]
async fn test_query_and_headers_forwarded() {
    let origin = MockServer::start().await;
    Mock::given(path("/search"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&origin)
        .await;

    let gateway = start_gateway(RuleSet::new(), TestConfigProvider::new()).await.unwrap();

    let response = client()
        .get(gateway.url(&format!("/{}/search?q=rust", origin.address())))
        .header("accept-language", "nl")
        .header("cookie", "session=1")
        .header("authorization", "Bearer secret")
        .header("x-custom", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = origin.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let headers = &received[0].headers;
    assert_eq!(headers.get("accept-language").unwrap(), "nl");
    assert_eq!(headers.get("cookie").unwrap(), "session=1");
    assert!(headers.get("authorization").is_none());
    assert!(headers.get("x-custom").is_none());

    gateway.stop().await;
}

#[tokio::test]
async fn test_origin_404_is_404() {
    let origin = MockServer::start().await;
    let gateway = start_gateway(RuleSet::new(), TestConfigProvider::new()).await.unwrap();

    let response = client()
        .get(gateway.url(&format!("/{}/missing", origin.address())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    gateway.stop().await;
}

#[tokio::test]
async fn test_unreachable_origin_is_404() {
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let gateway = start_gateway(RuleSet::new(), TestConfigProvider::new()).await.unwrap();

    let response = client()
        .get(gateway.url(&format!("/127.0.0.1:{port}/page")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    gateway.stop().await;
}

#[tokio::test]
async fn test_missing_origin_is_400() {
    let gateway = start_gateway(RuleSet::new(), TestConfigProvider::new()).await.unwrap();

    let response = client().get(gateway.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    gateway.stop().await;
}

#[tokio::test]
async fn test_post_body_is_forwarded() {
    let origin = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&origin)
        .await;

    let gateway = start_gateway(RuleSet::new(), TestConfigProvider::new()).await.unwrap();

    let response = client()
        .post(gateway.url(&format!("/{}/submit", origin.address())))
        .body("name=value")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let received = origin.received_requests().await.unwrap();
    assert_eq!(received[0].body, b"name=value");

    gateway.stop().await;
}
