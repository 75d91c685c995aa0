use fetch_shield_core::{Request, Transport, TransportErrorKind};
use fetch_shield_http::{AuthConfig, HttpTransport, HttpTransportConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(server: &MockServer) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig::new(server.uri())).unwrap()
}

#[tokio::test]
async fn test_success_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-served-by", "mock")
                .set_body_json(json!([{"id": 1, "text": "Foobar"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = transport_for(&server)
        .send(&Request::get("/messages").build())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("X-Served-By"), Some("mock"));
    let messages: serde_json::Value = response.json().unwrap();
    assert_eq!(messages[0]["text"], "Foobar");
}

#[tokio::test]
async fn test_non_success_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"msg": "some error happend"})))
        .mount(&server)
        .await;

    let error = transport_for(&server)
        .send(&Request::get("/messages").build())
        .await
        .unwrap_err();

    assert_eq!(error.kind, TransportErrorKind::Status { status: 500 });
    assert!(error.message.contains("some error happend"));
}

#[tokio::test]
async fn test_query_and_json_body_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(body_json(json!({"name": "demo"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::post("/items")
        .query("page", "2")
        .json(json!({"name": "demo"}))
        .build();
    let response = transport_for(&server).send(&request).await.unwrap();

    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let config = HttpTransportConfig::new(server.uri()).with_timeout(Duration::from_millis(50));
    let error = HttpTransport::new(config)
        .unwrap()
        .send(&Request::get("/slow").build())
        .await
        .unwrap_err();

    assert!(error.is_timeout());
}

#[tokio::test]
async fn test_per_request_timeout_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let request = Request::get("/slow").option("timeout_ms", json!(50)).build();
    let error = transport_for(&server).send(&request).await.unwrap_err();

    assert!(error.is_timeout());
}

#[tokio::test]
async fn test_refused_connection_is_a_connect_error() {
    let transport =
        HttpTransport::new(HttpTransportConfig::new("http://127.0.0.1:1")).unwrap();

    let error = transport
        .send(&Request::get("/messages").build())
        .await
        .unwrap_err();

    assert_eq!(error.kind, TransportErrorKind::Connect);
}

#[tokio::test]
async fn test_auth_and_headers_are_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer secret"))
        .and(header("x-default", "yes"))
        .and(header("x-per-request", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpTransportConfig::new(server.uri())
        .with_auth(AuthConfig::BearerToken("secret".to_string()))
        .with_header("x-default", "yes");
    let request = Request::get("/ping")
        .option("headers", json!({"x-per-request": "1"}))
        .build();

    let response = HttpTransport::new(config)
        .unwrap()
        .send(&request)
        .await
        .unwrap();

    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn test_basic_auth_is_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpTransportConfig::new(server.uri()).with_auth(AuthConfig::Basic {
        username: "user".to_string(),
        password: Some("pass".to_string()),
    });
    let response = HttpTransport::new(config)
        .unwrap()
        .send(&Request::get("/private").build())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}
