//! Onboarding endpoint integration tests
//!
//! Schema/table discovery runs against a stub introspector; metadata
//! generation is proxied to a wiremock server.

mod common;

use axum::http::StatusCode;
use common::{StubIntrospector, TestApp};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_list_schemas_and_tables() {
    let app = TestApp::new();
    let systemid = app.create_system("warehouse").await;
    let categoryid = app.create_category(systemid).await;

    let (status, body) = app
        .request(
            "POST",
            "/db/list_schemas/",
            Some(json!({ "categoryid": categoryid })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["public", "sales"]));

    let (status, body) = app
        .request(
            "POST",
            "/db/list_tables/",
            Some(json!({ "categoryid": categoryid, "schema": "sales" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["customers", "orders"]));

    // Credentials came from the stored category
    assert_eq!(
        *app.introspector.seen_hosts.lock(),
        vec!["dw.internal".to_string(), "dw.internal".to_string()]
    );
}

#[tokio::test]
async fn test_discovery_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .request("POST", "/db/list_schemas/", Some(json!({ "categoryid": 77 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Category not found in dev");

    let (status, _) = app
        .request(
            "POST",
            "/db/list_tables/",
            Some(json!({ "categoryid": 1, "schema": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Category without credentials
    let systemid = app.create_system("crm").await;
    let (_, category) = app
        .request(
            "POST",
            "/categories/",
            Some(json!({ "categoryname": "empty", "systemid": systemid })),
        )
        .await;
    let (status, body) = app
        .request(
            "POST",
            "/db/list_schemas/",
            Some(json!({ "categoryid": category["categoryid"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("has no database credentials"));
}

#[tokio::test]
async fn test_unsupported_source_type() {
    let app = TestApp::new();
    let systemid = app.create_system("legacy").await;
    let (_, category) = app
        .request(
            "POST",
            "/categories/",
            Some(json!({
                "categoryname": "td",
                "systemid": systemid,
                "db_type": "teradata",
                "db_creds": { "database": "d", "user": "u", "host": "td", "port": 1025 }
            })),
        )
        .await;

    let (status, body) = app
        .request(
            "POST",
            "/db/list_schemas/",
            Some(json!({ "categoryid": category["categoryid"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("not supported for schema discovery"));
}

#[tokio::test]
async fn test_source_failure_is_bad_gateway() {
    let app = TestApp::with_introspector(StubIntrospector {
        fail: true,
        ..Default::default()
    });
    let systemid = app.create_system("warehouse").await;
    let categoryid = app.create_category(systemid).await;

    let (status, body) = app
        .request(
            "POST",
            "/db/list_schemas/",
            Some(json!({ "categoryid": categoryid })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["detail"], "connection refused");
}

#[tokio::test]
async fn test_generate_metadata_proxies_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate_metadata"))
        .and(body_partial_json(json!({
            "categoryid": 1,
            "db_type": "postgres",
            "schema": "sales",
            "table": "orders",
            "db_creds": { "password": "hunter2" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "table": "orders",
            "columns": [{ "name": "id", "description": "Order identifier" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new().with_metadata_service(server.uri());
    let systemid = app.create_system("warehouse").await;
    let categoryid = app.create_category(systemid).await;
    assert_eq!(categoryid, 1);

    let (status, body) = app
        .request(
            "POST",
            "/db/generate_metadata/",
            Some(json!({ "categoryid": categoryid, "schema": "sales", "table": "orders" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"][0]["name"], "id");
}

#[tokio::test]
async fn test_generate_metadata_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate_metadata"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model unavailable"))
        .mount(&server)
        .await;

    let app = TestApp::new().with_metadata_service(server.uri());
    let systemid = app.create_system("warehouse").await;
    let categoryid = app.create_category(systemid).await;

    let (status, body) = app
        .request(
            "POST",
            "/db/generate_metadata/",
            Some(json!({ "categoryid": categoryid, "schema": "sales", "table": "orders" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("500"));
    assert!(detail.contains("model unavailable"));
}

#[tokio::test]
async fn test_generate_metadata_not_configured() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            "POST",
            "/db/generate_metadata/",
            Some(json!({ "categoryid": 1, "schema": "sales", "table": "orders" })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("METADATA_SERVICE_URL"));
}
