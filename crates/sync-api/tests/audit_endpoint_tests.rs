//! Audit endpoint integration tests

mod common;

use axum::http::StatusCode;
use common::{make_request, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_record_history_per_environment() {
    let app = TestApp::new();
    let id = app.create_system("billing").await;
    make_request(
        app.router(),
        "PUT",
        &format!("/systems/{id}"),
        Some(json!({ "systemname": "billing-v2" })),
        Some("alice"),
    )
    .await;
    make_request(
        app.router(),
        "POST",
        &format!("/systems/sync/{id}"),
        None,
        Some("bob"),
    )
    .await;

    let (status, body) = app
        .request("GET", &format!("/audit/systems/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["action"], "UPDATE");
    assert_eq!(rows[0]["changed_by"], "alice");
    assert_eq!(rows[0]["old_data"]["systemname"], "billing");
    assert_eq!(rows[0]["new_data"]["systemname"], "billing-v2");
    assert_eq!(rows[1]["action"], "INSERT");

    let (status, body) = app
        .request("GET", &format!("/audit/System/{id}?env=prod"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["action"], "SYNC");
    assert_eq!(rows[0]["changed_by"], "bob");
    assert_eq!(rows[0]["table_name"], "systems");
}

#[tokio::test]
async fn test_recent_audit_limit() {
    let app = TestApp::new();
    for name in ["a", "b", "c"] {
        app.create_system(name).await;
    }

    let (status, body) = app.request("GET", "/audit/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = app.request("GET", "/audit/?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = app.request("GET", "/audit/?env=prod", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_audit_bad_requests() {
    let app = TestApp::new();

    let (status, body) = app.request("GET", "/audit/widgets/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Unknown table: widgets");

    let (status, body) = app.request("GET", "/audit/?env=staging", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("staging"));

    let (status, _) = app.request("GET", "/audit/?limit=lots", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
