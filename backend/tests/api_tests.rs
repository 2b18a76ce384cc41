//! HTTP surface tests
//!
//! Sends requests through the full router, auth middleware included.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use bonded_inventory::create_app;
use bonded_inventory::middleware::auth::{permissions, Claims, ADMIN_ROLE};
use chrono::Utc;
use common::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

fn token(company_code: &str, role: &str, permissions: &[&str]) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: "user-1".to_string(),
        company_code: company_code.to_string(),
        role: role.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

fn admin_token() -> String {
    token(COMPANY, ADMIN_ROLE, &[])
}

fn app() -> (Router, std::sync::Arc<ScriptedGateway>) {
    let gateway = ScriptedGateway::new();
    (create_app(app_state(memory_store(), gateway.clone())), gateway)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, token, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn incoming_body(wms_id: &str, quantity: &str) -> Value {
    json!({
        "wms_id": wms_id,
        "document_date": "2026-03-02",
        "customs_document": { "code": "BC23", "number": "000123", "date": "2026-03-02" },
        "items": [{
            "item_code": "RM-01",
            "item_type": "raw_material",
            "item_name": "Resin",
            "uom": "KGM",
            "quantity": quantity
        }]
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = app();
    let (status, body) = send_json(&app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let (app, _) = app();

    let (status, body) = send_json(&app, "GET", "/api/v1/transmissions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["code"], "UNAUTHORIZED");

    let (status, _) = send_json(&app, "GET", "/api/v1/transmissions", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_record_and_fetch_document() {
    let (app, _) = app();
    let token = admin_token();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&token),
        Some(incoming_body("GRN-1", "12.345")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["transmission"]["status"], "PENDING");
    assert_eq!(body["data"]["document"]["items"][0]["quantity"], "12.35");

    let id = body["data"]["document"]["id"].as_str().unwrap().to_string();
    let (status, body) = send_json(&app, "GET", &format!("/api/v1/documents/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["wms_id"], "GRN-1");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&token),
        Some(incoming_body("GRN-1", "1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0]["code"], "DUPLICATE_ENTRY");
}

#[tokio::test]
async fn test_validation_errors_name_the_field() {
    let (app, _) = app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&admin_token()),
        Some(incoming_body("GRN-1", "0")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["field"], "items[0].quantity");
    assert_eq!(body["errors"][0]["code"], "positive");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let (app, _) = app();
    let reader = token(COMPANY, "operator", &[permissions::DOCUMENT_READ]);

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&reader),
        Some(incoming_body("GRN-1", "1")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errors"][0]["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_batch_envelope_reports_partial_failure() {
    let (app, gateway) = app();
    let token = admin_token();

    let mut ids = Vec::new();
    for wms_id in ["GRN-A", "GRN-C"] {
        let (_, body) = send_json(
            &app,
            "POST",
            "/api/v1/documents/incoming",
            Some(&token),
            Some(incoming_body(wms_id, "1")),
        )
        .await;
        ids.push(body["data"]["transmission"]["id"].as_str().unwrap().to_string());
    }

    gateway.fail_for("GRN-C");
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/transmissions/batch",
        Some(&token),
        Some(json!({ "record_ids": ids })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial");
    assert_eq!(body["data"]["summary"]["success_count"], 1);
    assert_eq!(body["data"]["summary"]["failed_count"], 1);
    assert_eq!(body["errors"][0]["field"], ids[1]);
    assert_eq!(body["errors"][0]["code"], "TRANSMISSION_FAILED");

    let (status, body) = send_json(
        &app,
        "GET",
        "/api/v1/transmissions?status=FAILED",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["retry_count"], 1);
}

#[tokio::test]
async fn test_opname_lifecycle_over_http() {
    let (app, _) = app();
    let token = admin_token();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/opnames",
        Some(&token),
        Some(json!({
            "wms_id": "OP-1",
            "document_date": "2026-03-31",
            "items": [{
                "item_code": "RM-01",
                "item_type": "raw_material",
                "item_name": "Resin",
                "uom": "KGM",
                "physical_qty": "2.5"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "ACTIVE");
    assert_eq!(body["data"]["items"][0]["adjustment_type"], "GAIN");

    let (status, body) = send_json(&app, "POST", "/api/v1/opnames/OP-1/confirm", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["adjustments"].as_array().unwrap().len(), 1);

    let (status, body) = send_json(&app, "POST", "/api/v1/opnames/OP-1/cancel", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errors"][0]["code"], "INVALID_STATE_TRANSITION");

    let (status, body) = send_json(&app, "GET", "/api/v1/opnames?status=CONFIRMED", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["wms_id"], "OP-1");
}

#[tokio::test]
async fn test_mutation_report_as_csv() {
    let (app, _) = app();
    let token = admin_token();
    send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&token),
        Some(incoming_body("GRN-1", "4")),
    )
    .await;

    let (status, bytes) = send(
        &app,
        "GET",
        "/api/v1/reports/mutation?from=2026-03-01&to=2026-03-31&format=csv",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    assert!(csv.starts_with("item_type,item_code"));
    assert!(csv.contains("raw_material,RM-01,Resin,KGM,0,4,0,0,4"));

    let (status, body) = send_json(
        &app,
        "GET",
        "/api/v1/reports/mutation?from=2026-03-31&to=2026-03-01",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn test_malformed_requests_use_the_failure_envelope() {
    let (app, gateway) = app();
    let token = admin_token();

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/transmissions/batch",
        Some(&token),
        Some(json!({ "record_ids": ["not-a-uuid"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["field"], "body");
    assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    assert!(gateway.calls().is_empty());

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/opnames",
        Some(&token),
        Some(json!({
            "wms_id": "OP-1",
            "document_date": "31-01-2026",
            "items": [{
                "item_code": "RM-01",
                "item_type": "raw_material",
                "item_name": "Resin",
                "uom": "KGM",
                "physical_qty": "1"
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["field"], "body");

    let (status, body) = send_json(&app, "GET", "/api/v1/documents/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["field"], "path");

    let (status, body) = send_json(
        &app,
        "GET",
        "/api/v1/reports/mutation?from=yesterday&to=2026-03-31",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["field"], "query");
}

#[tokio::test]
async fn test_quantity_finer_than_storage_is_rejected() {
    let (app, _) = app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/documents/incoming",
        Some(&admin_token()),
        Some(incoming_body("GRN-1", "1.0000001")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "items[0].quantity");
    assert_eq!(body["errors"][0]["code"], "scale");
}
