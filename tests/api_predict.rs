use std::path::Path;
use std::sync::Arc;

use agri_yield::api::{create_router, AppState};
use agri_yield::domain::{ModelKind, RequestSchema};
use agri_yield::graph::{agronomic_yield_model, identity_model, save_model};
use agri_yield::ml::{load_model, LoadOptions, MockPredictor};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn load(path: &Path, schema: RequestSchema, feature_dim: usize) -> AppState {
    let options = LoadOptions {
        schema,
        feature_dim,
        fallback_to_mock: true,
    };
    AppState::new(load_model(path, options), schema)
}

fn mock_state(schema: RequestSchema) -> AppState {
    AppState::new(Some(Arc::new(MockPredictor::new())), schema)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("failed to build json request"),
        None => builder
            .body(Body::empty())
            .expect("failed to build empty request"),
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let value = serde_json::from_slice(&bytes).expect("response is not json");
    (status, value)
}

async fn predict(app: &Router, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, "/predict", Some(&body.to_string())).await
}

fn example_record() -> Value {
    json!({
        "rainfall": 100.0,
        "temperature": 25.0,
        "humidity": 70.0,
        "soil_ph": 6.5,
        "fertilizer_usage": 50.0,
        "risk_score": 0.3
    })
}

#[tokio::test]
async fn root_reports_liveness() {
    let app = create_router(mock_state(RequestSchema::Features));
    let (status, body) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn agronomic_model_predicts_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working_agricultural_model.onnx");
    save_model(&agronomic_yield_model(), &path).unwrap();
    let app = create_router(load(&path, RequestSchema::Agronomic, 4));

    let (status, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["model_loaded"], true);
    assert_eq!(health["model_type"], "onnx");

    let (status, body) = predict(&app, example_record()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let rows = body["prediction"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let row = rows[0].as_array().unwrap();
    assert_eq!(row.len(), 1);
    // Sigmoid of a large positive weighted sum.
    let p = row[0].as_f64().unwrap();
    assert!(p > 0.99 && p <= 1.0);
}

#[tokio::test]
async fn agronomic_record_with_missing_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working_agricultural_model.onnx");
    save_model(&agronomic_yield_model(), &path).unwrap();
    let app = create_router(load(&path, RequestSchema::Agronomic, 4));

    let mut record = example_record();
    record.as_object_mut().unwrap().remove("risk_score");
    let (status, body) = predict(&app, record).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Prediction error: "));
}

#[tokio::test]
async fn identity_model_echoes_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agri_yield.onnx");
    save_model(&identity_model(4), &path).unwrap();
    let app = create_router(load(&path, RequestSchema::Features, 4));

    let (status, body) = predict(&app, json!({"features": [6.5, 0, 1, 2]})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["prediction"], json!([[6.5, 0.0, 1.0, 2.0]]));

    let (status, body) = predict(&app, json!({"features": [1, 2]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn missing_model_falls_back_to_mock() {
    let app = create_router(load(
        Path::new("/nonexistent/agri_yield.onnx"),
        RequestSchema::Features,
        4,
    ));

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["model_type"], "mock");

    let (status, body) = predict(&app, json!({"features": [6.5, 0, 1, 2]})).await;
    assert_eq!(status, StatusCode::OK);
    let p = body["prediction"][0][0].as_f64().unwrap();
    assert!((p - 0.21).abs() < 1e-4, "got {p}");
}

#[tokio::test]
async fn mock_rejects_short_feature_list() {
    let app = create_router(mock_state(RequestSchema::Features));
    let (status, body) = predict(&app, json!({"features": [6.5, 0]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let app = create_router(mock_state(RequestSchema::Features));

    for payload in [
        "not json",
        "{}",
        r#"{"features": []}"#,
        r#"{"features": ["a", "b"]}"#,
        r#"{"features": [1, 2, 3, 4], "extra": true}"#,
    ] {
        let (status, body) = send(&app, Method::POST, "/predict", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert!(!body["detail"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn no_model_is_server_error() {
    let app = create_router(AppState::new(None, RequestSchema::Agronomic));

    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["model_loaded"], false);
    assert!(health["model_type"].is_null());

    let (status, body) = predict(&app, example_record()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Model not loaded");
}

#[tokio::test]
async fn health_type_matches_handle() {
    let state = mock_state(RequestSchema::Agronomic);
    assert_eq!(state.model_kind(), Some(ModelKind::Mock));
    let app = create_router(state);
    let (_, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(health["model_type"], "mock");
}
