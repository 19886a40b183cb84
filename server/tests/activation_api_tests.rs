use chrono::Utc;
use keygate_db::SqliteStore;
use keygate_license::{
    ActivationEngine, ActivationResponse, LicenseStore, MemoryStore, NewLicense, ResponseSigner,
    ResponseVerifier, TrialPolicy,
};
use keygate_server::{build_router, HealthResponse, ACTIVATE_PATH, HEALTH_PATH};
use serde_json::json;
use std::sync::Arc;

const TEST_SEED: [u8; 32] = [7; 32];

fn test_engine(store: Arc<dyn LicenseStore>) -> (ActivationEngine, ResponseVerifier) {
    let signer = ResponseSigner::from_seed(&TEST_SEED);
    let verifier = signer.verifier().unwrap();
    (
        ActivationEngine::new(store, signer, TrialPolicy::default()),
        verifier,
    )
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_server(engine: ActivationEngine) -> String {
    let app = build_router(engine);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

/// Server over a memory store seeded with `ABC123` and `TRIAL-XYZ`.
async fn spawn_test_server() -> (String, ResponseVerifier) {
    let store = Arc::new(MemoryStore::new());
    store.insert(NewLicense::permanent("ABC123")).unwrap();
    store.insert(NewLicense::permanent("TRIAL-XYZ")).unwrap();
    let (engine, verifier) = test_engine(store);
    (spawn_server(engine).await, verifier)
}

async fn post_activate(
    base: &str,
    body: serde_json::Value,
) -> (reqwest::StatusCode, ActivationResponse) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, ACTIVATE_PATH))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn activate_verify_and_reject_other_device() {
    let (base, verifier) = spawn_test_server().await;

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    assert!(body.success);
    assert!(!body.is_trial);
    assert_eq!(body.expiry_date, None);
    verifier.verify_response(&body, Some("M1")).unwrap();

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    assert_eq!(body.message, "License verified");

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M2"})).await;
    assert_eq!(status, 403);
    assert!(!body.success);
    verifier.verify_response(&body, Some("M2")).unwrap();
}

#[tokio::test]
async fn trial_activation_reports_expiry() {
    let (base, verifier) = spawn_test_server().await;
    let before = Utc::now();

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "TRIAL-XYZ", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    assert!(body.is_trial);
    verifier.verify_response(&body, Some("M1")).unwrap();

    let expiry = chrono::DateTime::parse_from_rfc3339(body.expiry_date.as_deref().unwrap())
        .unwrap()
        .with_timezone(&Utc);
    let after = Utc::now();
    // Millisecond truncation in the wire format.
    assert!(expiry >= before + chrono::Duration::minutes(10) - chrono::Duration::milliseconds(1));
    assert!(expiry <= after + chrono::Duration::minutes(10));

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "TRIAL-XYZ", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    assert!(body.message.starts_with("Trial active"));
}

#[tokio::test]
async fn unknown_code_is_signed_404() {
    let (base, verifier) = spawn_test_server().await;
    let (status, body) =
        post_activate(&base, json!({"licenseCode": "NOPE", "machineId": "M1"})).await;
    assert_eq!(status, 404);
    assert!(body.signature.is_some());
    verifier.verify_response(&body, Some("M1")).unwrap();
}

#[tokio::test]
async fn missing_fields_return_400() {
    let (base, verifier) = spawn_test_server().await;
    let (status, body) = post_activate(&base, json!({"licenseCode": "ABC123"})).await;
    assert_eq!(status, 400);
    assert!(!body.success);
    verifier.verify_response(&body, None).unwrap();

    let (status, _) = post_activate(&base, json!({"licenseCode": "", "machineId": "M1"})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn malformed_body_returns_signed_400() {
    let (base, verifier) = spawn_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, ACTIVATE_PATH))
        .header("content-type", "application/json")
        .body("{licenseCode:")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ActivationResponse = resp.json().await.unwrap();
    assert!(!body.success);
    verifier.verify_response(&body, None).unwrap();
}

#[tokio::test]
async fn oversized_body_returns_signed_400() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let store = Arc::new(MemoryStore::new());
    store.insert(NewLicense::permanent("ABC123")).unwrap();
    let (engine, verifier) = test_engine(store);
    let router = build_router(engine);

    // Past axum's default 2 MiB body limit.
    let padding = "x".repeat(3 * 1024 * 1024);
    let payload = json!({"licenseCode": "ABC123", "machineId": "M1", "padding": padding});
    let req = Request::builder()
        .method("POST")
        .uri(ACTIVATE_PATH)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: ActivationResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(!body.success);
    assert!(body.message.starts_with("unreadable request body"));
    verifier.verify_response(&body, None).unwrap();
}

#[tokio::test]
async fn get_returns_signed_405() {
    let (base, verifier) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}{}", base, ACTIVATE_PATH))
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers().get("allow").unwrap(), "POST, OPTIONS");
    let body: ActivationResponse = resp.json().await.unwrap();
    assert!(!body.success);
    verifier.verify_response(&body, None).unwrap();
}

#[tokio::test]
async fn preflight_returns_204_with_cors_headers() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}{}", base, ACTIVATE_PATH))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let headers = resp.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, OPTIONS"
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type"
    );
}

#[tokio::test]
async fn post_response_allows_any_origin() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, ACTIVATE_PATH))
        .json(&json!({"licenseCode": "ABC123", "machineId": "M1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.contains("application/json"));
}

#[tokio::test]
async fn store_failure_is_generic_500() {
    // Never migrated, so every query fails.
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (engine, verifier) = test_engine(store);
    let base = spawn_server(engine).await;

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M1"})).await;
    assert_eq!(status, 500);
    assert_eq!(body.message, "Internal server error");
    verifier.verify_response(&body, Some("M1")).unwrap();
}

#[tokio::test]
async fn unsigned_when_no_key_configured() {
    let store = Arc::new(MemoryStore::new());
    store.insert(NewLicense::permanent("ABC123")).unwrap();
    let engine = ActivationEngine::new(store, ResponseSigner::disabled(), TrialPolicy::default());
    let base = spawn_server(engine).await;

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    assert!(body.success);
    assert_eq!(body.signature, None);
}

#[tokio::test]
async fn sqlite_backed_server_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("licenses.db");
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    store.migrate().unwrap();
    store.insert(&NewLicense::permanent("ABC123")).unwrap();
    let (engine, verifier) = test_engine(store.clone());
    let base = spawn_server(engine).await;

    let (status, body) =
        post_activate(&base, json!({"licenseCode": "ABC123", "machineId": "M1"})).await;
    assert_eq!(status, 200);
    verifier.verify_response(&body, Some("M1")).unwrap();

    let record = store.get("ABC123").unwrap().unwrap();
    assert!(record.is_bound_to("M1"));
}

#[tokio::test]
async fn health_endpoint() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}{}", base, HEALTH_PATH))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: HealthResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "ok");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/v1/nonexistent", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
