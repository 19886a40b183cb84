//! HTTP API for the Keygate activation service.
//!
//! One endpoint, `POST /api/v1/activate`, takes
//! `{"licenseCode": "...", "machineId": "..."}` and answers with a signed
//! `{"success", "message", "isTrial", "expiryDate", "signature"}` body.
//! Every answer is signed, including 400 and 405 responses.

pub mod config;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use keygate_license::{ActivationEngine, ActivationRequest, LicenseError, SignedResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Path of the activation endpoint.
pub const ACTIVATE_PATH: &str = "/api/v1/activate";

/// Path of the health probe.
pub const HEALTH_PATH: &str = "/api/v1/health";

const ALLOWED_METHODS: &str = "POST, OPTIONS";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    engine: Arc<ActivationEngine>,
}

async fn activate_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    // Oversized or unreadable bodies are answered here so they are signed too.
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(status = %rejection.status(), "rejecting unreadable body");
            let err = LicenseError::MalformedBody(format!(
                "unreadable request body: {}",
                rejection.body_text()
            ));
            return into_http(SignedResponse::from_error(&err, None, state.engine.signer()));
        }
    };
    let request = match ActivationRequest::from_json(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejecting unparseable body");
            return into_http(SignedResponse::from_error(&e, None, state.engine.signer()));
        }
    };

    let machine_id = request.machine_id.clone();
    let engine = Arc::clone(&state.engine);
    // The store is synchronous; keep it off the async workers.
    let signed = match tokio::task::spawn_blocking(move || engine.handle(&request)).await {
        Ok(signed) => signed,
        Err(e) => {
            error!(error = %e, "activation task failed");
            let err = LicenseError::Store(format!("activation task failed: {e}"));
            SignedResponse::from_error(&err, machine_id.as_deref(), state.engine.signer())
        }
    };
    into_http(signed)
}

async fn preflight_handler() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
        .into_response()
}

async fn method_not_allowed_handler(State(state): State<AppState>) -> Response {
    let mut response = into_http(SignedResponse::method_not_allowed(state.engine.signer()));
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn allow_any_origin(mut response: Response) -> Response {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn into_http(signed: SignedResponse) -> Response {
    let status = StatusCode::from_u16(signed.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(signed.body)).into_response()
}

/// Build the HTTP API router around an activation engine.
pub fn build_router(engine: ActivationEngine) -> Router {
    let state = AppState {
        engine: Arc::new(engine),
    };
    Router::new()
        .route(
            ACTIVATE_PATH,
            post(activate_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(HEALTH_PATH, get(health_handler))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}
