// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the control API.

use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::coordinator::CoordinatorState;
use crate::error::{ErrorBody, ErrorResponse, RefreshOutcome};
use crate::features::ConnectionFeatures;
use crate::operation::RefreshRequest;
use crate::session::Session;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: CoordinatorState,
    pub has_certificate: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateResponse {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_for_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<ConnectionFeatures>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    #[serde(default)]
    pub features: Option<ConnectionFeatures>,
    #[serde(default = "default_true")]
    pub user_initiated: bool,
    #[serde(default)]
    pub forced: bool,
}

impl Default for RefreshBody {
    fn default() -> Self {
        Self { features: None, user_initiated: true, forced: false }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub state: CoordinatorState,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: s.coordinator.state(),
        has_certificate: s.coordinator.store().stored_certificate().is_some(),
    })
}

/// `GET /api/v1/certificate`
pub async fn certificate(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let store = s.coordinator.store();
    let Some(cert) = store.stored_certificate() else {
        return Json(CertificateResponse {
            present: false,
            refresh_in_secs: None,
            valid_for_secs: None,
            features: None,
        });
    };
    let now = SystemTime::now();
    let secs_until = |t: SystemTime| t.duration_since(now).unwrap_or_default().as_secs();
    Json(CertificateResponse {
        present: true,
        refresh_in_secs: Some(secs_until(cert.refresh_time)),
        valid_for_secs: Some(secs_until(cert.valid_until)),
        features: store.stored_features(),
    })
}

/// `POST /api/v1/refresh`: body optional.
pub async fn refresh(State(s): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: RefreshBody = match parse_optional(&body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let request = RefreshRequest {
        features: body.features,
        user_initiated: body.user_initiated,
        forced: body.forced,
    };
    outcome_response(&s, s.coordinator.request_refresh(request).await, || {
        Json(RefreshResponse { refreshed: true }).into_response()
    })
}

/// `POST /api/v1/session`: start a forked session and force a refresh.
pub async fn new_session(
    State(s): State<Arc<AppState>>,
    Json(session): Json<Session>,
) -> Response {
    outcome_response(&s, s.coordinator.new_session(session).await, || {
        Json(SessionResponse { session: true }).into_response()
    })
}

/// `POST /api/v1/stop`: cancel all refreshes.
pub async fn stop(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    s.coordinator.stop().await;
    Json(LifecycleResponse { state: s.coordinator.state() })
}

/// `POST /api/v1/start`: resume periodic refreshes.
pub async fn start(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    s.coordinator.start().await;
    Json(LifecycleResponse { state: s.coordinator.state() })
}

// -- Helpers ------------------------------------------------------------------

fn outcome_response(
    s: &AppState,
    outcome: RefreshOutcome,
    ok: impl FnOnce() -> Response,
) -> Response {
    match outcome {
        Ok(()) => ok(),
        Err(e) => e.to_http_response(s.coordinator.intervals().default_backoff).into_response(),
    }
}

/// Parse a JSON body, treating an empty body as the type's default.
fn parse_optional<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        let body = ErrorResponse { error: ErrorBody::plain("BAD_REQUEST", e.to_string()) };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    })
}
