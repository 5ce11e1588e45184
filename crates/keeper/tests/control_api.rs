// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the control API, exercising the coordinator
//! in-process via `axum_test::TestServer`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use certkeeper::classify::{ErrorClassifier, RemoteError};
use certkeeper::config::RefreshIntervals;
use certkeeper::coordinator::{CoordinatorState, RefreshCoordinator};
use certkeeper::store::{CertificateStore, MemoryStore};
use certkeeper::test_support::{
    certificate_refreshing_in, store_with_keys, ManualTimer, MockIssuer,
};
use certkeeper::transport::http::{
    CertificateResponse, HealthResponse, LifecycleResponse, RefreshResponse, SessionResponse,
};
use certkeeper::transport::{build_router, AppState};

struct Harness {
    server: axum_test::TestServer,
    store: Arc<MemoryStore>,
    issuer: Arc<MockIssuer>,
    coordinator: Arc<RefreshCoordinator>,
}

async fn harness(auth_token: Option<&str>) -> anyhow::Result<Harness> {
    let store = store_with_keys();
    let issuer = Arc::new(MockIssuer::new());
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        issuer.clone(),
        ErrorClassifier::default(),
        RefreshIntervals::default(),
        Arc::new(ManualTimer::new()),
    ));
    coordinator.start().await;
    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        auth_token: auth_token.map(str::to_owned),
    });
    let server =
        axum_test::TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(Harness { server, store, issuer, coordinator })
}

#[tokio::test]
async fn health_reports_state_without_auth() -> anyhow::Result<()> {
    let h = harness(Some("secret")).await?;

    let resp = h.server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let health: HealthResponse = resp.json();
    assert_eq!(health.status, CoordinatorState::Running);
    assert!(!health.has_certificate);
    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthorized() -> anyhow::Result<()> {
    let h = harness(Some("secret")).await?;

    let resp = h.server.get("/api/v1/certificate").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = h.server.get("/api/v1/certificate").authorization_bearer("secret").await;
    resp.assert_status(StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_with_empty_body_fetches_certificate() -> anyhow::Result<()> {
    let h = harness(None).await?;

    let resp = h.server.post("/api/v1/refresh").await;
    resp.assert_status(StatusCode::OK);
    let refreshed: RefreshResponse = resp.json();
    assert!(refreshed.refreshed);
    assert_eq!(h.issuer.refresh_calls(), 1);

    let cert: CertificateResponse = h.server.get("/api/v1/certificate").await.json();
    assert!(cert.present);
    assert!(cert.refresh_in_secs.is_some_and(|s| s > 0));
    Ok(())
}

#[tokio::test]
async fn refresh_records_requested_features() -> anyhow::Result<()> {
    let h = harness(None).await?;

    let resp = h
        .server
        .post("/api/v1/refresh")
        .json(&serde_json::json!({ "features": { "netshield": "malware", "safe_mode": true } }))
        .await;
    resp.assert_status(StatusCode::OK);

    let features = h.store.stored_features();
    assert_eq!(features.and_then(|f| f.safe_mode), Some(true));
    Ok(())
}

#[tokio::test]
async fn refresh_failure_uses_error_envelope() -> anyhow::Result<()> {
    let h = harness(None).await?;
    h.issuer.push_refresh(Err(
        RemoteError::api(429, None, "slow down").with_retry_after(Some(Duration::from_secs(7)))
    ));

    let resp = h.server.post("/api/v1/refresh").json(&serde_json::json!({ "forced": true })).await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "TOO_MANY_REQUESTS");
    assert_eq!(body["error"]["retry_after_secs"], 7);
    assert_eq!(body["error"]["recovery"], "back_off");
    Ok(())
}

#[tokio::test]
async fn rate_limit_without_retry_after_reports_default_backoff() -> anyhow::Result<()> {
    let h = harness(None).await?;
    h.issuer.push_refresh(Err(RemoteError::api(429, None, "slow down")));

    let resp = h.server.post("/api/v1/refresh").json(&serde_json::json!({ "forced": true })).await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = resp.json();
    let default_backoff = h.coordinator.intervals().default_backoff.as_secs();
    assert_eq!(body["error"]["retry_after_secs"], default_backoff);
    assert_eq!(body["error"]["recovery"], "back_off");
    Ok(())
}

#[tokio::test]
async fn malformed_refresh_body_is_bad_request() -> anyhow::Result<()> {
    let h = harness(None).await?;

    let resp = h.server.post("/api/v1/refresh").text("{not json").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(h.issuer.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn session_forces_refresh() -> anyhow::Result<()> {
    let h = harness(None).await?;
    h.store.store(certificate_refreshing_in(Duration::from_secs(3600)), None)?;

    let resp = h
        .server
        .post("/api/v1/session")
        .json(&serde_json::json!({ "selector": "sel", "cookie": "c=1" }))
        .await;
    resp.assert_status(StatusCode::OK);
    let session: SessionResponse = resp.json();
    assert!(session.session);
    assert_eq!(h.issuer.session_calls(), 1);
    assert_eq!(h.issuer.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_then_refresh_is_cancelled_until_started() -> anyhow::Result<()> {
    let h = harness(None).await?;

    let stopped: LifecycleResponse = h.server.post("/api/v1/stop").await.json();
    assert_eq!(stopped.state, CoordinatorState::Stopped);

    let resp = h.server.post("/api/v1/refresh").await;
    resp.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "CANCELLED");

    let started: LifecycleResponse = h.server.post("/api/v1/start").await.json();
    assert_eq!(started.state, CoordinatorState::Running);
    h.server.post("/api/v1/refresh").await.assert_status(StatusCode::OK);

    h.coordinator.stop().await;
    Ok(())
}
