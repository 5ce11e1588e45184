// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;

use super::HttpIssuer;
use crate::features::{ConnectionFeatures, NetShieldLevel};
use crate::issuer::Issuer;
use crate::session::Session;

#[derive(Default)]
struct Seen {
    fork_selector: Option<String>,
    fork_cookie: Option<String>,
    cert_uid: Option<String>,
    cert_auth: Option<String>,
    cert_body: Option<serde_json::Value>,
}

#[derive(Clone, Default)]
struct Fake {
    seen: Arc<Mutex<Seen>>,
    /// When set, the certificate endpoint answers with this status and body.
    fail: Option<(StatusCode, serde_json::Value, Option<&'static str>)>,
}

async fn fork(
    State(fake): State<Fake>,
    Path(selector): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    {
        let mut seen = fake.seen.lock();
        seen.fork_selector = Some(selector.clone());
        seen.fork_cookie = headers.get("cookie").and_then(|v| v.to_str().ok()).map(str::to_owned);
    }
    Json(serde_json::json!({
        "Code": 1000,
        "UID": format!("uid-{selector}"),
        "AccessToken": "access-token",
    }))
}

async fn certificate(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    {
        let mut seen = fake.seen.lock();
        seen.cert_uid = headers.get("x-pm-uid").and_then(|v| v.to_str().ok()).map(str::to_owned);
        seen.cert_auth =
            headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
        seen.cert_body = Some(body);
    }
    match fake.fail {
        Some((status, body, retry_after)) => {
            let mut resp = (status, Json(body)).into_response();
            if let Some(secs) = retry_after {
                resp.headers_mut().insert("retry-after", axum::http::HeaderValue::from_static(secs));
            }
            resp
        }
        None => Json(serde_json::json!({
            "Code": 1000,
            "Certificate": "-----BEGIN CERTIFICATE-----",
            "ExpirationTime": 1_900_000_000u64,
            "RefreshTime": 1_899_990_000u64,
        }))
        .into_response(),
    }
}

async fn serve(fake: Fake) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/auth/v4/sessions/forks/{selector}", get(fork))
        .route("/vpn/v1/certificate", post(certificate))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn session() -> Session {
    Session { selector: "abc".to_owned(), cookie: Some("Session-Id=xyz".to_owned()) }
}

#[tokio::test]
async fn refresh_without_session_is_unauthorized() -> anyhow::Result<()> {
    let base = serve(Fake::default()).await?;
    let issuer = HttpIssuer::new(base, None)?;

    let result = issuer.refresh_certificate(b"key", None).await;

    assert!(
        matches!(&result, Err(e) if e.status == Some(401)),
        "expected local 401, got {result:?}"
    );
    Ok(())
}

#[tokio::test]
async fn fork_then_refresh() -> anyhow::Result<()> {
    let fake = Fake::default();
    let base = serve(fake.clone()).await?;
    let issuer = HttpIssuer::new(format!("{base}/"), Some("30 minutes".to_owned()))?;
    let features = ConnectionFeatures { netshield: NetShieldLevel::Malware, ..Default::default() };

    issuer.start_session(&session()).await?;
    assert!(issuer.has_session());
    let cert = issuer.refresh_certificate(b"key", Some(&features)).await?;

    assert_eq!(cert.certificate, b"-----BEGIN CERTIFICATE-----".to_vec());
    assert_eq!(cert.valid_until, UNIX_EPOCH + Duration::from_secs(1_900_000_000));
    assert_eq!(cert.refresh_time, UNIX_EPOCH + Duration::from_secs(1_899_990_000));

    let seen = fake.seen.lock();
    assert_eq!(seen.fork_cookie.as_deref(), Some("Session-Id=xyz"));
    assert_eq!(seen.cert_uid.as_deref(), Some("uid-abc"));
    assert_eq!(seen.cert_auth.as_deref(), Some("Bearer access-token"));
    let body = seen.cert_body.clone().unwrap_or_default();
    assert_eq!(body["ClientPublicKey"], "a2V5");
    assert_eq!(body["ClientPublicKeyMode"], "EC");
    assert_eq!(body["Mode"], "session");
    assert_eq!(body["Duration"], "30 minutes");
    assert_eq!(body["Features"]["NetShieldLevel"], 1);
    Ok(())
}

#[tokio::test]
async fn fork_selector_is_a_single_path_segment() -> anyhow::Result<()> {
    let fake = Fake::default();
    let base = serve(fake.clone()).await?;
    let issuer = HttpIssuer::new(base, None)?;
    let session = Session { selector: "a/b?c=1#d".to_owned(), cookie: None };

    issuer.start_session(&session).await?;

    let seen = fake.seen.lock();
    assert_eq!(seen.fork_selector.as_deref(), Some("a/b?c=1#d"));
    assert!(seen.fork_cookie.is_none());
    Ok(())
}

#[tokio::test]
async fn api_error_carries_code_message_and_retry_after() -> anyhow::Result<()> {
    let fake = Fake {
        fail: Some((
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({ "Code": 2028, "Error": "slow down" }),
            Some("42"),
        )),
        ..Fake::default()
    };
    let base = serve(fake).await?;
    let issuer = HttpIssuer::new(base, None)?;
    issuer.start_session(&session()).await?;

    let result = issuer.refresh_certificate(b"key", None).await;

    let err = match result {
        Err(e) => e,
        Ok(cert) => anyhow::bail!("expected error, got {cert:?}"),
    };
    assert_eq!(err.status, Some(429));
    assert_eq!(err.code, Some(2028));
    assert_eq!(err.message, "slow down");
    assert_eq!(err.retry_after, Some(Duration::from_secs(42)));
    Ok(())
}

#[tokio::test]
async fn unreachable_issuer_is_transport_error() -> anyhow::Result<()> {
    let issuer = HttpIssuer::new("http://127.0.0.1:9", None)?;

    let result = issuer.start_session(&session()).await;

    assert!(matches!(&result, Err(e) if e.status.is_none()), "got {result:?}");
    Ok(())
}
