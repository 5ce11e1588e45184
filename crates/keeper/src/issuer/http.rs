// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issuer over the VPN API.

use std::sync::Once;
use std::time::{Duration, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, COOKIE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::debug;

use super::{Issuer, IssuerFuture};
use crate::classify::RemoteError;
use crate::features::ConnectionFeatures;
use crate::session::Session;
use crate::store::StoredCertificate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Clone)]
struct ApiSession {
    uid: String,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ForkResponse {
    #[serde(rename = "UID")]
    uid: String,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CertificateResponse {
    certificate: String,
    expiration_time: u64,
    refresh_time: u64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    code: Option<i64>,
    error: Option<String>,
}

/// Talks to `{base_url}/auth/v4/...` and `{base_url}/vpn/v1/...`.
pub struct HttpIssuer {
    base_url: String,
    device_name: String,
    duration: Option<String>,
    client: Client,
    session: Mutex<Option<ApiSession>>,
}

impl HttpIssuer {
    pub fn new(base_url: impl Into<String>, duration: Option<String>) -> anyhow::Result<Self> {
        ensure_crypto_provider();
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let device_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "certkeeper".to_owned());
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            device_name,
            duration,
            client,
            session: Mutex::new(None),
        })
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base_url}/auth/v4/sessions/forks/{selector}` with the selector as one
    /// escaped path segment.
    fn fork_url(&self, selector: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::transport(format!("invalid issuer url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::transport("issuer url cannot carry a path"))?
            .pop_if_empty()
            .extend(["auth", "v4", "sessions", "forks", selector]);
        Ok(url)
    }

    fn apply_session(req: RequestBuilder, session: &ApiSession) -> RequestBuilder {
        req.header("x-pm-uid", &session.uid).bearer_auth(&session.access_token)
    }

    async fn fork(&self, session: &Session) -> Result<(), RemoteError> {
        let mut req = self.client.get(self.fork_url(&session.selector)?);
        if let Some(ref cookie) = session.cookie {
            req = req.header(COOKIE, cookie);
        }
        let resp = req.send().await.map_err(transport_error)?;
        let resp = check_status(resp).await?;
        let fork: ForkResponse = resp.json().await.map_err(transport_error)?;
        debug!(uid = %fork.uid, "forked API session");
        *self.session.lock() = Some(ApiSession { uid: fork.uid, access_token: fork.access_token });
        Ok(())
    }

    async fn certificate(
        &self,
        public_key: &[u8],
        features: Option<&ConnectionFeatures>,
    ) -> Result<StoredCertificate, RemoteError> {
        let session = self.session.lock().clone();
        let Some(session) = session else {
            return Err(RemoteError::api(401, None, "no API session"));
        };

        let mut body = serde_json::json!({
            "ClientPublicKey": BASE64.encode(public_key),
            "ClientPublicKeyMode": "EC",
            "DeviceName": self.device_name,
            "Mode": "session",
        });
        if let Some(features) = features {
            body["Features"] = features.to_request_json();
        }
        if let Some(ref duration) = self.duration {
            body["Duration"] = duration.clone().into();
        }

        let req = self.client.post(self.url("/vpn/v1/certificate")).json(&body);
        let resp = Self::apply_session(req, &session).send().await.map_err(transport_error)?;
        let resp = check_status(resp).await?;
        let cert: CertificateResponse = resp.json().await.map_err(transport_error)?;
        Ok(StoredCertificate {
            certificate: cert.certificate.into_bytes(),
            valid_until: UNIX_EPOCH + Duration::from_secs(cert.expiration_time),
            refresh_time: UNIX_EPOCH + Duration::from_secs(cert.refresh_time),
        })
    }
}

impl Issuer for HttpIssuer {
    fn refresh_certificate<'a>(
        &'a self,
        public_key: &'a [u8],
        features: Option<&'a ConnectionFeatures>,
    ) -> IssuerFuture<'a, StoredCertificate> {
        Box::pin(self.certificate(public_key, features))
    }

    fn start_session<'a>(&'a self, session: &'a Session) -> IssuerFuture<'a, ()> {
        Box::pin(self.fork(session))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::transport(e.to_string())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pass 2xx responses through; turn anything else into a [`RemoteError`].
async fn check_status(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = retry_after(resp.headers());
    let text = resp.text().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.error.unwrap_or(text);
    Err(RemoteError::api(status.as_u16(), body.code, message).with_retry_after(retry_after))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
