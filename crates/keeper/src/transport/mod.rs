// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP control API for the embedding host.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::coordinator::RefreshCoordinator;

/// Shared state behind every handler.
pub struct AppState {
    pub coordinator: Arc<RefreshCoordinator>,
    /// Bearer token required on everything but health. `None` disables auth.
    pub auth_token: Option<String>,
}

/// Build the axum `Router` with all control routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/certificate", get(http::certificate))
        .route("/api/v1/refresh", post(http::refresh))
        .route("/api/v1/session", post(http::new_session))
        // Lifecycle
        .route("/api/v1/stop", post(http::stop))
        .route("/api/v1/start", post(http::start))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
