// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certkeeper: keeps a client certificate fresh against a remote issuer.

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod features;
pub mod issuer;
pub mod operation;
pub mod queue;
pub mod serializer;
pub mod session;
pub mod staleness;
pub mod store;
pub mod test_support;
pub mod transport;
pub mod trigger;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::classify::{ClassificationTable, ErrorClassifier};
use crate::config::KeeperConfig;
use crate::coordinator::RefreshCoordinator;
use crate::issuer::HttpIssuer;
use crate::store::FileStore;
use crate::transport::{build_router, AppState};
use crate::trigger::TokioTimer;

/// Run the daemon until ctrl-c.
pub async fn run(config: KeeperConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);

    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;
    let store = Arc::new(FileStore::new(state_dir.clone()));

    let table = match config.classification_table {
        Some(ref path) => ClassificationTable::load(path)?,
        None => ClassificationTable::default(),
    };
    let issuer =
        Arc::new(HttpIssuer::new(&config.issuer_url, config.certificate_duration.clone())?);

    let coordinator = Arc::new(RefreshCoordinator::new(
        store,
        issuer,
        ErrorClassifier::new(table),
        config.intervals(),
        Arc::new(TokioTimer),
    ));
    let state = Arc::new(AppState {
        coordinator: Arc::clone(&coordinator),
        auth_token: config.auth_token.clone(),
    });

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        state_dir = %state_dir.display(),
        issuer = %config.issuer_url,
        "certkeeper listening on {addr}"
    );
    coordinator.start().await;

    let shutdown = CancellationToken::new();
    {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(err = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!("shutting down");
            coordinator.stop().await;
            shutdown.cancel();
        });
    }

    let router = build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    // Stop again in case the server ended on its own.
    coordinator.stop().await;
    Ok(())
}
