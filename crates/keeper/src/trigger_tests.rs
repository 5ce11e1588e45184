// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{PeriodicTrigger, Timer, TokioTimer, MIN_PERIOD};
use crate::features::{ConnectionFeatures, NatType};
use crate::queue::OperationQueue;
use crate::store::CertificateStore;
use crate::test_support::{
    context, expired_certificate, fast_intervals, store_with_keys, wait_until, ManualTimer,
    MockIssuer,
};

#[tokio::test(start_paused = true)]
async fn tokio_timer_fires_immediately_then_periodically() {
    let count = Arc::new(AtomicU32::new(0));
    let handle = {
        let count = Arc::clone(&count);
        TokioTimer.schedule(
            Instant::now(),
            Duration::from_secs(120),
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(240)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tick_enqueues_background_check_with_stored_features() -> anyhow::Result<()> {
    let store = store_with_keys();
    let features = ConnectionFeatures { nat_type: NatType::Moderate, ..Default::default() };
    store.store(expired_certificate(), Some(features.clone()))?;
    let issuer = Arc::new(MockIssuer::new());
    let queue = OperationQueue::new();
    queue.open(context(store.clone(), issuer.clone(), fast_intervals()));

    let timer = Arc::new(ManualTimer::new());
    let trigger = PeriodicTrigger::new(timer.clone(), Duration::from_secs(120));
    let handle = trigger.arm(queue.clone(), store.clone());
    assert_eq!(timer.last_period(), Some(Duration::from_secs(120)));

    assert_eq!(timer.fire(), 1);
    assert!(wait_until(Duration::from_secs(2), || issuer.refresh_calls() == 1).await);
    assert_eq!(issuer.last_features(), Some(features));

    // Certificate is now fresh; another tick checks but does not refresh.
    timer.fire();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(issuer.refresh_calls(), 1);

    drop(handle);
    assert_eq!(timer.fire(), 0);
    queue.close().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_period_is_clamped() {
    let timer = Arc::new(ManualTimer::new());
    let trigger = PeriodicTrigger::new(timer.clone(), Duration::ZERO);
    let _handle = trigger.arm(OperationQueue::new(), store_with_keys());
    assert_eq!(timer.last_period(), Some(MIN_PERIOD));

    let count = Arc::new(AtomicU32::new(0));
    let handle = {
        let count = Arc::clone(&count);
        TokioTimer.schedule(
            Instant::now(),
            Duration::ZERO,
            Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(count.load(Ordering::SeqCst) > 1);
    drop(handle);
}
