// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: scripted issuer and fixtures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::classify::{ErrorClassifier, RemoteError};
use crate::config::RefreshIntervals;
use crate::features::ConnectionFeatures;
use crate::issuer::{Issuer, IssuerFuture};
use crate::operation::OperationContext;
use crate::serializer::RefreshSerializer;
use crate::session::Session;
use crate::store::{CertificateStore, MemoryStore, StoredCertificate, StoredKeyPair};
use crate::trigger::{TickFn, Timer, TimerHandle};

/// Certificate whose refresh time is `refresh_in` from now.
pub fn certificate_refreshing_in(refresh_in: Duration) -> StoredCertificate {
    let refresh_time = SystemTime::now() + refresh_in;
    StoredCertificate {
        certificate: b"test-certificate".to_vec(),
        valid_until: refresh_time + Duration::from_secs(3600),
        refresh_time,
    }
}

/// Certificate that is already due for refresh.
pub fn expired_certificate() -> StoredCertificate {
    let now = SystemTime::now();
    StoredCertificate {
        certificate: b"old-certificate".to_vec(),
        valid_until: now - Duration::from_secs(60),
        refresh_time: now - Duration::from_secs(600),
    }
}

pub fn test_keys() -> StoredKeyPair {
    StoredKeyPair { public_key: b"public-der".to_vec(), private_key: b"private".to_vec() }
}

/// Memory store pre-seeded with [`test_keys`].
pub fn store_with_keys() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_keys(test_keys()))
}

/// Intervals with a short wait timeout so contention tests finish quickly.
pub fn fast_intervals() -> RefreshIntervals {
    RefreshIntervals { wait_timeout: Duration::from_millis(200), ..RefreshIntervals::default() }
}

/// Operation context over the given collaborators with the default catalogue.
pub fn context(
    store: Arc<dyn CertificateStore>,
    issuer: Arc<dyn Issuer>,
    intervals: RefreshIntervals,
) -> Arc<OperationContext> {
    Arc::new(OperationContext {
        store,
        issuer,
        classifier: ErrorClassifier::default(),
        serializer: RefreshSerializer::new(),
        intervals,
    })
}

/// Scripted [`Issuer`] that records calls and concurrency.
///
/// Refresh calls pop scripted results in order and fall back to a fresh
/// certificate once the script is exhausted.
pub struct MockIssuer {
    refresh_script: Mutex<VecDeque<Result<StoredCertificate, RemoteError>>>,
    session_script: Mutex<VecDeque<Result<(), RemoteError>>>,
    /// When set, each refresh call waits for one permit before answering.
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
    refresh_calls: AtomicU32,
    session_calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    last_features: Mutex<Option<ConnectionFeatures>>,
    sessions: Mutex<Vec<Session>>,
}

impl Default for MockIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIssuer {
    pub fn new() -> Self {
        Self {
            refresh_script: Mutex::new(VecDeque::new()),
            session_script: Mutex::new(VecDeque::new()),
            gate: None,
            delay: Duration::ZERO,
            refresh_calls: AtomicU32::new(0),
            session_calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            last_features: Mutex::new(None),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Hold every refresh call until a permit is added to `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_refresh(&self, result: Result<StoredCertificate, RemoteError>) {
        self.refresh_script.lock().push_back(result);
    }

    pub fn push_session(&self, result: Result<(), RemoteError>) {
        self.session_script.lock().push_back(result);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> u32 {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent refresh calls observed.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_features(&self) -> Option<ConnectionFeatures> {
        self.last_features.lock().clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().clone()
    }
}

impl Issuer for MockIssuer {
    fn refresh_certificate<'a>(
        &'a self,
        _public_key: &'a [u8],
        features: Option<&'a ConnectionFeatures>,
    ) -> IssuerFuture<'a, StoredCertificate> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            *self.last_features.lock() = features.cloned();

            if let Some(ref gate) = self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let scripted = self.refresh_script.lock().pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            scripted.unwrap_or_else(|| Ok(certificate_refreshing_in(Duration::from_secs(3600))))
        })
    }

    fn start_session<'a>(&'a self, session: &'a Session) -> IssuerFuture<'a, ()> {
        Box::pin(async move {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            self.sessions.lock().push(session.clone());
            self.session_script.lock().pop_front().unwrap_or(Ok(()))
        })
    }
}

struct Schedule {
    cancel: CancellationToken,
    every: Duration,
    on_tick: TickFn,
}

/// [`Timer`] that only ticks when told to.
#[derive(Default)]
pub struct ManualTimer {
    schedules: Mutex<Vec<Schedule>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick every live schedule once. Returns how many fired.
    pub fn fire(&self) -> usize {
        let schedules = self.schedules.lock();
        let mut fired = 0;
        for schedule in schedules.iter().filter(|s| !s.cancel.is_cancelled()) {
            (schedule.on_tick)();
            fired += 1;
        }
        fired
    }

    /// Number of schedules not yet cancelled.
    pub fn live(&self) -> usize {
        self.schedules.lock().iter().filter(|s| !s.cancel.is_cancelled()).count()
    }

    /// Period of the most recent schedule.
    pub fn last_period(&self) -> Option<Duration> {
        self.schedules.lock().last().map(|s| s.every)
    }
}

impl Timer for ManualTimer {
    fn schedule(
        &self,
        _first_fire_at: tokio::time::Instant,
        every: Duration,
        on_tick: TickFn,
    ) -> TimerHandle {
        let cancel = CancellationToken::new();
        self.schedules.lock().push(Schedule { cancel: cancel.clone(), every, on_tick });
        TimerHandle::new(cancel)
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
