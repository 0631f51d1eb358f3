//! The per-instance state machine (§4.C) — the core of this crate.

mod monitor;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::lifecycle::LifecycleState;
use crate::provider::{ProviderAdapter, ProviderResult};

/// Interval between reconciliation ticks (§4.C, not configurable).
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle window when `sleep_after = 0` in config.
pub const DEFAULT_SLEEP_AFTER: Duration = Duration::from_secs(20 * 60);

/// Capacity of the bounded intent channel (§3).
const INTENT_CHANNEL_CAPACITY: usize = 5;

/// The idle policy derived from a route's configured `sleep_after` (§6).
#[derive(Debug, Clone, Copy)]
pub enum SleepAfter {
    /// Self-sleep after this much idle time.
    After(Duration),
    /// `sleep_after < 0`: start-on-request is disabled and the instance is
    /// never auto-stopped by the idle reaper either — its lifecycle is
    /// considered externally managed.
    Disabled,
}

impl SleepAfter {
    /// Builds a [`SleepAfter`] from the raw `sleep_after` config value.
    ///
    /// `> 0` seconds, `0` means the 20 minute default, `< 0` is the
    /// start-on-request-disabled sentinel.
    pub fn from_config_seconds(seconds: i64) -> Self {
        match seconds.cmp(&0) {
            std::cmp::Ordering::Greater => SleepAfter::After(Duration::from_secs(seconds as u64)),
            std::cmp::Ordering::Less => SleepAfter::Disabled,
            std::cmp::Ordering::Equal => SleepAfter::After(DEFAULT_SLEEP_AFTER),
        }
    }

    /// `true` when a request against a `NotRun` instance should enqueue a start intent.
    pub fn start_on_request_allowed(self) -> bool {
        !matches!(self, SleepAfter::Disabled)
    }
}

#[derive(Debug, Default)]
struct InstanceState {
    status: Option<LifecycleState>,
    address: String,
    last_access: Option<Instant>,
    last_error: Option<String>,
    start_request: Option<DateTime<Utc>>,
    http_healthy: bool,
}

impl InstanceState {
    fn status(&self) -> LifecycleState {
        self.status.expect("instance state initialized before any reader observes it")
    }

    /// Clears the fields that only make sense during a Running epoch (I1-I4).
    fn clear_running_epoch(&mut self) {
        self.address.clear();
        self.last_access = None;
        self.last_error = None;
        self.start_request = None;
        self.http_healthy = false;
    }
}

/// A snapshot of everything a request handler needs to know about an instance.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub status: LifecycleState,
    pub address: String,
    pub last_error: Option<String>,
    pub start_request: Option<DateTime<Utc>>,
    pub http_healthy: bool,
}

/// One managed backend: its provider, idle policy, and live state.
///
/// `provider`, `sleep_after`, and `key` are immutable for the instance's
/// lifetime. Everything else lives behind `state` and is written exclusively
/// by the monitor task while it owns a Running epoch (I5).
pub struct ComputeInstance {
    provider: Arc<dyn ProviderAdapter>,
    sleep_after: SleepAfter,
    key: String,
    state: RwLock<InstanceState>,
    intent_tx: mpsc::Sender<LifecycleState>,
    intent_rx: Mutex<Option<mpsc::Receiver<LifecycleState>>>,
    halt_tx: Mutex<Option<oneshot::Sender<()>>>,
    halt_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ComputeInstance {
    /// Queries the provider for its initial status. Any error here is fatal
    /// at startup (§4.C).
    pub async fn new(provider: Arc<dyn ProviderAdapter>, sleep_after: SleepAfter) -> ProviderResult<Arc<Self>> {
        let key = provider.key();
        let status = provider.status().await?;

        let mut state = InstanceState {
            status: Some(status),
            ..Default::default()
        };

        if status == LifecycleState::Running {
            state.address = provider.address().await?;
            state.last_access = Some(Instant::now());
            state.http_healthy = true;
        }

        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        let (halt_tx, halt_rx) = oneshot::channel();

        Ok(Arc::new(Self {
            provider,
            sleep_after,
            key,
            state: RwLock::new(state),
            intent_tx,
            intent_rx: Mutex::new(Some(intent_rx)),
            halt_tx: Mutex::new(Some(halt_tx)),
            halt_rx: Mutex::new(Some(halt_rx)),
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn describe(&self) -> String {
        self.provider.describe()
    }

    pub fn sleep_after(&self) -> SleepAfter {
        self.sleep_after
    }

    /// A consistent view of the instance's current state.
    pub fn snapshot(&self) -> InstanceSnapshot {
        let s = self.state.read();
        InstanceSnapshot {
            status: s.status(),
            address: s.address.clone(),
            last_error: s.last_error.clone(),
            start_request: s.start_request,
            http_healthy: s.http_healthy,
        }
    }

    pub fn status(&self) -> LifecycleState {
        self.state.read().status()
    }

    /// Records a proxied request. Only the wakeup gate, after a successful
    /// forward, should call this (P4) — never the monitor, never the
    /// waiting-page path.
    pub fn record_access(&self) {
        self.state.write().last_access = Some(Instant::now());
    }

    /// Marks the current Running epoch as HTTP-healthy (I3).
    pub fn mark_http_healthy(&self) {
        self.state.write().http_healthy = true;
    }

    /// Non-blocking request to start the instance. Dropped silently if the
    /// intent channel is full; the next reconciliation tick re-converges.
    pub fn request_start(&self) {
        let _ = self.intent_tx.try_send(LifecycleState::Starting);
    }

    /// Non-blocking request to stop the instance.
    pub fn request_stop(&self) {
        let _ = self.intent_tx.try_send(LifecycleState::Stopping);
    }

    /// Spawns the monitor task. Must be called exactly once per instance
    /// (enforced by `InstanceStore::set`); panics if called twice.
    pub fn spawn_monitor(self: Arc<Self>) -> JoinHandle<()> {
        let intent_rx = self
            .intent_rx
            .lock()
            .take()
            .expect("spawn_monitor called twice on the same instance");
        let halt_rx = self
            .halt_rx
            .lock()
            .take()
            .expect("spawn_monitor called twice on the same instance");

        tokio::spawn(async move { monitor::run(self, intent_rx, halt_rx).await })
    }

    /// Signals the monitor to exit. Idempotent; a second call is a no-op.
    pub fn halt(&self) {
        if let Some(tx) = self.halt_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}
