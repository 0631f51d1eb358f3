use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use super::*;
use crate::provider::{ProviderError, ProviderResult};

/// A fully scriptable provider for exercising the transition table without
/// a real cloud API.
#[derive(Default)]
struct MockProvider {
    status: StdMutex<LifecycleState>,
    address: StdMutex<String>,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    address_should_fail: std::sync::atomic::AtomicBool,
}

impl MockProvider {
    fn new(initial: LifecycleState) -> Self {
        Self {
            status: StdMutex::new(initial),
            address: StdMutex::new("10.0.0.5".to_string()),
            ..Default::default()
        }
    }

    fn set_status(&self, status: LifecycleState) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn describe(&self) -> String {
        "[mock] test instance".to_string()
    }

    fn key(&self) -> String {
        "mock-1".to_string()
    }

    async fn status(&self) -> ProviderResult<LifecycleState> {
        Ok(*self.status.lock().unwrap())
    }

    async fn address(&self) -> ProviderResult<String> {
        if self.address_should_fail.load(Ordering::SeqCst) {
            return Err(ProviderError::NotRunning);
        }
        Ok(self.address.lock().unwrap().clone())
    }

    async fn start(&self) -> ProviderResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.set_status(LifecycleState::Starting);
        Ok(())
    }

    async fn stop(&self) -> ProviderResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    // Give the spawned monitor task a few scheduling turns to drain the
    // channel after we advance virtual time or send an intent.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn cold_wake_sends_exactly_one_start() {
    let provider = Arc::new(MockProvider::new(LifecycleState::NotRun));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(1200)))
        .await
        .unwrap();
    let _handle = Arc::clone(&instance).spawn_monitor();

    instance.request_start();
    settle().await;

    assert_eq!(instance.status(), LifecycleState::Starting);
    assert_eq!(provider.start_calls.load(Ordering::SeqCst), 1);
    assert!(instance.snapshot().start_request.is_some());

    instance.halt();
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_intents_call_start_once() {
    let provider = Arc::new(MockProvider::new(LifecycleState::NotRun));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(1200)))
        .await
        .unwrap();
    let _handle = Arc::clone(&instance).spawn_monitor();

    instance.request_start();
    instance.request_start();
    instance.request_start();
    settle().await;

    // Once Starting, the engine is its own deduplicator: later intents in the
    // same state are ignored (P3).
    assert_eq!(provider.start_calls.load(Ordering::SeqCst), 1);

    instance.halt();
}

#[tokio::test(start_paused = true)]
async fn warm_instance_records_access_only_via_gate() {
    let provider = Arc::new(MockProvider::new(LifecycleState::Running));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(60)))
        .await
        .unwrap();

    // Constructor trusts an initially-Running provider.
    let snap = instance.snapshot();
    assert_eq!(snap.status, LifecycleState::Running);
    assert_eq!(snap.address, "10.0.0.5");
    assert!(snap.http_healthy);
}

#[tokio::test(start_paused = true)]
async fn idle_running_instance_self_sleeps_within_one_tick() {
    let provider = Arc::new(MockProvider::new(LifecycleState::Running));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(60)))
        .await
        .unwrap();
    let _handle = Arc::clone(&instance).spawn_monitor();

    tokio::time::advance(Duration::from_secs(65)).await;
    settle().await;
    // Drive the reconciliation tick.
    tokio::time::advance(RECONCILE_INTERVAL).await;
    settle().await;

    assert_eq!(provider.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(instance.status(), LifecycleState::Stopping);

    instance.halt();
}

#[tokio::test(start_paused = true)]
async fn sentinel_disables_start_on_request_but_not_the_instance() {
    let sleep_after = SleepAfter::from_config_seconds(-1);
    assert!(!sleep_after.start_on_request_allowed());

    let sleep_after_zero = SleepAfter::from_config_seconds(0);
    assert!(matches!(sleep_after_zero, SleepAfter::After(d) if d == DEFAULT_SLEEP_AFTER));

    let sleep_after_positive = SleepAfter::from_config_seconds(120);
    assert!(matches!(sleep_after_positive, SleepAfter::After(d) if d == Duration::from_secs(120)));
}

#[tokio::test(start_paused = true)]
async fn failed_address_fetch_on_running_transition_sets_error() {
    let provider = Arc::new(MockProvider::new(LifecycleState::NotRun));
    provider.address_should_fail.store(true, Ordering::SeqCst);
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(1200)))
        .await
        .unwrap();
    let _handle = Arc::clone(&instance).spawn_monitor();

    provider.set_status(LifecycleState::Running);
    tokio::time::advance(RECONCILE_INTERVAL).await;
    settle().await;

    let snap = instance.snapshot();
    assert_eq!(snap.status, LifecycleState::Error);
    assert!(snap.last_error.is_some());

    instance.halt();
}

#[tokio::test(start_paused = true)]
async fn stop_intent_clears_http_healthy() {
    let provider = Arc::new(MockProvider::new(LifecycleState::Running));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(60)))
        .await
        .unwrap();
    let _handle = Arc::clone(&instance).spawn_monitor();

    assert!(instance.snapshot().http_healthy);

    instance.request_stop();
    settle().await;

    // I3: http_healthy must not survive a Running -> Stopping transition,
    // since the next Running epoch needs a fresh probe.
    assert_eq!(instance.status(), LifecycleState::Stopping);
    assert!(!instance.snapshot().http_healthy);

    instance.halt();
}

#[tokio::test(start_paused = true)]
async fn halt_stops_the_monitor_task() {
    let provider = Arc::new(MockProvider::new(LifecycleState::NotRun));
    let instance = ComputeInstance::new(provider.clone(), SleepAfter::After(Duration::from_secs(1200)))
        .await
        .unwrap();
    let handle = Arc::clone(&instance).spawn_monitor();

    instance.halt();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("monitor task should exit promptly after halt")
        .unwrap();
}
