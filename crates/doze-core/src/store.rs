//! Thread-safe registry of [`ComputeInstance`]s (§4.D).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::instance::ComputeInstance;

/// Owns the lifetimes of every instance's monitor task.
///
/// Entries are never removed during normal operation, so a reference handed
/// out by [`InstanceStore::get`] stays valid for the process's lifetime.
#[derive(Default)]
pub struct InstanceStore {
    instances: RwLock<HashMap<String, Arc<ComputeInstance>>>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an instance and starts its monitor.
    pub fn set(&self, key: String, instance: Arc<ComputeInstance>) {
        let handle = Arc::clone(&instance).spawn_monitor();
        self.monitors.lock().push(handle);
        self.instances.write().insert(key, instance);
    }

    /// Looks up an instance by key.
    pub fn get(&self, key: &str) -> Option<Arc<ComputeInstance>> {
        self.instances.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signals every monitor to halt, then waits for all of them to exit.
    pub async fn close(&self) {
        for instance in self.instances.read().values() {
            instance.halt();
        }

        let handles: Vec<_> = std::mem::take(&mut *self.monitors.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::SleepAfter;
    use crate::lifecycle::LifecycleState;
    use crate::provider::{ProviderAdapter, ProviderError, ProviderResult};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubProvider(&'static str);

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        fn describe(&self) -> String {
            self.0.to_string()
        }
        fn key(&self) -> String {
            self.0.to_string()
        }
        async fn status(&self) -> ProviderResult<LifecycleState> {
            Ok(LifecycleState::NotRun)
        }
        async fn address(&self) -> ProviderResult<String> {
            Err(ProviderError::NotRunning)
        }
        async fn start(&self) -> ProviderResult<()> {
            Ok(())
        }
        async fn stop(&self) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_and_close_joins_monitors() {
        let store = InstanceStore::new();
        let provider = Arc::new(StubProvider("a"));
        let instance = ComputeInstance::new(provider, SleepAfter::After(Duration::from_secs(60)))
            .await
            .unwrap();

        store.set("a".to_string(), instance);
        assert!(store.get("a").is_some());
        assert!(store.get("missing").is_none());
        assert_eq!(store.len(), 1);

        store.close().await;
    }
}
