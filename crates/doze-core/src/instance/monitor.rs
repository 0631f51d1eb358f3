//! The monitor task: the sole writer of `status`/`address`/`http_healthy`/
//! `start_request` during a Running epoch (I5), and the only thing that ever
//! calls `provider.start()`/`stop()` (P3).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use super::{ComputeInstance, SleepAfter};
use crate::lifecycle::LifecycleState;

pub(super) async fn run(
    instance: Arc<ComputeInstance>,
    mut intent_rx: mpsc::Receiver<LifecycleState>,
    mut halt_rx: oneshot::Receiver<()>,
) {
    let mut tick = time::interval(super::RECONCILE_INTERVAL);
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick fires immediately; consume it so we don't re-check
    // status() a moment after the constructor already did.
    tick.tick().await;

    loop {
        tokio::select! {
            intent = intent_rx.recv() => {
                match intent {
                    Some(intent) => handle_intent(&instance, intent).await,
                    None => break,
                }
            }
            _ = tick.tick() => {
                handle_tick(&instance).await;
            }
            _ = &mut halt_rx => {
                tracing::debug!(key = %instance.key(), "monitor halted");
                break;
            }
        }
    }
}

async fn handle_intent(instance: &Arc<ComputeInstance>, intent: LifecycleState) {
    let current = instance.status();

    match intent {
        LifecycleState::Starting => handle_start_intent(instance, current).await,
        LifecycleState::Stopping => handle_stop_intent(instance, current).await,
        other => unreachable!("intent channel only carries Starting/Stopping, got {other:?}"),
    }
}

async fn handle_start_intent(instance: &Arc<ComputeInstance>, current: LifecycleState) {
    // NotRun, Error and NotAvailable all retry start() on a Starting intent;
    // every other state already has a start outstanding or doesn't need one.
    if !matches!(current, LifecycleState::NotRun | LifecycleState::Error | LifecycleState::NotAvailable) {
        return;
    }

    tracing::info!(key = %instance.key(), instance = %instance.describe(), "starting instance");

    match instance.provider.start().await {
        Ok(()) => {
            let mut s = instance.state.write();
            s.status = Some(LifecycleState::Starting);
            s.start_request = Some(Utc::now());
            s.last_error = None;
        }
        Err(e) => {
            tracing::warn!(key = %instance.key(), error = %e, "start() failed");
            let mut s = instance.state.write();
            s.status = Some(LifecycleState::Error);
            s.last_error = Some(e.to_string());
        }
    }
}

async fn handle_stop_intent(instance: &Arc<ComputeInstance>, current: LifecycleState) {
    if current != LifecycleState::Running {
        return;
    }

    tracing::info!(key = %instance.key(), instance = %instance.describe(), "stopping instance");

    match instance.provider.stop().await {
        Ok(()) => {
            let mut s = instance.state.write();
            s.status = Some(LifecycleState::Stopping);
            s.http_healthy = false;
        }
        Err(e) => {
            // Logged only: state stays Running, the idle check retries next tick (§7).
            tracing::warn!(key = %instance.key(), error = %e, "stop() failed, staying running");
        }
    }
}

async fn handle_tick(instance: &Arc<ComputeInstance>) {
    let current = instance.status();

    match instance.provider.status().await {
        Ok(reported) => {
            if reported != current {
                adopt_reported(instance, current, reported).await;
            }
            if reported == LifecycleState::Running {
                maybe_self_sleep(instance).await;
            }
        }
        Err(e) => {
            tracing::warn!(key = %instance.key(), error = %e, "status() failed, marking not available");
            instance.state.write().status = Some(LifecycleState::NotAvailable);
        }
    }
}

async fn adopt_reported(instance: &Arc<ComputeInstance>, current: LifecycleState, reported: LifecycleState) {
    match reported {
        LifecycleState::Running => {
            match instance.provider.address().await {
                Ok(address) => {
                    let mut s = instance.state.write();
                    s.status = Some(LifecycleState::Running);
                    s.address = address;
                    s.last_access = Some(std::time::Instant::now());
                    // httpHealthy resets whenever a new Running epoch begins (I3);
                    // the wakeup gate's health probe will set it true again.
                    s.http_healthy = false;
                }
                Err(e) => {
                    tracing::warn!(key = %instance.key(), error = %e, "failed to fetch address on Running transition");
                    let mut s = instance.state.write();
                    s.status = Some(LifecycleState::Error);
                    s.last_error = Some(e.to_string());
                }
            }
        }
        LifecycleState::NotRun => {
            let mut s = instance.state.write();
            s.status = Some(LifecycleState::NotRun);
            s.clear_running_epoch();
        }
        other => {
            // Stopping/Starting/NotAvailable/Error reported by the provider:
            // adopt verbatim, no field resets.
            let _ = current;
            instance.state.write().status = Some(other);
        }
    }
}

async fn maybe_self_sleep(instance: &Arc<ComputeInstance>) {
    let SleepAfter::After(limit) = instance.sleep_after() else {
        return;
    };

    let last_access = instance.state.read().last_access;
    if let Some(last_access) = last_access {
        if last_access.elapsed() >= limit {
            tracing::info!(key = %instance.key(), "idle window exceeded, requesting stop");
            instance.request_stop();
        }
    }
}
