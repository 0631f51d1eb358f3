//! Lifecycle engine and dispatch model for a host-aware wake-on-demand
//! reverse proxy.
//!
//! This crate owns everything that doesn't talk HTTP: the per-instance state
//! machine ([`instance`]), the cloud provider adapters ([`provider`]), the
//! instance registry ([`store`]), routing ([`route`]), config loading
//! ([`config`]) and basic-auth verification ([`auth`]). The HTTP listener,
//! waiting page, and wakeup gate live in the `doze-gateway` binary crate.

pub mod auth;
pub mod config;
pub mod instance;
pub mod lifecycle;
pub mod provider;
pub mod route;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use auth::{AuthGroupError, BasicAuthVerifier, Sha256Verifier};
use config::Config;
use instance::{ComputeInstance, SleepAfter};
use provider::{Ec2Provider, GceProvider, ProviderAdapter, ProviderError};
use route::{RouteTable, RouteTableError};
use store::InstanceStore;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to materialise auth group {group:?}: {source}")]
    AuthGroup {
        group: String,
        #[source]
        source: AuthGroupError,
    },
    #[error("failed to query initial status for backend {key:?}: {source}")]
    Provider {
        key: String,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    RouteTable(#[from] RouteTableError),
}

/// Everything the gateway binary needs to start serving: the live instance
/// registry and the immutable route table built from it.
pub struct RuntimeTopology {
    pub store: Arc<InstanceStore>,
    pub routes: Arc<RouteTable>,
}

/// Builds a full runtime topology from a loaded [`Config`]: materialises
/// every auth group, constructs one [`ComputeInstance`] per `[[ec2]]`/
/// `[[gce]]` entry (querying its initial status — a failure here is fatal,
/// matching the source system's "crash on startup if a backend can't be
/// reached" posture), and assembles the route table.
///
/// The caller is responsible for calling [`InstanceStore::close`] during
/// shutdown.
pub async fn build_runtime(config: &Config) -> Result<RuntimeTopology, BuildError> {
    let auth_groups = build_auth_groups(config)?;

    let store = Arc::new(InstanceStore::new());
    let mut instance_keys = Vec::with_capacity(config.ec2.len() + config.gce.len());

    for ec2 in &config.ec2 {
        let provider: Arc<dyn ProviderAdapter> = Arc::new(Ec2Provider::new(
            ec2.access_key_id.clone(),
            ec2.secret_access_key.clone(),
            ec2.region.clone(),
            ec2.instance_id.clone(),
            ec2.base.use_internal_ip,
        ));
        let key = provider.key();
        let sleep_after = SleepAfter::from_config_seconds(ec2.base.sleep_after);
        let instance = ComputeInstance::new(provider, sleep_after)
            .await
            .map_err(|source| BuildError::Provider { key: key.clone(), source })?;
        store.set(key.clone(), instance);
        instance_keys.push((key, ec2.base.routes.clone()));
    }

    for gce in &config.gce {
        let provider: Arc<dyn ProviderAdapter> = Arc::new(GceProvider::new(
            Some(gce.jwt_path.clone()).filter(|p| !p.is_empty()),
            gce.project_id.clone(),
            gce.zone.clone(),
            gce.name.clone(),
            gce.base.use_internal_ip,
        ));
        let key = provider.key();
        let sleep_after = SleepAfter::from_config_seconds(gce.base.sleep_after);
        let instance = ComputeInstance::new(provider, sleep_after)
            .await
            .map_err(|source| BuildError::Provider { key: key.clone(), source })?;
        store.set(key.clone(), instance);
        instance_keys.push((key, gce.base.routes.clone()));
    }

    let routes = Arc::new(route::build_route_table(&auth_groups, &instance_keys)?);

    Ok(RuntimeTopology { store, routes })
}

fn build_auth_groups(config: &Config) -> Result<HashMap<String, Arc<dyn BasicAuthVerifier>>, BuildError> {
    let mut groups: HashMap<String, Arc<dyn BasicAuthVerifier>> = HashMap::with_capacity(config.auth_basic.len());
    for (name, group) in &config.auth_basic {
        let verifier = Sha256Verifier::from_auth_group(group)
            .map_err(|source| BuildError::AuthGroup { group: name.clone(), source })?;
        groups.insert(name.clone(), Arc::new(verifier));
    }
    Ok(groups)
}
