//! The provider capability contract (§4.A) plus status normalisation (§4.B).
//!
//! `ProviderAdapter` is the only coupling point between the lifecycle engine
//! and a concrete cloud API. Adapters for EC2 and GCE live alongside it;
//! both shell out to the vendor CLI rather than embed a full SDK, the same
//! way [`crate::provider::shell`] shells out to `gsutil`/`gcloud` for a
//! teacher that moved snapshots to cloud storage.

mod ec2;
mod error;
mod gce;
mod shell;
mod status;

pub use ec2::Ec2Provider;
pub use error::{ProviderError, ProviderResult};
pub use gce::GceProvider;
pub use status::{normalize_ec2_status, normalize_gce_status};

use async_trait::async_trait;

use crate::lifecycle::LifecycleState;

/// Uniform start/stop/status/address capability over a remote VM.
///
/// `key()` is the [`crate::store::InstanceStore`] primary key; it must be
/// deterministic from (provider-kind, identifiers, region/zone) so that the
/// same backend always resolves to the same instance across restarts.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable description, used in logs.
    fn describe(&self) -> String;

    /// Stable, unique key for this backend.
    fn key(&self) -> String;

    /// Queries the provider for the current lifecycle state.
    async fn status(&self) -> ProviderResult<LifecycleState>;

    /// Returns the IPv4 address or hostname of the backend.
    ///
    /// Callers must only invoke this when the instance is known to be
    /// `Running`; providers are free to return an error otherwise.
    async fn address(&self) -> ProviderResult<String>;

    /// Submits a start request to the provider.
    async fn start(&self) -> ProviderResult<()>;

    /// Submits a stop request to the provider.
    async fn stop(&self) -> ProviderResult<()>;
}
