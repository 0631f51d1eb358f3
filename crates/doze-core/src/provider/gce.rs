//! GCE adapter: shells out to the `gcloud` CLI.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::{ProviderError, ProviderResult};
use super::shell::run_with_retries;
use super::status::normalize_gce_status;
use super::ProviderAdapter;
use crate::lifecycle::LifecycleState;

/// A GCE instance managed via the `gcloud` CLI.
pub struct GceProvider {
    jwt_path: Option<String>,
    project_id: String,
    zone: String,
    name: String,
    use_internal_ip: bool,
    gcloud_path: PathBuf,
}

impl GceProvider {
    pub fn new(
        jwt_path: impl Into<Option<String>>,
        project_id: impl Into<String>,
        zone: impl Into<String>,
        name: impl Into<String>,
        use_internal_ip: bool,
    ) -> Self {
        Self {
            jwt_path: jwt_path.into(),
            project_id: project_id.into(),
            zone: zone.into(),
            name: name.into(),
            use_internal_ip,
            gcloud_path: PathBuf::from("gcloud"),
        }
    }

    fn env(&self) -> Vec<(&str, &str)> {
        match &self.jwt_path {
            Some(path) => vec![("GOOGLE_APPLICATION_CREDENTIALS", path.as_str())],
            None => Vec::new(),
        }
    }

    async fn describe_instance(&self) -> ProviderResult<GceInstance> {
        let args = [
            "compute".to_string(),
            "instances".to_string(),
            "describe".to_string(),
            self.name.clone(),
            "--project".to_string(),
            self.project_id.clone(),
            "--zone".to_string(),
            self.zone.clone(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let stdout = run_with_retries(&self.gcloud_path, &args, &self.env(), "gcloud compute instances describe").await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

#[async_trait]
impl ProviderAdapter for GceProvider {
    fn describe(&self) -> String {
        format!("[GCE] name={}-{} in {}", self.project_id, self.name, self.zone)
    }

    fn key(&self) -> String {
        format!("gce-{}-{}-{}", self.project_id, self.zone, self.name)
    }

    async fn status(&self) -> ProviderResult<LifecycleState> {
        let inst = self.describe_instance().await?;
        Ok(normalize_gce_status(&inst.status))
    }

    async fn address(&self) -> ProviderResult<String> {
        let inst = self.describe_instance().await?;
        let iface = inst
            .network_interfaces
            .first()
            .ok_or_else(|| ProviderError::Protocol("instance has no network interfaces".into()))?;

        if self.use_internal_ip {
            iface.network_ip.clone().ok_or(ProviderError::NotRunning)
        } else {
            iface
                .access_configs
                .first()
                .and_then(|ac| ac.nat_ip.clone())
                .ok_or(ProviderError::NotRunning)
        }
    }

    async fn start(&self) -> ProviderResult<()> {
        let args = [
            "compute".to_string(),
            "instances".to_string(),
            "start".to_string(),
            self.name.clone(),
            "--project".to_string(),
            self.project_id.clone(),
            "--zone".to_string(),
            self.zone.clone(),
        ];
        run_with_retries(&self.gcloud_path, &args, &self.env(), "gcloud compute instances start").await?;
        Ok(())
    }

    async fn stop(&self) -> ProviderResult<()> {
        let args = [
            "compute".to_string(),
            "instances".to_string(),
            "stop".to_string(),
            self.name.clone(),
            "--project".to_string(),
            self.project_id.clone(),
            "--zone".to_string(),
            self.zone.clone(),
        ];
        run_with_retries(&self.gcloud_path, &args, &self.env(), "gcloud compute instances stop").await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GceInstance {
    status: String,
    #[serde(rename = "networkInterfaces", default)]
    network_interfaces: Vec<GceNetworkInterface>,
}

#[derive(Debug, Deserialize)]
struct GceNetworkInterface {
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    #[serde(rename = "accessConfigs", default)]
    access_configs: Vec<GceAccessConfig>,
}

#[derive(Debug, Deserialize)]
struct GceAccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}
