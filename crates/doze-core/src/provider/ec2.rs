//! EC2 adapter: shells out to the `aws` CLI.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::{ProviderError, ProviderResult};
use super::shell::run_with_retries;
use super::status::normalize_ec2_status;
use super::ProviderAdapter;
use crate::lifecycle::LifecycleState;

/// An EC2 instance managed via the `aws` CLI.
pub struct Ec2Provider {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    instance_id: String,
    use_internal_ip: bool,
    aws_cli_path: PathBuf,
}

impl Ec2Provider {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
        instance_id: impl Into<String>,
        use_internal_ip: bool,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            instance_id: instance_id.into(),
            use_internal_ip,
            aws_cli_path: PathBuf::from("aws"),
        }
    }

    fn env(&self) -> [(&str, &str); 3] {
        [
            ("AWS_ACCESS_KEY_ID", self.access_key_id.as_str()),
            ("AWS_SECRET_ACCESS_KEY", self.secret_access_key.as_str()),
            ("AWS_DEFAULT_REGION", self.region.as_str()),
        ]
    }

    async fn describe_instance(&self) -> ProviderResult<Ec2Instance> {
        let args = [
            "ec2".to_string(),
            "describe-instances".to_string(),
            "--instance-ids".to_string(),
            self.instance_id.clone(),
            "--region".to_string(),
            self.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];

        let stdout = run_with_retries(&self.aws_cli_path, &args, &self.env(), "aws ec2 describe-instances").await?;
        let parsed: Ec2DescribeResponse = serde_json::from_slice(&stdout)?;

        parsed
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .next()
            .ok_or_else(|| ProviderError::Protocol(format!("EC2 instance {} not found", self.instance_id)))
    }
}

#[async_trait]
impl ProviderAdapter for Ec2Provider {
    fn describe(&self) -> String {
        format!("[EC2] id={} region={}", self.instance_id, self.region)
    }

    fn key(&self) -> String {
        format!("ec2-{}-{}", self.instance_id, self.region)
    }

    async fn status(&self) -> ProviderResult<LifecycleState> {
        let inst = self.describe_instance().await?;
        Ok(normalize_ec2_status(&inst.state.name))
    }

    async fn address(&self) -> ProviderResult<String> {
        let inst = self.describe_instance().await?;
        let addr = if self.use_internal_ip {
            inst.private_ip_address
        } else {
            inst.public_ip_address
        };
        addr.ok_or(ProviderError::NotRunning)
    }

    async fn start(&self) -> ProviderResult<()> {
        let args = [
            "ec2".to_string(),
            "start-instances".to_string(),
            "--instance-ids".to_string(),
            self.instance_id.clone(),
            "--region".to_string(),
            self.region.clone(),
        ];
        run_with_retries(&self.aws_cli_path, &args, &self.env(), "aws ec2 start-instances").await?;
        Ok(())
    }

    async fn stop(&self) -> ProviderResult<()> {
        let args = [
            "ec2".to_string(),
            "stop-instances".to_string(),
            "--instance-ids".to_string(),
            self.instance_id.clone(),
            "--region".to_string(),
            self.region.clone(),
        ];
        run_with_retries(&self.aws_cli_path, &args, &self.env(), "aws ec2 stop-instances").await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Ec2DescribeResponse {
    #[serde(rename = "Reservations")]
    reservations: Vec<Ec2Reservation>,
}

#[derive(Debug, Deserialize)]
struct Ec2Reservation {
    #[serde(rename = "Instances")]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
struct Ec2Instance {
    #[serde(rename = "State")]
    state: Ec2State,
    #[serde(rename = "PublicIpAddress")]
    public_ip_address: Option<String>,
    #[serde(rename = "PrivateIpAddress")]
    private_ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Ec2State {
    #[serde(rename = "Name")]
    name: String,
}
