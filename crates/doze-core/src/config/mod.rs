//! TOML configuration loading (§6).

mod error;

pub use error::ConfigError;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Top-level config file shape. Mirrors the TOML layout byte-for-byte: one
/// `[[ec2]]`/`[[gce]]` table array per managed backend, one `[auth.NAME]`
/// table per credential group.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(rename = "ec2", default)]
    pub ec2: Vec<Ec2Config>,
    #[serde(rename = "gce", default)]
    pub gce: Vec<GceConfig>,
    #[serde(rename = "auth", default)]
    pub auth_basic: HashMap<String, AuthGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthGroup {
    /// `"user:sha256-hex-digest"` entries.
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub backend_port: u16,
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub auth_group: Option<String>,
    #[serde(rename = "certificate", default)]
    pub certificates: Vec<CertificateConfig>,
    /// Bypasses the wakeup gate entirely for this route.
    #[serde(default)]
    pub is_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificateConfig {
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub sleep_after: i64,
    #[serde(default)]
    pub use_internal_ip: bool,
    #[serde(rename = "route", default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GceConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub jwt_path: String,
    pub project_id: String,
    pub zone: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ec2Config {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub instance_id: String,
}

/// Parses and lightly validates a TOML config file at `path`.
///
/// Unlike the system this replaces, a malformed file is a recoverable
/// [`ConfigError`] rather than a fatal `log.Fatal` — callers (the gateway's
/// `main`) decide how to report it and exit.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let backends = config
        .ec2
        .iter()
        .map(|c| (c.instance_id.as_str(), &c.base))
        .chain(config.gce.iter().map(|c| (c.name.as_str(), &c.base)));

    for (backend, base) in backends {
        validate_backend(backend, base, &config.auth_basic)?;
    }

    Ok(config)
}

fn validate_backend(
    backend: &str,
    base: &BaseConfig,
    auth_basic: &HashMap<String, AuthGroup>,
) -> Result<(), ConfigError> {
    if base.routes.is_empty() {
        return Err(ConfigError::NoRoutes { backend: backend.to_string() });
    }

    for route in &base.routes {
        if let Some(group) = route.auth_group.as_ref().filter(|g| !g.is_empty()) {
            if !auth_basic.contains_key(group) {
                return Err(ConfigError::UnknownAuthGroup {
                    backend: backend.to_string(),
                    group: group.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_ec2_config() {
        let toml = r#"
            port = ":8080"

            [[ec2]]
            access_key_id = "AKIA"
            secret_access_key = "secret"
            region = "us-east-1"
            instance_id = "i-123"
            sleep_after = 300

            [[ec2.route]]
            hostnames = ["app.example.com"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.ec2.len(), 1);
        assert_eq!(config.ec2[0].base.routes[0].hostnames[0], "app.example.com");
        assert_eq!(config.ec2[0].base.sleep_after, 300);
    }

    #[test]
    fn unknown_auth_group_is_rejected() {
        let toml = r#"
            port = ":8080"

            [[ec2]]
            access_key_id = "AKIA"
            secret_access_key = "secret"
            region = "us-east-1"
            instance_id = "i-123"

            [[ec2.route]]
            hostnames = ["app.example.com"]
            auth_group = "missing"
        "#;

        let path = write_temp(toml);
        let result = load_config(path.path());
        assert!(matches!(result, Err(ConfigError::UnknownAuthGroup { .. })));
    }

    #[test]
    fn backend_without_routes_is_rejected() {
        let toml = r#"
            port = ":8080"

            [[ec2]]
            access_key_id = "AKIA"
            secret_access_key = "secret"
            region = "us-east-1"
            instance_id = "i-123"
        "#;

        let path = write_temp(toml);
        let result = load_config(path.path());
        assert!(matches!(result, Err(ConfigError::NoRoutes { backend }) if backend == "i-123"));
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }
}
