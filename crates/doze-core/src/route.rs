//! Route table construction (§4.E): `(listen-address, hostname) → route`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::BasicAuthVerifier;
use crate::config::{CertificateConfig, RouteConfig};

/// One hostname's routing rule under a listen address.
pub struct RouteDescriptor {
    pub hostname: String,
    pub backend_port: u16,
    pub instance_key: String,
    pub auth_verifier: Option<Arc<dyn BasicAuthVerifier>>,
    pub certificates: Vec<CertificateConfig>,
    /// When true, bypass the wakeup gate entirely (always-on hostnames).
    pub pass_through: bool,
}

/// `listen_address -> hostname -> route`, built once at startup and
/// immutable thereafter.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, HashMap<String, RouteDescriptor>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("route address {address:?} has non-numeric port suffix and no explicit backend_port")]
    UnparsableBackendPort { address: String },
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn listen_addresses(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn lookup(&self, listen_address: &str, hostname: &str) -> Option<&RouteDescriptor> {
        self.routes.get(listen_address)?.get(hostname)
    }

    pub fn routes_for(&self, listen_address: &str) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes
            .get(listen_address)
            .into_iter()
            .flat_map(|m| m.values())
    }
}

/// Incrementally builds a [`RouteTable`] from one or more backends' route config.
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: HashMap<String, HashMap<String, RouteDescriptor>>,
}

const DEFAULT_LISTEN_ADDRESS: &str = ":80";

impl RouteTableBuilder {
    /// Adds every route for one backend, resolving its `auth_group` against
    /// the config's materialised auth groups.
    pub fn add_backend_routes(
        &mut self,
        routes: &[RouteConfig],
        instance_key: &str,
        auth_groups: &HashMap<String, Arc<dyn BasicAuthVerifier>>,
    ) -> Result<(), RouteTableError> {
        for route in routes {
            let address = if route.address.is_empty() {
                DEFAULT_LISTEN_ADDRESS.to_string()
            } else {
                route.address.clone()
            };

            let backend_port = if route.backend_port != 0 {
                route.backend_port
            } else {
                derive_port_from_address(&address)?
            };

            let auth_verifier = route
                .auth_group
                .as_ref()
                .filter(|g| !g.is_empty())
                .and_then(|g| auth_groups.get(g))
                .cloned();

            for hostname in &route.hostnames {
                let descriptor = RouteDescriptor {
                    hostname: hostname.clone(),
                    backend_port,
                    instance_key: instance_key.to_string(),
                    auth_verifier: auth_verifier.clone(),
                    certificates: route.certificates.clone(),
                    pass_through: route.is_proxy,
                };

                // A later insertion at the same (address, hostname) overwrites
                // — config order wins the last write.
                self.routes
                    .entry(address.clone())
                    .or_default()
                    .insert(hostname.clone(), descriptor);
            }
        }
        Ok(())
    }

    pub fn build(self) -> RouteTable {
        RouteTable { routes: self.routes }
    }
}

fn derive_port_from_address(address: &str) -> Result<u16, RouteTableError> {
    let numeric = address.replace(':', "");
    numeric.parse::<u16>().map_err(|_| RouteTableError::UnparsableBackendPort {
        address: address.to_string(),
    })
}

/// Builds a [`RouteTable`] from every backend's `(instance_key, routes)` pair.
pub fn build_route_table(
    auth_groups: &HashMap<String, Arc<dyn BasicAuthVerifier>>,
    instance_keys: &[(String, Vec<RouteConfig>)],
) -> Result<RouteTable, RouteTableError> {
    let mut builder = RouteTable::builder();
    for (instance_key, routes) in instance_keys {
        builder.add_backend_routes(routes, instance_key, auth_groups)?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(address: &str, backend_port: u16, hostnames: &[&str]) -> RouteConfig {
        RouteConfig {
            address: address.to_string(),
            backend_port,
            hostnames: hostnames.iter().map(|s| s.to_string()).collect(),
            auth_group: None,
            is_proxy: false,
            certificates: Vec::new(),
        }
    }

    #[test]
    fn empty_address_defaults_to_colon_80() {
        let mut builder = RouteTable::builder();
        builder
            .add_backend_routes(&[route("", 8080, &["a.test"])], "k1", &HashMap::new())
            .unwrap();
        let table = builder.build();
        assert!(table.lookup(":80", "a.test").is_some());
    }

    #[test]
    fn zero_backend_port_derives_from_address_suffix() {
        let mut builder = RouteTable::builder();
        builder
            .add_backend_routes(&[route(":8081", 0, &["a.test"])], "k1", &HashMap::new())
            .unwrap();
        let table = builder.build();
        assert_eq!(table.lookup(":8081", "a.test").unwrap().backend_port, 8081);
    }

    #[test]
    fn non_numeric_address_suffix_is_an_error() {
        let mut builder = RouteTable::builder();
        let err = builder.add_backend_routes(&[route(":web", 0, &["a.test"])], "k1", &HashMap::new());
        assert!(err.is_err());
    }

    #[test]
    fn later_insertion_at_same_key_overwrites() {
        let mut builder = RouteTable::builder();
        builder
            .add_backend_routes(&[route(":80", 8080, &["a.test"])], "first", &HashMap::new())
            .unwrap();
        builder
            .add_backend_routes(&[route(":80", 9090, &["a.test"])], "second", &HashMap::new())
            .unwrap();
        let table = builder.build();
        let descriptor = table.lookup(":80", "a.test").unwrap();
        assert_eq!(descriptor.instance_key, "second");
        assert_eq!(descriptor.backend_port, 9090);
    }
}
