//! TLS termination with SNI (§4.G): one certificate per hostname, selected at
//! handshake time.

use std::collections::HashMap;
use std::sync::Arc;

use doze::route::RouteTable;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read certificate file {0}: {1}")]
    ReadCert(String, std::io::Error),
    #[error("failed to read key file {0}: {1}")]
    ReadKey(String, std::io::Error),
    #[error("no private key found in {0}")]
    NoKey(String),
    #[error("certificate {0} does not match its private key: {1}")]
    Mismatch(String, rustls::Error),
}

/// Resolves the certificate to present based on the SNI hostname the client sent.
struct SniCertResolver {
    by_hostname: HashMap<String, Arc<CertifiedKey>>,
    fallback: Option<Arc<CertifiedKey>>,
}

impl std::fmt::Debug for SniCertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniCertResolver")
            .field("hostnames", &self.by_hostname.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolvesServerCert for SniCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        client_hello
            .server_name()
            .and_then(|name| self.by_hostname.get(name))
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

/// Builds a TLS `ServerConfig` for every hostname under `listen_address` that
/// carries a certificate. Returns `None` when no route at this address has
/// any certificates configured (the listener stays plain HTTP).
///
/// Certificate and key files are loaded eagerly here; any failure is
/// propagated so startup can fail fast (§4.E).
pub fn build_server_config(routes: &RouteTable, listen_address: &str) -> Result<Option<Arc<ServerConfig>>, TlsError> {
    let mut by_hostname = HashMap::new();
    let mut fallback = None;

    for route in routes.routes_for(listen_address) {
        for cert in &route.certificates {
            let key = load_certified_key(&cert.cert_file, &cert.key_file)?;
            let key = Arc::new(key);
            by_hostname.insert(route.hostname.clone(), key.clone());
            fallback.get_or_insert(key);
        }
    }

    if by_hostname.is_empty() {
        return Ok(None);
    }

    let resolver = Arc::new(SniCertResolver { by_hostname, fallback });

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Some(Arc::new(config)))
}

fn load_certified_key(cert_file: &str, key_file: &str) -> Result<CertifiedKey, TlsError> {
    let cert_bytes = std::fs::read(cert_file).map_err(|e| TlsError::ReadCert(cert_file.to_string(), e))?;
    let key_bytes = std::fs::read(key_file).map_err(|e| TlsError::ReadKey(key_file.to_string(), e))?;

    let chain: Vec<_> = rustls_pemfile::certs(&mut cert_bytes.as_slice())
        .filter_map(Result::ok)
        .collect();

    let key_der = rustls_pemfile::private_key(&mut key_bytes.as_slice())
        .map_err(|e| TlsError::ReadKey(key_file.to_string(), e))?
        .ok_or_else(|| TlsError::NoKey(key_file.to_string()))?;

    let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key_der)
        .map_err(|e| TlsError::Mismatch(cert_file.to_string(), e))?;

    Ok(CertifiedKey::new(chain, signing_key))
}
