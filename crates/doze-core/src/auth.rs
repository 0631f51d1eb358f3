//! Basic-auth credential verification (§6, interface only).
//!
//! The production credential format (Apache `htpasswd`-style `$apr1$`/bcrypt
//! hashes) is out of scope; [`BasicAuthVerifier`] is the seam a real
//! implementation plugs into. [`Sha256Verifier`] is a minimal reference
//! implementation good enough for tests and small deployments, not a
//! replacement for one.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::AuthGroup;

/// Checks a username/password pair against a materialised credential set.
pub trait BasicAuthVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Verifies against `user:sha256-hex-digest` entries loaded from config.
pub struct Sha256Verifier {
    credentials: HashMap<String, String>,
}

impl Sha256Verifier {
    pub fn from_auth_group(group: &AuthGroup) -> Result<Self, AuthGroupError> {
        let mut credentials = HashMap::with_capacity(group.users.len());
        for entry in &group.users {
            let (user, digest) = entry
                .split_once(':')
                .ok_or_else(|| AuthGroupError::MalformedEntry(entry.clone()))?;
            credentials.insert(user.to_string(), digest.to_lowercase());
        }
        Ok(Self { credentials })
    }

    fn digest_hex(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

impl BasicAuthVerifier for Sha256Verifier {
    fn verify(&self, username: &str, password: &str) -> bool {
        match self.credentials.get(username) {
            Some(expected) => constant_time_eq(expected, &Self::digest_hex(password)),
            None => false,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).unwrap();
    }
    out
}

/// Avoids short-circuiting on the first mismatched byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, thiserror::Error)]
pub enum AuthGroupError {
    #[error("malformed auth entry {0:?}, expected user:sha256_hex_digest")]
    MalformedEntry(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let group = AuthGroup {
            users: vec![format!("alice:{}", Sha256Verifier::digest_hex("hunter2"))],
        };
        let verifier = Sha256Verifier::from_auth_group(&group).unwrap();
        assert!(verifier.verify("alice", "hunter2"));
        assert!(!verifier.verify("alice", "wrong"));
        assert!(!verifier.verify("bob", "hunter2"));
    }

    #[test]
    fn malformed_entry_is_rejected() {
        let group = AuthGroup {
            users: vec!["no-colon-here".to_string()],
        };
        assert!(Sha256Verifier::from_auth_group(&group).is_err());
    }
}
