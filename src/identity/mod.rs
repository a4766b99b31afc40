//! Visitor identity
//!
//! A visitor is identified by nothing more than its public IP address. The
//! same string is used twice: with its dots stripped as a storage key for
//! visit records, and verbatim as the ownership token stamped on comments.
//! Anyone who shares the address (same NAT, same proxy) shares the identity.

pub mod ip_extractor;
pub mod resolver;

pub use ip_extractor::extract_client_ip;
pub use resolver::{IdentityResolver, IpEchoClient, StaticResolver};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Label used when an address has nothing after its last dot.
pub const PLACEHOLDER_LABEL: &str = "0000";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("IP echo request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IP echo returned an unusable address: {0:?}")]
    Malformed(String),
}

/// The caller's resolved IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Malformed(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of this visitor's record: the address with every `.` removed.
    pub fn storage_key(&self) -> String {
        self.0.replace('.', "")
    }

    /// Short public label: whatever follows the last `.` (the last octet for
    /// IPv4). IPv6 addresses contain no dot and are used whole.
    pub fn display_label(&self) -> &str {
        display_label(&self.0)
    }
}

/// Label derivation shared with comments posted without an identity.
pub fn display_label(address: &str) -> &str {
    match address.rsplit('.').next() {
        Some(last) if !last.is_empty() => last,
        _ => PLACEHOLDER_LABEL,
    }
}

impl From<IpAddr> for IdentityKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl TryFrom<String> for IdentityKey {
    type Error = IdentityError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<IdentityKey> for String {
    fn from(key: IdentityKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one page load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentityState {
    #[default]
    Unresolved,
    Resolved(IdentityKey),
    /// Lookup failed; the visitor stays anonymous for this page load
    Failed,
}

impl IdentityState {
    pub fn key(&self) -> Option<&IdentityKey> {
        match self {
            Self::Resolved(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}
