use super::types::ClientIdentity;
use std::fmt;

/// Counter key for an identity's active window.
///
/// Windows are not aligned to a clock tick: the key names the identity only,
/// and the store's TTL on that key is what bounds the window. Every call for
/// the same identity therefore lands on the same counter until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey(String);

impl WindowKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps client identities to window keys under a fixed namespace
#[derive(Debug, Clone)]
pub struct WindowKeyDeriver {
    prefix: String,
}

impl WindowKeyDeriver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Derive the counter key for an identity
    pub fn derive(&self, identity: &ClientIdentity) -> WindowKey {
        WindowKey(format!("{}:{}", self.prefix, identity.as_str()))
    }
}
