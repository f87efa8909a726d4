use crate::error::{TokenError, TokenResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Keys derived from one shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySet {
    pub(crate) hash_key: [u8; 32],
    pub(crate) encryption_key: [u8; 32],
    pub(crate) signature_key: [u8; 32],
}

impl KeySet {
    /// Derive a key set from `hash;encryption;signature`.
    ///
    /// With two components the signature key reuses the hash component; a
    /// single component is used for all three keys.
    pub fn from_secret(secret: &str) -> TokenResult<Self> {
        let parts: Vec<&str> = secret.split(';').map(str::trim).collect();
        let (hash, encryption, signature) = match parts.as_slice() {
            [all] => (*all, *all, *all),
            [hash, encryption] => (*hash, *encryption, *hash),
            [hash, encryption, signature] => (*hash, *encryption, *signature),
            _ => {
                return Err(TokenError::InvalidKey(format!(
                    "expected 1 to 3 components, got {}",
                    parts.len()
                )));
            }
        };

        if [hash, encryption, signature].iter().any(|p| p.is_empty()) {
            return Err(TokenError::InvalidKey("empty key component".to_string()));
        }

        Ok(Self {
            hash_key: derive(hash),
            encryption_key: derive(encryption),
            signature_key: derive(signature),
        })
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySet([redacted])")
    }
}

fn derive(component: &str) -> [u8; 32] {
    Sha256::digest(component.as_bytes()).into()
}

/// Primary key set plus an optional fallback accepted during rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing {
    primary: KeySet,
    fallback: Option<KeySet>,
}

impl KeyRing {
    pub fn new(primary: KeySet) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: KeySet) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn from_secrets(secret: &str, fallback: Option<&str>) -> TokenResult<Self> {
        let ring = Self::new(KeySet::from_secret(secret)?);
        match fallback.filter(|f| !f.trim().is_empty()) {
            Some(fallback) => Ok(ring.with_fallback(KeySet::from_secret(fallback)?)),
            None => Ok(ring),
        }
    }

    pub fn primary(&self) -> &KeySet {
        &self.primary
    }

    /// Primary first, then the fallback.
    pub fn iter(&self) -> impl Iterator<Item = &KeySet> {
        std::iter::once(&self.primary).chain(self.fallback.as_ref())
    }
}
