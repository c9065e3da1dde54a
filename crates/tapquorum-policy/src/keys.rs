//! Secret key custody for one signer process.
//!
//! A [`SignerKeys`] handle is created by the caller, passed to whatever needs
//! to sign, and closed when signing is over. Secret bytes are wiped on
//! [`SignerKeys::close`] and on drop. A closed handle refuses every further
//! use with a fatal [`PolicyError::SecurityViolation`].

use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::error::PolicyError;

struct Entry {
    public: XOnlyPublicKey,
    secret: Zeroizing<[u8; 32]>,
}

/// Secret keys held by one signer, indexed by x-only public key.
#[derive(Default)]
pub struct SignerKeys {
    entries: Vec<Entry>,
    closed: bool,
}

impl SignerKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take custody of a secret key. Returns its x-only public key.
    pub fn insert(&mut self, secret: &SecretKey) -> Result<XOnlyPublicKey, PolicyError> {
        self.ensure_open()?;
        Ok(self.hold(secret))
    }

    fn hold(&mut self, secret: &SecretKey) -> XOnlyPublicKey {
        let secp = Secp256k1::signing_only();
        let public = secret.x_only_public_key(&secp).0;
        self.entries.retain(|e| e.public != public);
        self.entries.push(Entry {
            public,
            secret: Zeroizing::new(secret.secret_bytes()),
        });
        public
    }

    /// Secret key for `key`, or `InvalidArgument` if it is not held here.
    pub fn secret_for(&self, key: &XOnlyPublicKey) -> Result<SecretKey, PolicyError> {
        self.ensure_open()?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.public == *key)
            .ok_or_else(|| PolicyError::InvalidArgument(format!("no secret key for {}", key)))?;
        SecretKey::from_slice(&entry.secret[..])
            .map_err(|e| PolicyError::InvalidArgument(format!("stored secret: {}", e)))
    }

    pub fn public_keys(&self) -> Vec<XOnlyPublicKey> {
        self.entries.iter().map(|e| e.public).collect()
    }

    pub fn contains(&self, key: &XOnlyPublicKey) -> bool {
        self.entries.iter().any(|e| e.public == *key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `SecurityViolation` once the handle has been closed.
    pub fn ensure_open(&self) -> Result<(), PolicyError> {
        if self.closed {
            log::warn!("signer key custody used after close");
            return Err(PolicyError::SecurityViolation(
                "signer keys used after close".into(),
            ));
        }
        Ok(())
    }

    /// Wipe and drop every held secret. The handle cannot be used again.
    pub fn close(&mut self) {
        let count = self.entries.len();
        // Zeroizing wipes each buffer as it is dropped.
        self.entries.clear();
        self.closed = true;
        log::debug!("closed signer key custody ({} keys)", count);
    }
}

impl FromIterator<SecretKey> for SignerKeys {
    fn from_iter<I: IntoIterator<Item = SecretKey>>(iter: I) -> Self {
        let mut keys = SignerKeys::new();
        for sk in iter {
            keys.hold(&sk);
        }
        keys
    }
}

impl Drop for SignerKeys {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}

impl std::fmt::Debug for SignerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerKeys")
            .field("public_keys", &self.public_keys())
            .finish()
    }
}
