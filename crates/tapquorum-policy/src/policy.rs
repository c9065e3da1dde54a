//! Threshold spending policies.
//!
//! A [`ThresholdPolicy`] names n signer keys, the number k of them that must
//! cooperate, and the Taproot internal key the script tree is committed to.

use bitcoin::key::XOnlyPublicKey;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// Smallest admissible threshold.
pub const MIN_THRESHOLD: usize = 2;

/// Largest key count. Thresholds above 16 no longer fit a small-integer push.
pub const MAX_KEYS: usize = 16;

/// x coordinate of the BIP-341 NUMS point `H`, which has no known discrete log.
pub const UNSPENDABLE_KEY: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// The key the script tree is tweaked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InternalKey {
    /// Key-path spendable by the owner.
    Owner(XOnlyPublicKey),
    /// Provably unspendable key path; only the leaves can spend.
    Unspendable,
}

impl InternalKey {
    pub fn x_only(&self) -> Result<XOnlyPublicKey, PolicyError> {
        match self {
            InternalKey::Owner(key) => Ok(*key),
            InternalKey::Unspendable => XOnlyPublicKey::from_slice(&UNSPENDABLE_KEY)
                .map_err(|e| PolicyError::Taproot(format!("NUMS point: {}", e))),
        }
    }

    pub fn is_spendable(&self) -> bool {
        matches!(self, InternalKey::Owner(_))
    }
}

impl FromStr for InternalKey {
    type Err = PolicyError;

    /// Parses `"unspendable"` or a 64-character hex x-only key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unspendable") {
            return Ok(InternalKey::Unspendable);
        }
        XOnlyPublicKey::from_str(s)
            .map(InternalKey::Owner)
            .map_err(|e| PolicyError::InvalidArgument(format!("internal key {:?}: {}", s, e)))
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalKey::Owner(key) => write!(f, "{}", key),
            InternalKey::Unspendable => f.write_str("unspendable"),
        }
    }
}

/// k-of-n over an ordered key list.
///
/// Key order is significant: it fixes the order of enumerated signer subsets,
/// the order of keys inside each leaf script and therefore the output key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdPolicy {
    keys: Vec<XOnlyPublicKey>,
    threshold: usize,
    internal_key: InternalKey,
}

impl ThresholdPolicy {
    pub fn new(
        keys: Vec<XOnlyPublicKey>,
        threshold: usize,
        internal_key: InternalKey,
    ) -> Result<Self, PolicyError> {
        if keys.is_empty() {
            return Err(PolicyError::InvalidArgument("no signer keys".into()));
        }
        if keys.len() > MAX_KEYS {
            return Err(PolicyError::InvalidArgument(format!(
                "{} keys exceeds the maximum of {}",
                keys.len(),
                MAX_KEYS
            )));
        }
        if threshold < MIN_THRESHOLD || threshold > keys.len() {
            return Err(PolicyError::InvalidArgument(format!(
                "threshold {} of {} keys (must be {}..={})",
                threshold,
                keys.len(),
                MIN_THRESHOLD,
                keys.len()
            )));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(PolicyError::InvalidArgument(format!(
                    "duplicate key {}",
                    key
                )));
            }
        }

        Ok(Self {
            keys,
            threshold,
            internal_key,
        })
    }

    pub fn keys(&self) -> &[XOnlyPublicKey] {
        &self.keys
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn internal_key(&self) -> InternalKey {
        self.internal_key
    }

    /// A copy with keys in ascending serialized order.
    ///
    /// Parties that collect keys in different orders sort before building
    /// so they agree on the same output key.
    pub fn sorted(&self) -> Self {
        let mut keys = self.keys.clone();
        keys.sort_by_key(|k| k.serialize());
        Self {
            keys,
            threshold: self.threshold,
            internal_key: self.internal_key,
        }
    }
}
