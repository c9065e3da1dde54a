//! Shared test utilities for tapquorum-policy tests.
//!
//! Provides deterministic keypair generation and policy construction
//! helpers used across multiple test modules.

use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::policy::{InternalKey, ThresholdPolicy};

/// Generate a deterministic keypair from a seed byte.
///
/// The secret key is `[0x01, 0x00, ..., 0x00, seed]` (32 bytes).
/// Different seed bytes produce different keys.
pub fn test_keypair(seed_byte: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut secret_bytes = [0u8; 32];
    secret_bytes[31] = seed_byte;
    secret_bytes[0] = 0x01;
    let sk = SecretKey::from_slice(&secret_bytes).unwrap();
    let pk = sk.public_key(&secp);
    (sk, pk)
}

/// x-only keys of `test_keypair(1) ..= test_keypair(n)`.
pub fn test_xonly_keys(n: usize) -> Vec<XOnlyPublicKey> {
    (1..=n as u8)
        .map(|i| test_keypair(i).1.x_only_public_key().0)
        .collect()
}

/// k-of-n over `test_xonly_keys(n)` with an unspendable internal key.
pub fn test_policy(n: usize, k: usize) -> ThresholdPolicy {
    ThresholdPolicy::new(test_xonly_keys(n), k, InternalKey::Unspendable).unwrap()
}
