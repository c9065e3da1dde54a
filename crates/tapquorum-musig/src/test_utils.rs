//! Shared test utilities for tapquorum-musig tests.

use secp256k1::{PublicKey, Secp256k1, SecretKey};

/// Generate a deterministic keypair from a seed byte.
///
/// The secret key is `[0x01, 0x00, ..., 0x00, seed]` (32 bytes).
pub fn test_keypair(seed_byte: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut bytes = [0u8; 32];
    bytes[31] = seed_byte;
    bytes[0] = 0x01;
    let sk = SecretKey::from_slice(&bytes).unwrap();
    let pk = sk.public_key(&secp);
    (sk, pk)
}
