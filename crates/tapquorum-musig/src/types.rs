//! Shared types for MuSig2 sessions: errors, states and tweaks.

use secp256k1::Scalar;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusigError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: expected {expected}, session is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },

    #[error("Verification failed: {0}")]
    VerificationFailure(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl MusigError {
    /// Whether the session (and any key material it touched) must be destroyed.
    ///
    /// Only security violations are fatal. Everything else is recoverable at
    /// the caller's discretion, though a failed verification is never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MusigError::SecurityViolation(_))
    }
}

/// Position of a [`crate::MusigSession`] in the signing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Created,
    NoncesGenerated,
    NoncesProcessed,
    PartiallySigned,
    Aggregated,
    Adapted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::NoncesGenerated => "nonces-generated",
            SessionState::NoncesProcessed => "nonces-processed",
            SessionState::PartiallySigned => "partially-signed",
            SessionState::Aggregated => "aggregated",
            SessionState::Adapted => "adapted",
        };
        f.write_str(name)
    }
}

/// A tweak applied to the aggregated key before any nonce is generated.
///
/// Every participant must apply the same tweaks in the same order, otherwise
/// the resulting signature is valid under a key nobody expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTweak {
    /// `Q = P + t*G` on the full (non x-only) aggregate.
    Plain(Scalar),
    /// `Q = with_even_y(P) + t*G`, the BIP-341 style x-only tweak.
    XOnly(Scalar),
    /// BIP-341 TapTweak committing to an optional script tree Merkle root.
    /// `None` commits to an empty tree (key-path only output).
    Taproot(Option<[u8; 32]>),
}
