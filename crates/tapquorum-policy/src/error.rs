use bitcoin::key::XOnlyPublicKey;
use tapquorum_musig::MusigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Signer set of {} keys matches {matches} leaves, expected exactly one", signers.len())]
    AmbiguousOrUnsatisfiableLeaf {
        signers: Vec<XOnlyPublicKey>,
        matches: usize,
    },

    #[error("Taproot construction failed: {0}")]
    Taproot(String),

    #[error("Witness error: {0}")]
    Witness(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("MuSig2 error: {0}")]
    Musig(#[from] MusigError),
}

impl PolicyError {
    /// Whether the caller must abort and destroy key material.
    pub fn is_fatal(&self) -> bool {
        match self {
            PolicyError::SecurityViolation(_) => true,
            PolicyError::Musig(e) => e.is_fatal(),
            _ => false,
        }
    }
}
