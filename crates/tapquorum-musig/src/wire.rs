//! Wire encoding for the values participants exchange between rounds.
//!
//! Nonces and partial signatures use their BIP-327 byte encodings
//! (66 and 32 bytes). For transports that carry text, [`RoundMessage`]
//! wraps them in a JSON envelope with hex fields.

use musig2::{PartialSignature, PubNonce};
use serde::{Deserialize, Serialize};

use crate::types::MusigError;

/// Encoded length of a public nonce.
pub const PUBNONCE_LEN: usize = 66;
/// Encoded length of a partial signature.
pub const PARTIAL_SIG_LEN: usize = 32;

/// Current envelope version. Bump on breaking changes.
pub const WIRE_VERSION: u8 = 1;

// ─── Binary encodings ───────────────────────────────────────────────────────

pub fn pubnonce_to_bytes(nonce: &PubNonce) -> [u8; PUBNONCE_LEN] {
    nonce.serialize()
}

pub fn pubnonce_from_bytes(bytes: &[u8]) -> Result<PubNonce, MusigError> {
    if bytes.len() != PUBNONCE_LEN {
        return Err(MusigError::Encoding(format!(
            "public nonce must be {} bytes, got {}",
            PUBNONCE_LEN,
            bytes.len()
        )));
    }
    PubNonce::from_bytes(bytes).map_err(|e| MusigError::Encoding(format!("public nonce: {}", e)))
}

pub fn partial_sig_to_bytes(sig: &PartialSignature) -> [u8; PARTIAL_SIG_LEN] {
    sig.serialize()
}

pub fn partial_sig_from_bytes(bytes: &[u8]) -> Result<PartialSignature, MusigError> {
    if bytes.len() != PARTIAL_SIG_LEN {
        return Err(MusigError::Encoding(format!(
            "partial signature must be {} bytes, got {}",
            PARTIAL_SIG_LEN,
            bytes.len()
        )));
    }
    PartialSignature::from_slice(bytes)
        .map_err(|e| MusigError::Encoding(format!("partial signature: {}", e)))
}

// ─── JSON envelope ──────────────────────────────────────────────────────────

/// One round's contribution from one participant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoundMessage {
    pub version: u8,
    /// Hex of the session message digest, so a receiver can reject
    /// contributions meant for another signing.
    pub message: String,
    pub signer_index: usize,
    #[serde(flatten)]
    pub payload: RoundPayload,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "round", rename_all = "snake_case")]
pub enum RoundPayload {
    /// Round 1: hex-encoded public nonce.
    Nonce { nonce: String },
    /// Round 2: hex-encoded partial signature.
    Partial { partial: String },
}

impl RoundMessage {
    pub fn nonce(message: &[u8; 32], signer_index: usize, nonce: &PubNonce) -> Self {
        Self {
            version: WIRE_VERSION,
            message: hex::encode(message),
            signer_index,
            payload: RoundPayload::Nonce {
                nonce: hex::encode(pubnonce_to_bytes(nonce)),
            },
        }
    }

    pub fn partial(message: &[u8; 32], signer_index: usize, sig: &PartialSignature) -> Self {
        Self {
            version: WIRE_VERSION,
            message: hex::encode(message),
            signer_index,
            payload: RoundPayload::Partial {
                partial: hex::encode(partial_sig_to_bytes(sig)),
            },
        }
    }

    /// Check the envelope belongs to a signing over `message`.
    pub fn check_message(&self, message: &[u8; 32]) -> Result<(), MusigError> {
        if self.version != WIRE_VERSION {
            return Err(MusigError::Encoding(format!(
                "unsupported wire version {}",
                self.version
            )));
        }
        if self.message != hex::encode(message) {
            return Err(MusigError::InvalidArgument(
                "round message is for a different signing".into(),
            ));
        }
        Ok(())
    }

    pub fn decode_nonce(&self) -> Result<PubNonce, MusigError> {
        match &self.payload {
            RoundPayload::Nonce { nonce } => pubnonce_from_bytes(&decode_hex(nonce)?),
            RoundPayload::Partial { .. } => Err(MusigError::Encoding(
                "expected a nonce, got a partial signature".into(),
            )),
        }
    }

    pub fn decode_partial(&self) -> Result<PartialSignature, MusigError> {
        match &self.payload {
            RoundPayload::Partial { partial } => partial_sig_from_bytes(&decode_hex(partial)?),
            RoundPayload::Nonce { .. } => Err(MusigError::Encoding(
                "expected a partial signature, got a nonce".into(),
            )),
        }
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, MusigError> {
    hex::decode(s).map_err(|e| MusigError::Encoding(format!("invalid hex: {}", e)))
}

pub fn serialize_message(msg: &RoundMessage) -> Result<String, MusigError> {
    serde_json::to_string(msg).map_err(|e| MusigError::Encoding(e.to_string()))
}

pub fn deserialize_message(json: &str) -> Result<RoundMessage, MusigError> {
    serde_json::from_str(json).map_err(|e| MusigError::Encoding(e.to_string()))
}
