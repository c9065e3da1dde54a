//! # tapquorum-musig
//!
//! MuSig2 (BIP-327) cooperative Schnorr signing for tapquorum.
//!
//! A [`MusigSession`] aggregates an ordered set of public keys into one
//! x-only key and drives the two-round signing protocol that produces a
//! single BIP-340 signature under it. Sessions support plain, x-only and
//! Taproot tweaks of the aggregated key, and adaptor signatures.
//!
//! The crate does no networking. Callers move [`musig2::PubNonce`] and
//! [`musig2::PartialSignature`] values between participants themselves,
//! optionally through the encodings in [`wire`].

pub mod adaptor;
pub mod session;
pub mod types;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_utils;

pub use adaptor::AdaptorSignature;
pub use musig2::{PartialSignature, PubNonce};
pub use session::{aggregate_x_only, key_agg_context, verify_signature, MusigSession, SigningNonce};
pub use types::{MusigError, SessionState, SessionTweak};
