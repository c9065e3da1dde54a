//! Adaptor signatures on top of MuSig2 sessions.
//!
//! With an adaptor point `T = t*G` set via [`MusigSession::use_adaptor`],
//! the aggregated signature is off by the unknown scalar `t`. Adding `t`
//! turns it into a valid BIP-340 signature, and anyone holding both the
//! adaptor signature and the published signature learns `t`.

use musig2::secp::MaybeScalar;
use musig2::{LiftedSignature, PartialSignature};
use secp256k1::{schnorr, PublicKey, Secp256k1, SecretKey};

use crate::session::{seckey_to_musig, verify_signature, MusigSession};
use crate::types::{MusigError, SessionState};

/// An aggregated signature that still lacks the adaptor secret.
#[derive(Debug, Clone)]
pub struct AdaptorSignature {
    inner: musig2::adaptor::AdaptorSignature,
    point: PublicKey,
}

impl AdaptorSignature {
    /// The adaptor point this signature is locked to.
    pub fn adaptor_point(&self) -> &PublicKey {
        &self.point
    }

    /// Recover the adaptor secret from the completed signature.
    pub fn reveal_secret(&self, completed: &schnorr::Signature) -> Result<SecretKey, MusigError> {
        let lifted = LiftedSignature::from_bytes(completed.as_ref())
            .map_err(|e| MusigError::Encoding(format!("lifted signature: {}", e)))?;

        let secret: MaybeScalar = self.inner.reveal_secret(&lifted).ok_or_else(|| {
            MusigError::VerificationFailure(
                "signature does not complete this adaptor signature".into(),
            )
        })?;

        let secret = SecretKey::from_slice(&secret.serialize())
            .map_err(|e| MusigError::VerificationFailure(format!("adaptor secret: {}", e)))?;

        let secp = Secp256k1::signing_only();
        if secret.public_key(&secp) != self.point {
            return Err(MusigError::VerificationFailure(
                "revealed secret does not match the adaptor point".into(),
            ));
        }
        Ok(secret)
    }
}

impl MusigSession {
    /// Combine partial signatures into an [`AdaptorSignature`].
    pub fn aggregate_adaptor_signature(
        &mut self,
        partials: &[PartialSignature],
    ) -> Result<AdaptorSignature, MusigError> {
        self.require(
            &[SessionState::NoncesProcessed, SessionState::PartiallySigned],
            "nonces-processed or partially-signed",
        )?;
        let point = self.adaptor_point.ok_or_else(|| {
            MusigError::InvalidArgument("session has no adaptor point".into())
        })?;
        let inner = self.aggregate_adaptor_inner(partials)?;

        self.state = SessionState::Aggregated;
        log::info!(
            "musig session {} aggregated adaptor signature",
            self.short_id()
        );
        Ok(AdaptorSignature { inner, point })
    }

    /// Complete an adaptor signature with the adaptor secret.
    ///
    /// The secret must be the discrete log of the session's adaptor point.
    /// The result is verified before it is returned.
    pub fn adapt(
        &mut self,
        adaptor_signature: &AdaptorSignature,
        secret: &SecretKey,
    ) -> Result<schnorr::Signature, MusigError> {
        self.require(&[SessionState::Aggregated], "aggregated")?;

        let secp = Secp256k1::signing_only();
        if secret.public_key(&secp) != adaptor_signature.point {
            return Err(MusigError::InvalidArgument(
                "secret does not match the adaptor point".into(),
            ));
        }

        let scalar = musig2::secp::Scalar::from(seckey_to_musig(secret)?);
        let lifted: LiftedSignature = adaptor_signature.inner.adapt(scalar).ok_or_else(|| {
            MusigError::VerificationFailure("adapted signature is invalid".into())
        })?;

        let signature = schnorr::Signature::from_slice(&lifted.serialize())
            .map_err(|e| MusigError::Encoding(format!("schnorr signature: {}", e)))?;
        verify_signature(&self.aggregated_key()?, &signature, self.message())?;

        self.state = SessionState::Adapted;
        Ok(signature)
    }

    /// Learn the adaptor secret from a published signature.
    ///
    /// Re-aggregates the adaptor signature from the same partial signatures
    /// that produced `completed`, so a participant who dropped the
    /// [`AdaptorSignature`] can still extract the secret.
    pub fn extract_adaptor_secret(
        &self,
        completed: &schnorr::Signature,
        partials: &[PartialSignature],
    ) -> Result<SecretKey, MusigError> {
        self.require(
            &[
                SessionState::NoncesProcessed,
                SessionState::PartiallySigned,
                SessionState::Aggregated,
                SessionState::Adapted,
            ],
            "nonces-processed",
        )?;
        let point = self.adaptor_point.ok_or_else(|| {
            MusigError::InvalidArgument("session has no adaptor point".into())
        })?;
        verify_signature(&self.aggregated_key()?, completed, self.message())?;

        let inner = self.aggregate_adaptor_inner(partials)?;
        AdaptorSignature { inner, point }.reveal_secret(completed)
    }

    fn aggregate_adaptor_inner(
        &self,
        partials: &[PartialSignature],
    ) -> Result<musig2::adaptor::AdaptorSignature, MusigError> {
        self.check_partial_count(partials)?;
        musig2::adaptor::aggregate_partial_signatures(
            self.key_agg_ctx(),
            self.aggregate_nonce()?,
            self.musig_adaptor_point()?,
            partials.iter().copied(),
            self.message(),
        )
        .map_err(|e| MusigError::VerificationFailure(format!("adaptor aggregation: {}", e)))
    }
}
