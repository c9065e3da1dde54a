//! MuSig2 (BIP-327) signing sessions.
//!
//! Bridges between our secp256k1 0.29 types and the musig2 crate's types
//! via byte serialization. Both use libsecp256k1 underneath.
//!
//! A session is created once per (participant set, message) pair and moves
//! through the protocol rounds in lockstep with the other participants:
//!
//! ```text
//! Created ─► NoncesGenerated ─► NoncesProcessed ─► PartiallySigned ─► Aggregated ─► (Adapted)
//! ```
//!
//!   Round 1: every signer calls [`MusigSession::generate_nonce`] and shares
//!            the returned [`PubNonce`].
//!   Round 2: once all public nonces are known, [`MusigSession::process_nonces`]
//!            fixes the aggregate nonce, each signer produces a partial
//!            signature with [`MusigSession::sign`], and any party can combine
//!            them with [`MusigSession::aggregate_signatures`].
//!
//! The final signature is a plain BIP-340 Schnorr signature under
//! [`MusigSession::aggregated_key`].

use std::fmt;

use musig2::secp::{MaybePoint, Point, Scalar as MusigScalar};
use musig2::{AggNonce, KeyAggContext, LiftedSignature, PartialSignature, PubNonce, SecNonce};
use secp256k1::{schnorr, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::types::{MusigError, SessionState, SessionTweak};

// ─── Type conversion helpers ────────────────────────────────────────────────

/// Convert our secp256k1 0.29 PublicKey to musig2's secp256k1 PublicKey.
pub(crate) fn pubkey_to_musig(pk: &PublicKey) -> Result<musig2::secp256k1::PublicKey, MusigError> {
    musig2::secp256k1::PublicKey::from_slice(&pk.serialize())
        .map_err(|e| MusigError::InvalidArgument(format!("pubkey conversion: {}", e)))
}

/// Convert musig2's secp256k1 PublicKey back to our secp256k1 0.29 PublicKey.
pub(crate) fn pubkey_from_musig(
    pk: &musig2::secp256k1::PublicKey,
) -> Result<PublicKey, MusigError> {
    PublicKey::from_slice(&pk.serialize())
        .map_err(|e| MusigError::Encoding(format!("pubkey conversion: {}", e)))
}

/// Convert our secp256k1 0.29 SecretKey to musig2's secp256k1 SecretKey.
pub(crate) fn seckey_to_musig(sk: &SecretKey) -> Result<musig2::secp256k1::SecretKey, MusigError> {
    #[allow(deprecated)]
    musig2::secp256k1::SecretKey::from_slice(&sk.secret_bytes())
        .map_err(|e| MusigError::InvalidArgument(format!("seckey conversion: {}", e)))
}

/// Convert a non-zero 32-byte big-endian scalar into musig2's scalar type.
pub(crate) fn scalar_to_musig(bytes: &[u8; 32]) -> Result<MusigScalar, MusigError> {
    #[allow(deprecated)]
    let sk = musig2::secp256k1::SecretKey::from_slice(bytes)
        .map_err(|e| MusigError::InvalidArgument(format!("scalar out of range: {}", e)))?;
    Ok(MusigScalar::from(sk))
}

/// Convert a point into musig2's adaptor point representation.
pub(crate) fn point_to_musig(pk: &PublicKey) -> Result<MaybePoint, MusigError> {
    let point = Point::from(pubkey_to_musig(pk)?);
    Ok(MaybePoint::Valid(point))
}

/// Lift an x-only key to the full key with even Y, as BIP-340 does.
fn lift_x_only(key: &XOnlyPublicKey) -> PublicKey {
    key.public_key(secp256k1::Parity::Even)
}

// ─── Key Aggregation ────────────────────────────────────────────────────────

/// Build the BIP-327 key aggregation context for an ordered participant list.
///
/// Unlike simple key addition, MuSig2 key aggregation includes KeyAgg
/// coefficients that prevent rogue-key attacks. The participant order is
/// part of the result.
pub fn key_agg_context(participants: &[PublicKey]) -> Result<KeyAggContext, MusigError> {
    if participants.is_empty() {
        return Err(MusigError::InvalidArgument("no participant keys".into()));
    }
    for (i, pk) in participants.iter().enumerate() {
        let xonly = pk.x_only_public_key().0;
        if participants[..i]
            .iter()
            .any(|other| other.x_only_public_key().0 == xonly)
        {
            return Err(MusigError::InvalidArgument(format!(
                "duplicate participant key {}",
                xonly
            )));
        }
    }

    let musig_keys = participants
        .iter()
        .map(pubkey_to_musig)
        .collect::<Result<Vec<_>, _>>()?;

    KeyAggContext::new(musig_keys)
        .map_err(|e| MusigError::InvalidArgument(format!("key aggregation: {}", e)))
}

/// Aggregate x-only keys (lifted to even Y) into one x-only MuSig2 key.
///
/// This is the key a k-of-k MuSig leaf commits to; a [`MusigSession`]
/// created with [`MusigSession::from_x_only`] over the same keys in the same
/// order signs for it.
pub fn aggregate_x_only(keys: &[XOnlyPublicKey]) -> Result<XOnlyPublicKey, MusigError> {
    let lifted: Vec<PublicKey> = keys.iter().map(lift_x_only).collect();
    let ctx = key_agg_context(&lifted)?;
    let agg_pk: musig2::secp256k1::PublicKey = ctx.aggregated_pubkey();
    Ok(pubkey_from_musig(&agg_pk)?.x_only_public_key().0)
}

/// Verify a final BIP-340 signature.
pub fn verify_signature(
    key: &XOnlyPublicKey,
    signature: &schnorr::Signature,
    message: &[u8; 32],
) -> Result<(), MusigError> {
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(*message);
    secp.verify_schnorr(signature, &msg, key)
        .map_err(|e| MusigError::VerificationFailure(format!("schnorr signature: {}", e)))
}

// ─── Signing nonce ──────────────────────────────────────────────────────────

/// One signer's secret nonce, bound to the session that minted it.
///
/// CRITICAL: a secret nonce used for two different challenges reveals the
/// secret key. This type is deliberately neither `Clone` nor serializable,
/// and [`MusigSession::sign`] takes it by value, so it can be spent once.
pub struct SigningNonce {
    session_id: [u8; 32],
    signer_index: usize,
    public: PubNonce,
    secret: SecNonce,
}

impl SigningNonce {
    /// The public half, to be shared with the other participants.
    pub fn public_nonce(&self) -> &PubNonce {
        &self.public
    }

    /// Position of the owning signer in the participant list.
    pub fn signer_index(&self) -> usize {
        self.signer_index
    }
}

impl fmt::Debug for SigningNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningNonce")
            .field("signer_index", &self.signer_index)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// A cooperative MuSig2 signing session over one 32-byte message.
///
/// Sessions are never reused across messages. Dropping a session (or calling
/// [`MusigSession::abort`]) at any point discards all of its state; secret
/// nonces live in [`SigningNonce`] values owned by the signers.
pub struct MusigSession {
    id: [u8; 32],
    participants: Vec<PublicKey>,
    message: [u8; 32],
    key_agg_ctx: KeyAggContext,
    untweaked_key: XOnlyPublicKey,
    tweaks: Vec<SessionTweak>,
    pub(crate) adaptor_point: Option<PublicKey>,
    public_nonces: Vec<PubNonce>,
    pub(crate) agg_nonce: Option<AggNonce>,
    signed: Vec<bool>,
    pub(crate) state: SessionState,
}

impl MusigSession {
    /// Start a session for an ordered participant list and a message digest.
    ///
    /// Fails if `participants` is empty or contains the same x-only key twice.
    pub fn new(participants: &[PublicKey], message: [u8; 32]) -> Result<Self, MusigError> {
        let key_agg_ctx = key_agg_context(participants)?;
        let agg_pk: musig2::secp256k1::PublicKey = key_agg_ctx.aggregated_pubkey();
        let untweaked_key = pubkey_from_musig(&agg_pk)?.x_only_public_key().0;

        let mut id = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut id);

        log::debug!(
            "musig session {} created for {} participants",
            hex::encode(&id[..4]),
            participants.len()
        );

        Ok(Self {
            id,
            participants: participants.to_vec(),
            message,
            key_agg_ctx,
            untweaked_key,
            tweaks: Vec::new(),
            adaptor_point: None,
            public_nonces: Vec::new(),
            agg_nonce: None,
            signed: vec![false; participants.len()],
            state: SessionState::Created,
        })
    }

    /// Start a session for x-only participant keys, each lifted to even Y.
    ///
    /// Signers whose secret key has an odd-Y public key are handled in
    /// [`MusigSession::sign`] by negating their key.
    pub fn from_x_only(
        participants: &[XOnlyPublicKey],
        message: [u8; 32],
    ) -> Result<Self, MusigError> {
        let lifted: Vec<PublicKey> = participants.iter().map(lift_x_only).collect();
        Self::new(&lifted, message)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Random identifier binding nonces to this session.
    pub fn id(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn message(&self) -> &[u8; 32] {
        &self.message
    }

    pub fn participants(&self) -> &[PublicKey] {
        &self.participants
    }

    pub fn tweaks(&self) -> &[SessionTweak] {
        &self.tweaks
    }

    /// The aggregated key before any tweak.
    pub fn untweaked_key(&self) -> XOnlyPublicKey {
        self.untweaked_key
    }

    /// The x-only key the final signature verifies under (tweaks included).
    pub fn aggregated_key(&self) -> Result<XOnlyPublicKey, MusigError> {
        Ok(self.aggregated_pubkey()?.x_only_public_key().0)
    }

    /// The full aggregated key with parity (tweaks included).
    pub fn aggregated_pubkey(&self) -> Result<PublicKey, MusigError> {
        let agg_pk: musig2::secp256k1::PublicKey = self.key_agg_ctx.aggregated_pubkey();
        pubkey_from_musig(&agg_pk)
    }

    /// Position of `key` in the participant list, compared by x-only key.
    pub fn participant_index(&self, key: &XOnlyPublicKey) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.x_only_public_key().0 == *key)
    }

    pub(crate) fn require(
        &self,
        allowed: &[SessionState],
        expected: &'static str,
    ) -> Result<(), MusigError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MusigError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    pub(crate) fn short_id(&self) -> String {
        hex::encode(&self.id[..4])
    }

    // ─── Setup ──────────────────────────────────────────────────────────────

    /// Tweak the aggregated key. Must happen before any nonce is generated.
    pub fn apply_tweak(&mut self, tweak: SessionTweak) -> Result<(), MusigError> {
        self.require(&[SessionState::Created], "created")?;

        let ctx = self.key_agg_ctx.clone();
        let tweaked = match tweak {
            SessionTweak::Plain(t) => ctx.with_plain_tweak(scalar_to_musig(&t.to_be_bytes())?),
            SessionTweak::XOnly(t) => ctx.with_xonly_tweak(scalar_to_musig(&t.to_be_bytes())?),
            SessionTweak::Taproot(Some(root)) => ctx.with_taproot_tweak(&root),
            SessionTweak::Taproot(None) => ctx.with_unspendable_taproot_tweak(),
        }
        .map_err(|e| MusigError::InvalidArgument(format!("tweak: {}", e)))?;

        self.key_agg_ctx = tweaked;
        self.tweaks.push(tweak);
        log::debug!("musig session {} applied {:?}", self.short_id(), tweak);
        Ok(())
    }

    /// Bind the final signature to the discrete log of `point`.
    ///
    /// Aggregation then yields an [`crate::AdaptorSignature`] which only
    /// becomes a valid signature once the adaptor secret is added.
    pub fn use_adaptor(&mut self, point: PublicKey) -> Result<(), MusigError> {
        self.require(&[SessionState::Created], "created")?;
        if self.adaptor_point.is_some() {
            return Err(MusigError::InvalidArgument(
                "adaptor point already set".into(),
            ));
        }
        self.adaptor_point = Some(point);
        Ok(())
    }

    pub(crate) fn musig_adaptor_point(&self) -> Result<MaybePoint, MusigError> {
        match &self.adaptor_point {
            Some(point) => point_to_musig(point),
            None => Ok(MaybePoint::Infinity),
        }
    }

    // ─── Round 1 ────────────────────────────────────────────────────────────

    /// Generate a nonce pair for the participant owning `secret_key`.
    ///
    /// Nonce material is derived from a fresh random seed, the secret key,
    /// the (tweaked) aggregated key and the session message.
    pub fn generate_nonce(
        &mut self,
        secret_key: &SecretKey,
    ) -> Result<(SigningNonce, PubNonce), MusigError> {
        self.require(
            &[SessionState::Created, SessionState::NoncesGenerated],
            "created or nonces-generated",
        )?;
        let (signer_index, signing_key) = self.resolve_signer(secret_key)?;

        let sk_m = seckey_to_musig(&signing_key)?;
        let agg_pk: musig2::secp256k1::PublicKey = self.key_agg_ctx.aggregated_pubkey();

        let mut nonce_seed = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_seed);

        let secret = SecNonce::build(nonce_seed)
            .with_seckey(sk_m)
            .with_aggregated_pubkey(agg_pk)
            .with_message(&self.message)
            .build();
        zeroize::Zeroize::zeroize(&mut nonce_seed);
        let public = secret.public_nonce();

        self.state = SessionState::NoncesGenerated;
        log::debug!(
            "musig session {} generated nonce for signer {}",
            self.short_id(),
            signer_index
        );

        Ok((
            SigningNonce {
                session_id: self.id,
                signer_index,
                public: public.clone(),
                secret,
            },
            public,
        ))
    }

    /// Fix the aggregate nonce from every participant's public nonce.
    ///
    /// `public_nonces` must hold exactly one nonce per participant, in
    /// participant order. Can only be called once per session.
    pub fn process_nonces(&mut self, public_nonces: &[PubNonce]) -> Result<(), MusigError> {
        self.require(
            &[SessionState::Created, SessionState::NoncesGenerated],
            "created or nonces-generated",
        )?;
        if public_nonces.len() != self.participants.len() {
            return Err(MusigError::InvalidArgument(format!(
                "expected {} public nonces, got {}",
                self.participants.len(),
                public_nonces.len()
            )));
        }

        let agg_nonce = AggNonce::sum(public_nonces);
        self.public_nonces = public_nonces.to_vec();
        self.agg_nonce = Some(agg_nonce);
        self.state = SessionState::NoncesProcessed;
        log::debug!(
            "musig session {} aggregated {} nonces",
            self.short_id(),
            public_nonces.len()
        );
        Ok(())
    }

    pub(crate) fn aggregate_nonce(&self) -> Result<&AggNonce, MusigError> {
        self.agg_nonce.as_ref().ok_or(MusigError::InvalidState {
            expected: "nonces-processed",
            actual: self.state,
        })
    }

    // ─── Round 2 ────────────────────────────────────────────────────────────

    /// Produce this signer's partial signature. The nonce is consumed.
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        nonce: SigningNonce,
    ) -> Result<PartialSignature, MusigError> {
        self.require(
            &[SessionState::NoncesProcessed, SessionState::PartiallySigned],
            "nonces-processed",
        )?;

        if nonce.session_id != self.id {
            log::warn!(
                "musig session {} refused a nonce minted by another session",
                self.short_id()
            );
            return Err(MusigError::SecurityViolation(
                "nonce was generated for a different session".into(),
            ));
        }

        let (signer_index, signing_key) = self.resolve_signer(secret_key)?;
        if signer_index != nonce.signer_index {
            return Err(MusigError::InvalidArgument(format!(
                "nonce belongs to signer {}, key belongs to signer {}",
                nonce.signer_index, signer_index
            )));
        }
        if self.signed[signer_index] {
            log::warn!(
                "musig session {} refused a second signature from signer {}",
                self.short_id(),
                signer_index
            );
            return Err(MusigError::SecurityViolation(format!(
                "signer {} already signed in this session",
                signer_index
            )));
        }
        if self.public_nonces[signer_index].serialize() != nonce.public.serialize() {
            return Err(MusigError::InvalidArgument(format!(
                "nonce for signer {} was not part of the processed nonce set",
                signer_index
            )));
        }

        let sk_m = seckey_to_musig(&signing_key)?;
        let agg_nonce = self.aggregate_nonce()?.clone();

        let partial: PartialSignature = match self.adaptor_point {
            None => musig2::sign_partial(
                &self.key_agg_ctx,
                sk_m,
                nonce.secret,
                &agg_nonce,
                &self.message,
            ),
            Some(_) => musig2::adaptor::sign_partial(
                &self.key_agg_ctx,
                sk_m,
                nonce.secret,
                &agg_nonce,
                self.musig_adaptor_point()?,
                &self.message,
            ),
        }
        .map_err(|e| MusigError::InvalidArgument(format!("partial sign: {}", e)))?;

        self.signed[signer_index] = true;
        self.state = SessionState::PartiallySigned;
        log::debug!(
            "musig session {} partial signature from signer {}",
            self.short_id(),
            signer_index
        );
        Ok(partial)
    }

    /// Check one participant's partial signature before aggregation.
    pub fn verify_partial(
        &self,
        signer: &PublicKey,
        public_nonce: &PubNonce,
        partial: &PartialSignature,
    ) -> Result<(), MusigError> {
        self.require(
            &[
                SessionState::NoncesProcessed,
                SessionState::PartiallySigned,
                SessionState::Aggregated,
                SessionState::Adapted,
            ],
            "nonces-processed",
        )?;

        let index = self
            .participant_index(&signer.x_only_public_key().0)
            .ok_or_else(|| MusigError::InvalidArgument("signer is not a participant".into()))?;
        let pk_m = pubkey_to_musig(&self.participants[index])?;
        let agg_nonce = self.aggregate_nonce()?;

        let result = match self.adaptor_point {
            None => musig2::verify_partial(
                &self.key_agg_ctx,
                *partial,
                agg_nonce,
                pk_m,
                public_nonce,
                &self.message,
            ),
            Some(_) => musig2::adaptor::verify_partial(
                &self.key_agg_ctx,
                *partial,
                agg_nonce,
                self.musig_adaptor_point()?,
                pk_m,
                public_nonce,
                &self.message,
            ),
        };

        result.map_err(|e| {
            log::warn!(
                "musig session {} rejected partial signature from signer {}",
                self.short_id(),
                index
            );
            MusigError::VerificationFailure(format!("partial signature of signer {}: {}", index, e))
        })
    }

    /// Combine all partial signatures into the final Schnorr signature.
    ///
    /// `partials` holds one partial per participant. The combined signature
    /// is verified against the aggregated key before it is returned; a bad
    /// partial surfaces here as [`MusigError::VerificationFailure`].
    pub fn aggregate_signatures(
        &mut self,
        partials: &[PartialSignature],
    ) -> Result<schnorr::Signature, MusigError> {
        self.require(
            &[SessionState::NoncesProcessed, SessionState::PartiallySigned],
            "nonces-processed or partially-signed",
        )?;
        if self.adaptor_point.is_some() {
            return Err(MusigError::InvalidArgument(
                "session uses an adaptor point, aggregate an adaptor signature instead".into(),
            ));
        }
        self.check_partial_count(partials)?;

        let agg_nonce = self.aggregate_nonce()?;
        let lifted: LiftedSignature = musig2::aggregate_partial_signatures(
            &self.key_agg_ctx,
            agg_nonce,
            partials.iter().copied(),
            &self.message,
        )
        .map_err(|e| MusigError::VerificationFailure(format!("sig aggregation: {}", e)))?;

        let signature = schnorr::Signature::from_slice(&lifted.serialize())
            .map_err(|e| MusigError::Encoding(format!("schnorr signature: {}", e)))?;
        verify_signature(&self.aggregated_key()?, &signature, &self.message)?;

        self.state = SessionState::Aggregated;
        log::info!(
            "musig session {} aggregated {} partial signatures",
            self.short_id(),
            partials.len()
        );
        Ok(signature)
    }

    pub(crate) fn check_partial_count(&self, partials: &[PartialSignature]) -> Result<(), MusigError> {
        if partials.len() != self.participants.len() {
            return Err(MusigError::InvalidArgument(format!(
                "expected {} partial signatures, got {}",
                self.participants.len(),
                partials.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn key_agg_ctx(&self) -> &KeyAggContext {
        &self.key_agg_ctx
    }

    /// Discard the session. Nothing carries over into later sessions.
    pub fn abort(self) {
        log::debug!(
            "musig session {} aborted in state {}",
            self.short_id(),
            self.state
        );
    }

    /// Map a secret key to its participant slot, negating it when the
    /// participant key was given with the opposite Y parity.
    fn resolve_signer(&self, secret_key: &SecretKey) -> Result<(usize, SecretKey), MusigError> {
        let secp = Secp256k1::signing_only();
        let pk = secret_key.public_key(&secp);
        let index = self
            .participant_index(&pk.x_only_public_key().0)
            .ok_or_else(|| {
                MusigError::InvalidArgument("secret key does not belong to a participant".into())
            })?;
        let signing_key = if self.participants[index] == pk {
            *secret_key
        } else {
            secret_key.negate()
        };
        Ok((index, signing_key))
    }
}
