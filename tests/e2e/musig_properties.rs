//! Randomized MuSig2 session checks.
//!
//! Each test draws fresh signer sets and messages so repeated runs cover
//! different keys. Signatures are checked against plain BIP-340
//! verification, independent of the session that produced them.
//!
//! Run with:
//!   cargo test -p tapquorum-e2e --test musig_properties

use rand::{Rng, RngCore};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};

use tapquorum_musig::wire::{partial_sig_from_bytes, partial_sig_to_bytes};
use tapquorum_musig::{
    verify_signature, MusigError, MusigSession, PartialSignature, PubNonce, SessionState,
    SessionTweak,
};

const ROUNDS: usize = 8;

fn random_signers() -> (Vec<SecretKey>, Vec<PublicKey>) {
    let secp = Secp256k1::new();
    let mut rng = rand::thread_rng();
    let n = rng.gen_range(2..=5);
    (0..n)
        .map(|_| {
            let sk = SecretKey::new(&mut rng);
            (sk, sk.public_key(&secp))
        })
        .unzip()
}

fn random_message() -> [u8; 32] {
    let mut message = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut message);
    message
}

/// Run both rounds and return the session with every partial signature.
fn run_rounds(
    secrets: &[SecretKey],
    pubkeys: &[PublicKey],
    message: [u8; 32],
    setup: impl FnOnce(&mut MusigSession),
) -> (MusigSession, Vec<PubNonce>, Vec<PartialSignature>) {
    let mut session = MusigSession::new(pubkeys, message).unwrap();
    setup(&mut session);

    let (nonces, publics): (Vec<_>, Vec<_>) = secrets
        .iter()
        .map(|sk| session.generate_nonce(sk).unwrap())
        .unzip();
    session.process_nonces(&publics).unwrap();

    let partials = secrets
        .iter()
        .zip(nonces)
        .map(|(sk, nonce)| session.sign(sk, nonce).unwrap())
        .collect();
    (session, publics, partials)
}

#[test]
fn test_random_sessions_produce_valid_signatures() {
    for _ in 0..ROUNDS {
        let (secrets, pubkeys) = random_signers();
        let message = random_message();

        let (mut session, publics, partials) = run_rounds(&secrets, &pubkeys, message, |_| {});
        for ((pk, nonce), partial) in pubkeys.iter().zip(&publics).zip(&partials) {
            session.verify_partial(pk, nonce, partial).unwrap();
        }

        let sig = session.aggregate_signatures(&partials).unwrap();
        assert_eq!(session.state(), SessionState::Aggregated);
        verify_signature(&session.aggregated_key().unwrap(), &sig, &message).unwrap();

        // A different message does not verify.
        let mut other = message;
        other[0] ^= 0x01;
        assert!(verify_signature(&session.aggregated_key().unwrap(), &sig, &other).is_err());
    }
}

#[test]
fn test_random_partial_is_rejected() {
    let mut rng = rand::thread_rng();
    for _ in 0..ROUNDS {
        let (secrets, pubkeys) = random_signers();
        let (mut session, publics, mut partials) =
            run_rounds(&secrets, &pubkeys, random_message(), |_| {});

        let victim = rng.gen_range(0..partials.len());
        let forged = loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            // Values above the curve order are not partial signatures at all.
            if let Ok(p) = partial_sig_from_bytes(&bytes) {
                if partial_sig_to_bytes(&p) != partial_sig_to_bytes(&partials[victim]) {
                    break p;
                }
            }
        };
        partials[victim] = forged;

        assert!(matches!(
            session.verify_partial(&pubkeys[victim], &publics[victim], &partials[victim]),
            Err(MusigError::VerificationFailure(_))
        ));
        assert!(matches!(
            session.aggregate_signatures(&partials),
            Err(MusigError::VerificationFailure(_))
        ));
    }
}

#[test]
fn test_adaptor_secret_round_trip() {
    let secp = Secp256k1::new();
    for _ in 0..ROUNDS {
        let (secrets, pubkeys) = random_signers();
        let message = random_message();
        let adaptor_secret = SecretKey::new(&mut rand::thread_rng());
        let adaptor_point = adaptor_secret.public_key(&secp);

        let (mut session, _, partials) = run_rounds(&secrets, &pubkeys, message, |s| {
            s.use_adaptor(adaptor_point).unwrap();
        });

        let pre = session.aggregate_adaptor_signature(&partials).unwrap();
        assert_eq!(pre.adaptor_point(), &adaptor_point);

        let sig = session.adapt(&pre, &adaptor_secret).unwrap();
        assert_eq!(session.state(), SessionState::Adapted);
        verify_signature(&session.aggregated_key().unwrap(), &sig, &message).unwrap();

        // Anyone holding the pre-signature learns the secret once `sig` is public.
        assert_eq!(pre.reveal_secret(&sig).unwrap(), adaptor_secret);
        assert_eq!(
            session.extract_adaptor_secret(&sig, &partials).unwrap(),
            adaptor_secret
        );
    }
}

#[test]
fn test_distinct_tweaks_give_distinct_keys() {
    let mut rng = rand::thread_rng();
    let (secrets, pubkeys) = random_signers();
    let message = random_message();

    let mut random_tweak = || {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        bytes[0] &= 0x7f; // stay below the curve order
        SessionTweak::XOnly(Scalar::from_be_bytes(bytes).unwrap())
    };
    let (t1, t2) = (random_tweak(), random_tweak());

    let (mut a, _, partials_a) = run_rounds(&secrets, &pubkeys, message, |s| {
        s.apply_tweak(t1).unwrap();
    });
    let (mut b, _, partials_b) = run_rounds(&secrets, &pubkeys, message, |s| {
        s.apply_tweak(t2).unwrap();
    });

    let key_a = a.aggregated_key().unwrap();
    let key_b = b.aggregated_key().unwrap();
    assert_ne!(key_a, key_b);
    assert_ne!(key_a, a.untweaked_key());

    let sig_a = a.aggregate_signatures(&partials_a).unwrap();
    let sig_b = b.aggregate_signatures(&partials_b).unwrap();
    verify_signature(&key_a, &sig_a, &message).unwrap();
    verify_signature(&key_b, &sig_b, &message).unwrap();
    assert!(verify_signature(&key_a, &sig_b, &message).is_err());
    assert!(verify_signature(&key_b, &sig_a, &message).is_err());
    assert!(verify_signature(&a.untweaked_key(), &sig_a, &message).is_err());
}

#[test]
fn test_concurrent_sessions_are_independent() {
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let (secrets, pubkeys) = random_signers();
                    let message = random_message();
                    let (mut session, _, partials) =
                        run_rounds(&secrets, &pubkeys, message, |_| {});
                    let sig = session.aggregate_signatures(&partials).unwrap();
                    (session.aggregated_key().unwrap(), sig, message)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, (key, sig, message)) in results.iter().enumerate() {
        verify_signature(key, sig, message).unwrap();
        for (j, (other_key, _, _)) in results.iter().enumerate() {
            if i != j {
                assert!(verify_signature(other_key, sig, message).is_err());
            }
        }
    }
}

#[test]
fn test_aggregated_key_is_deterministic() {
    for _ in 0..ROUNDS {
        let (_, pubkeys) = random_signers();
        let message = random_message();
        let a = MusigSession::new(&pubkeys, message).unwrap();
        let b = MusigSession::new(&pubkeys, random_message()).unwrap();
        assert_eq!(a.aggregated_key().unwrap(), b.aggregated_key().unwrap());
        assert_ne!(a.id(), b.id());
    }
}

#[test]
fn test_tampered_session_cannot_be_reused() {
    let (secrets, pubkeys) = random_signers();
    let (mut session, _, partials) = run_rounds(&secrets, &pubkeys, random_message(), |_| {});

    // Dropping a partial leaves the signature incomplete.
    assert!(session.aggregate_signatures(&partials[1..]).is_err());
    session.aggregate_signatures(&partials).unwrap();

    // Once aggregated, no further round is accepted.
    assert!(matches!(
        session.generate_nonce(&secrets[0]),
        Err(MusigError::InvalidState { .. })
    ));
    session.abort();
}
