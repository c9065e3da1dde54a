//! Threshold tree spends checked by Bitcoin Core's script interpreter.
//!
//! Every test builds a real spending transaction against a UTXO locked to a
//! tree's output key and runs it through `bitcoinconsensus`:
//!   1. 2-of-5 CHECKSIGADD tree: the K0 + K1 leaf
//!   2. Every leaf of a 3-of-5 tree
//!   3. MuSig leaves signed through a MusigSession
//!   4. Owner key-path and MuSig key-path spends
//!   5. Negative cases: wrong sighash, wrong leaf, outsiders
//!
//! Run with:
//!   cargo test -p tapquorum-e2e --test threshold_spend

use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::Signature;
use bitcoin::{
    absolute, transaction, Address, Amount, Network, OutPoint, ScriptBuf, Sequence, TapSighash,
    TapSighashType, Transaction, TxIn, TxOut, Txid, Witness,
};

use tapquorum_musig::{MusigSession, PubNonce, SessionTweak};
use tapquorum_policy::witness::{
    key_path_witness, script_path_witness, sign_key_path, sign_leaf,
};
use tapquorum_policy::{
    filter_leaves, narrow_to_leaf, FloorPercent, InternalKey, LeafCondition, LeafStrategy,
    PolicyError, ScriptTree, SignerKeys, SpreadPercent, ThresholdPolicy,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn test_keypair(seed_byte: u8) -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut secret_bytes = [0u8; 32];
    secret_bytes[31] = seed_byte;
    secret_bytes[0] = 0x01;
    let sk = SecretKey::from_slice(&secret_bytes).unwrap();
    let pk = sk.public_key(&secp);
    (sk, pk)
}

/// K0..K(n-1) = test_keypair(1..=n)
fn signer_keys(n: u8) -> (Vec<SecretKey>, Vec<XOnlyPublicKey>) {
    (1..=n)
        .map(|i| {
            let (sk, pk) = test_keypair(i);
            (sk, pk.x_only_public_key().0)
        })
        .unzip()
}

fn secret_for(secrets: &[SecretKey], keys: &[XOnlyPublicKey], key: &XOnlyPublicKey) -> SecretKey {
    let i = keys.iter().position(|k| k == key).unwrap();
    secrets[i]
}

/// A UTXO locked to `tree` and an unsigned transaction spending it.
fn funded_spend(tree: &ScriptTree) -> (TxOut, Transaction) {
    let utxo = TxOut {
        value: Amount::from_sat(50_000),
        script_pubkey: tree.address(Network::Regtest).script_pubkey(),
    };

    let secp = Secp256k1::new();
    let (_, dest_pk) = test_keypair(0xEE);
    let destination = Address::p2tr(&secp, dest_pk.x_only_public_key().0, None, Network::Regtest);

    let tx = Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([0xDD; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(49_700),
            script_pubkey: destination.script_pubkey(),
        }],
    };
    (utxo, tx)
}

fn script_sighash(tx: &Transaction, utxo: &TxOut, leaf: &LeafCondition) -> TapSighash {
    let mut sighash_cache = SighashCache::new(tx);
    sighash_cache
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&[utxo.clone()]),
            leaf.leaf_hash(),
            TapSighashType::Default,
        )
        .unwrap()
}

fn key_sighash(tx: &Transaction, utxo: &TxOut) -> TapSighash {
    let mut sighash_cache = SighashCache::new(tx);
    sighash_cache
        .taproot_key_spend_signature_hash(0, &Prevouts::All(&[utxo.clone()]), TapSighashType::Default)
        .unwrap()
}

/// Serialize and verify against Bitcoin Core consensus.
fn consensus_verify(utxo: &TxOut, tx: &Transaction) -> Result<(), bitcoinconsensus::Error> {
    let mut tx_bytes = Vec::new();
    tx.consensus_encode(&mut tx_bytes).unwrap();

    let script_bytes = utxo.script_pubkey.as_bytes();
    let spent_utxo = bitcoinconsensus::Utxo {
        script_pubkey: script_bytes.as_ptr(),
        script_pubkey_len: script_bytes.len() as u32,
        value: utxo.value.to_sat() as i64,
    };

    bitcoinconsensus::verify(
        utxo.script_pubkey.as_bytes(),
        utxo.value.to_sat(),
        &tx_bytes,
        Some(&[spent_utxo]),
        0,
    )
}

/// Sign `leaf` with the given custody and verify the spend.
fn spend_checksigadd_leaf(
    tree: &ScriptTree,
    leaf: &LeafCondition,
    custody: &SignerKeys,
) -> Result<(), bitcoinconsensus::Error> {
    let (utxo, mut tx) = funded_spend(tree);
    let sighash = script_sighash(&tx, &utxo, leaf);
    let sigs = sign_leaf(leaf, custody, sighash, TapSighashType::Default).unwrap();
    tx.input[0].witness = script_path_witness(tree, leaf, &sigs).unwrap();
    consensus_verify(&utxo, &tx)
}

/// Run a full MuSig2 session for `keys` over `message`.
fn musig_sign(
    keys: &[XOnlyPublicKey],
    secrets: &[SecretKey],
    message: [u8; 32],
    tweak: Option<SessionTweak>,
) -> (XOnlyPublicKey, bitcoin::secp256k1::schnorr::Signature) {
    let mut session = MusigSession::from_x_only(keys, message).unwrap();
    if let Some(tweak) = tweak {
        session.apply_tweak(tweak).unwrap();
    }

    let mut nonces = Vec::new();
    let mut publics: Vec<PubNonce> = Vec::new();
    for sk in secrets {
        let (nonce, public) = session.generate_nonce(sk).unwrap();
        nonces.push(nonce);
        publics.push(public);
    }
    session.process_nonces(&publics).unwrap();

    let partials: Vec<_> = secrets
        .iter()
        .zip(nonces)
        .map(|(sk, nonce)| session.sign(sk, nonce).unwrap())
        .collect();
    let sig = session.aggregate_signatures(&partials).unwrap();
    (session.aggregated_key().unwrap(), sig)
}

// ============================================================================
// 1. The 2-of-5 scenario
// ============================================================================

#[test]
fn test_two_of_five_k0_k1_spend() {
    let (secrets, keys) = signer_keys(5);
    let policy = ThresholdPolicy::new(keys.clone(), 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();

    // C(5,2) = 10 leaves, floor(100 / 10) = 10 each
    assert_eq!(tree.leaves().len(), 10);
    assert!(tree.leaves().iter().all(|l| l.weight == 10));

    // K0 and K1 narrow the tree down to exactly their leaf
    let leaf = narrow_to_leaf(tree.leaves(), &[keys[0], keys[1]]).unwrap();
    assert_eq!(leaf.required_keys, vec![keys[0], keys[1]]);

    let custody: SignerKeys = [secrets[0], secrets[1]].into_iter().collect();
    let result = spend_checksigadd_leaf(&tree, leaf, &custody);
    assert!(
        result.is_ok(),
        "2-of-5 consensus verification failed: {:?}",
        result.err()
    );
}

#[test]
fn test_two_of_five_outsider_matches_nothing() {
    let (_, keys) = signer_keys(5);
    let policy = ThresholdPolicy::new(keys, 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();

    let (_, outsider) = test_keypair(0x77);
    let outsider = outsider.x_only_public_key().0;
    assert!(filter_leaves(tree.leaves(), &outsider).is_empty());
    assert!(matches!(
        narrow_to_leaf(tree.leaves(), &[outsider]),
        Err(PolicyError::AmbiguousOrUnsatisfiableLeaf { matches: 0, .. })
    ));
}

// ============================================================================
// 2. Every leaf round-trips
// ============================================================================

#[test]
fn test_every_leaf_of_three_of_five_spends() {
    let (secrets, keys) = signer_keys(5);
    let policy = ThresholdPolicy::new(keys.clone(), 3, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();
    assert_eq!(tree.leaves().len(), 10);

    for leaf in tree.leaves() {
        // Only the leaf's own signers take part.
        let custody: SignerKeys = leaf
            .required_keys
            .iter()
            .map(|k| secret_for(&secrets, &keys, k))
            .collect();
        let narrowed = narrow_to_leaf(tree.leaves(), &leaf.required_keys).unwrap();
        assert_eq!(narrowed, leaf);

        let result = spend_checksigadd_leaf(&tree, leaf, &custody);
        assert!(
            result.is_ok(),
            "leaf {:?} failed: {:?}",
            leaf.required_keys,
            result.err()
        );
    }
}

#[test]
fn test_spread_weighting_tree_spends() {
    let (secrets, keys) = signer_keys(4);
    let policy = ThresholdPolicy::new(keys, 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &SpreadPercent).unwrap();
    assert_eq!(tree.leaves().iter().map(|l| l.weight).sum::<u32>(), 100);

    let custody: SignerKeys = secrets.into_iter().collect();
    for leaf in tree.leaves() {
        assert!(spend_checksigadd_leaf(&tree, leaf, &custody).is_ok());
    }
}

#[test]
fn test_skewed_weights_tree_spends() {
    let (secrets, keys) = signer_keys(4);
    let policy = ThresholdPolicy::new(keys, 2, InternalKey::Unspendable).unwrap();
    // The first pair is expected to sign almost always.
    let favour_first = |index: usize, _count: usize| -> u32 { if index == 0 { 95 } else { 1 } };
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &favour_first).unwrap();

    let first = &tree.leaves()[0];
    assert_eq!(tree.leaf_depth(first), Some(1));

    let custody: SignerKeys = secrets.into_iter().collect();
    for leaf in tree.leaves() {
        assert!(spend_checksigadd_leaf(&tree, leaf, &custody).is_ok());
    }
}

// ============================================================================
// 3. MuSig leaves
// ============================================================================

#[test]
fn test_musig_leaf_spend() {
    let (secrets, keys) = signer_keys(4);
    let policy = ThresholdPolicy::new(keys.clone(), 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::MusigAggregate, &FloorPercent).unwrap();
    assert_eq!(tree.leaves().len(), 6);

    for leaf in tree.leaves() {
        let (utxo, mut tx) = funded_spend(&tree);
        let sighash = script_sighash(&tx, &utxo, leaf);

        let leaf_secrets: Vec<SecretKey> = leaf
            .required_keys
            .iter()
            .map(|k| secret_for(&secrets, &keys, k))
            .collect();
        let (agg_key, sig) = musig_sign(
            &leaf.required_keys,
            &leaf_secrets,
            sighash.to_byte_array(),
            None,
        );

        let sigs = [(
            agg_key,
            Signature {
                signature: sig,
                sighash_type: TapSighashType::Default,
            },
        )];
        tx.input[0].witness = script_path_witness(&tree, leaf, &sigs).unwrap();

        let result = consensus_verify(&utxo, &tx);
        assert!(result.is_ok(), "MuSig leaf failed: {:?}", result.err());
    }
}

// ============================================================================
// 4. Key-path spends
// ============================================================================

#[test]
fn test_owner_key_path_spend() {
    let (_, keys) = signer_keys(3);
    let (owner_sk, owner_pk) = test_keypair(0x42);
    let policy =
        ThresholdPolicy::new(keys, 2, InternalKey::Owner(owner_pk.x_only_public_key().0)).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();

    let (utxo, mut tx) = funded_spend(&tree);
    let sighash = key_sighash(&tx, &utxo);
    let sig = sign_key_path(&tree, &owner_sk, sighash, TapSighashType::Default).unwrap();
    tx.input[0].witness = key_path_witness(&sig);

    let result = consensus_verify(&utxo, &tx);
    assert!(result.is_ok(), "key-path spend failed: {:?}", result.err());
}

#[test]
fn test_musig_key_path_spend() {
    // All n signers together spend through the key path; the leaves stay
    // hidden. Internal key = MuSig2 aggregate of all keys.
    let (secrets, keys) = signer_keys(3);
    let internal = tapquorum_musig::aggregate_x_only(&keys).unwrap();
    let policy = ThresholdPolicy::new(keys.clone(), 2, InternalKey::Owner(internal)).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();
    let merkle_root = tree.merkle_root().unwrap().to_byte_array();

    let (utxo, mut tx) = funded_spend(&tree);
    let sighash = key_sighash(&tx, &utxo);
    let (tweaked_key, sig) = musig_sign(
        &keys,
        &secrets,
        sighash.to_byte_array(),
        Some(SessionTweak::Taproot(Some(merkle_root))),
    );
    assert_eq!(tweaked_key, tree.output_key());

    tx.input[0].witness = key_path_witness(&Signature {
        signature: sig,
        sighash_type: TapSighashType::Default,
    });
    let result = consensus_verify(&utxo, &tx);
    assert!(result.is_ok(), "MuSig key-path spend failed: {:?}", result.err());
}

// ============================================================================
// 5. Negative cases
// ============================================================================

#[test]
fn test_signatures_over_wrong_sighash_rejected() {
    let (secrets, keys) = signer_keys(5);
    let policy = ThresholdPolicy::new(keys.clone(), 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();
    let leaf = narrow_to_leaf(tree.leaves(), &[keys[0], keys[1]]).unwrap();
    let custody: SignerKeys = [secrets[0], secrets[1]].into_iter().collect();

    let (utxo, mut tx) = funded_spend(&tree);
    let wrong = TapSighash::from_byte_array([0x01; 32]);
    let sigs = sign_leaf(leaf, &custody, wrong, TapSighashType::Default).unwrap();
    tx.input[0].witness = script_path_witness(&tree, leaf, &sigs).unwrap();

    assert!(consensus_verify(&utxo, &tx).is_err());
}

#[test]
fn test_leaf_from_other_tree_rejected() {
    let (secrets, keys) = signer_keys(5);
    let tree = ScriptTree::build(
        &ThresholdPolicy::new(keys.clone(), 2, InternalKey::Unspendable).unwrap(),
        LeafStrategy::ChecksigAdd,
        &FloorPercent,
    )
    .unwrap();
    let other = ScriptTree::build(
        &ThresholdPolicy::new(keys[..4].to_vec(), 2, InternalKey::Unspendable).unwrap(),
        LeafStrategy::ChecksigAdd,
        &FloorPercent,
    )
    .unwrap();
    assert_ne!(tree.output_key(), other.output_key());

    // Same K0 + K1 script, but the control block proves membership in the
    // other tree, not in the one the UTXO is locked to.
    let leaf = narrow_to_leaf(other.leaves(), &[keys[0], keys[1]]).unwrap();
    let custody: SignerKeys = [secrets[0], secrets[1]].into_iter().collect();

    let (utxo, mut tx) = funded_spend(&tree);
    let sighash = script_sighash(&tx, &utxo, leaf);
    let sigs = sign_leaf(leaf, &custody, sighash, TapSighashType::Default).unwrap();
    tx.input[0].witness = script_path_witness(&other, leaf, &sigs).unwrap();

    assert!(consensus_verify(&utxo, &tx).is_err());
}

#[test]
fn test_single_signer_cannot_complete_leaf() {
    let (secrets, keys) = signer_keys(5);
    let policy = ThresholdPolicy::new(keys.clone(), 2, InternalKey::Unspendable).unwrap();
    let tree = ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap();
    let leaf = narrow_to_leaf(tree.leaves(), &[keys[0], keys[1]]).unwrap();

    let custody: SignerKeys = [secrets[0]].into_iter().collect();
    let (utxo, tx) = funded_spend(&tree);
    let sighash = script_sighash(&tx, &utxo, leaf);
    let sigs = sign_leaf(leaf, &custody, sighash, TapSighashType::Default).unwrap();
    assert!(matches!(
        script_path_witness(&tree, leaf, &sigs),
        Err(PolicyError::Witness(_))
    ));
}

#[test]
fn test_output_key_is_reproducible() {
    // Two parties build independently from the same policy.
    let (_, keys) = signer_keys(6);
    let build = || {
        let policy = ThresholdPolicy::new(keys.clone(), 3, InternalKey::Unspendable).unwrap();
        ScriptTree::build(&policy, LeafStrategy::ChecksigAdd, &FloorPercent).unwrap()
    };
    let a = build();
    let b = build();
    assert_eq!(a.output_key(), b.output_key());
    assert_eq!(
        a.address(Network::Bitcoin).to_string(),
        b.address(Network::Bitcoin).to_string()
    );
    for leaf in a.leaves() {
        assert_eq!(
            hex::encode(a.control_block(leaf).unwrap().serialize()),
            hex::encode(b.control_block(leaf).unwrap().serialize())
        );
    }
}
