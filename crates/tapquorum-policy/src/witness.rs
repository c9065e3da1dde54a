//! Witness assembly for script-path and key-path spends.
//!
//! Sighash computation stays with the caller; everything here works on a
//! [`TapSighash`] already computed for the input being spent.

use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, TapTweak, XOnlyPublicKey};
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::TapSighashType;
use bitcoin::taproot::Signature;
use bitcoin::{TapSighash, Witness};

use crate::error::PolicyError;
use crate::keys::SignerKeys;
use crate::leaf::{LeafCondition, LeafKind};
use crate::policy::InternalKey;
use crate::tree::ScriptTree;

/// Witness for spending `leaf` through the script path.
///
/// `signatures` pairs each signature with the key it is valid under. For a
/// CHECKSIGADD leaf every required key needs one; they are pushed in reverse
/// key order so the script consumes them first to last. For a MuSig leaf the
/// one signature under the aggregate key is used.
pub fn script_path_witness(
    tree: &ScriptTree,
    leaf: &LeafCondition,
    signatures: &[(XOnlyPublicKey, Signature)],
) -> Result<Witness, PolicyError> {
    let control_block = tree.control_block(leaf)?;
    let lookup = |key: &XOnlyPublicKey| {
        signatures
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, sig)| sig)
            .ok_or_else(|| PolicyError::Witness(format!("missing signature for {}", key)))
    };

    let mut witness = Witness::new();
    match leaf.kind {
        LeafKind::Multi => {
            for key in leaf.required_keys.iter().rev() {
                witness.push(lookup(key)?.to_vec());
            }
        }
        LeafKind::Musig { aggregate } => {
            witness.push(lookup(&aggregate)?.to_vec());
        }
    }
    witness.push(leaf.script.as_bytes());
    witness.push(control_block.serialize());
    Ok(witness)
}

/// Sign `leaf` with every required key held in `custody`.
///
/// Only meaningful for CHECKSIGADD leaves; a MuSig leaf is signed through a
/// `MusigSession` instead.
pub fn sign_leaf(
    leaf: &LeafCondition,
    custody: &SignerKeys,
    sighash: TapSighash,
    sighash_type: TapSighashType,
) -> Result<Vec<(XOnlyPublicKey, Signature)>, PolicyError> {
    if leaf.kind != LeafKind::Multi {
        return Err(PolicyError::Witness(
            "MuSig leaves are signed with a MusigSession".into(),
        ));
    }

    custody.ensure_open()?;

    let secp = Secp256k1::signing_only();
    let msg = Message::from_digest(*sighash.as_byte_array());
    let mut out = Vec::new();
    for key in &leaf.required_keys {
        if !custody.contains(key) {
            continue;
        }
        let secret = custody.secret_for(key)?;
        let signature = secp.sign_schnorr(&msg, &Keypair::from_secret_key(&secp, &secret));
        out.push((
            *key,
            Signature {
                signature,
                sighash_type,
            },
        ));
    }
    Ok(out)
}

/// Key-path signature by the owner, tweaked with the tree's Merkle root.
pub fn sign_key_path(
    tree: &ScriptTree,
    owner_secret: &SecretKey,
    sighash: TapSighash,
    sighash_type: TapSighashType,
) -> Result<Signature, PolicyError> {
    let owner = match tree.internal_key() {
        InternalKey::Owner(key) => key,
        InternalKey::Unspendable => {
            return Err(PolicyError::Witness(
                "tree has an unspendable internal key".into(),
            ))
        }
    };

    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, owner_secret);
    if keypair.x_only_public_key().0 != owner {
        return Err(PolicyError::Witness(
            "secret key does not match the internal key".into(),
        ));
    }

    let tweaked = keypair.tap_tweak(&secp, tree.merkle_root());
    let msg = Message::from_digest(*sighash.as_byte_array());
    let signature = secp.sign_schnorr(&msg, &tweaked.to_keypair());
    Ok(Signature {
        signature,
        sighash_type,
    })
}

pub fn key_path_witness(signature: &Signature) -> Witness {
    Witness::p2tr_key_spend(signature)
}
