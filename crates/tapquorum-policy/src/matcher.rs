//! Finding the leaf a group of cooperating signers can satisfy.
//!
//! Matching is structural: a leaf matches a key when the key is one of the
//! leaf's `required_keys`. Scripts are never searched as byte strings.

use bitcoin::key::XOnlyPublicKey;

use crate::error::PolicyError;
use crate::leaf::LeafCondition;

/// Leaves that require `key`.
pub fn filter_leaves<'a, I>(leaves: I, key: &XOnlyPublicKey) -> Vec<&'a LeafCondition>
where
    I: IntoIterator<Item = &'a LeafCondition>,
{
    leaves.into_iter().filter(|leaf| leaf.requires(key)).collect()
}

/// The unique leaf whose required keys are exactly `signers`.
///
/// Filters by each signer in turn, then keeps only leaves with no keys
/// beyond the signer set. Zero or several survivors is an
/// [`PolicyError::AmbiguousOrUnsatisfiableLeaf`]; a leaf is never picked
/// arbitrarily.
pub fn narrow_to_leaf<'a>(
    leaves: &'a [LeafCondition],
    signers: &[XOnlyPublicKey],
) -> Result<&'a LeafCondition, PolicyError> {
    let unsatisfiable = |matches: usize| PolicyError::AmbiguousOrUnsatisfiableLeaf {
        signers: signers.to_vec(),
        matches,
    };
    if signers.is_empty() {
        return Err(unsatisfiable(0));
    }

    let mut candidates: Vec<&LeafCondition> = leaves.iter().collect();
    for signer in signers {
        candidates = filter_leaves(candidates, signer);
        log::debug!("{} leaves left after signer {}", candidates.len(), signer);
        if candidates.is_empty() {
            return Err(unsatisfiable(0));
        }
    }
    candidates.retain(|leaf| leaf.required_keys.iter().all(|k| signers.contains(k)));

    match candidates.as_slice() {
        [leaf] => Ok(*leaf),
        other => Err(unsatisfiable(other.len())),
    }
}
