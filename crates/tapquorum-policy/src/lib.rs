//! # tapquorum-policy
//!
//! k-of-n threshold spending policies committed to a single Taproot output.
//!
//! Every k-subset of the policy keys becomes its own Tapscript leaf, the
//! leaves are weighted and arranged in a Huffman-shaped script tree, and the
//! tree is tweaked into the internal key:
//!
//! ```text
//! ThresholdPolicy ─► combinations ─► LeafCondition × C(n,k) ─► ScriptTree ─► output key
//! ```
//!
//! Cooperating signers find their leaf with [`matcher::narrow_to_leaf`] and
//! spend it with a witness from [`witness::script_path_witness`].

pub mod combinations;
pub mod error;
pub mod keys;
pub mod leaf;
pub mod matcher;
pub mod policy;
pub mod tree;
pub mod weights;
pub mod witness;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::PolicyError;
pub use keys::SignerKeys;
pub use leaf::{LeafCondition, LeafKind, LeafStrategy};
pub use matcher::{filter_leaves, narrow_to_leaf};
pub use policy::{InternalKey, ThresholdPolicy, MAX_KEYS, MIN_THRESHOLD};
pub use tree::ScriptTree;
pub use weights::{FloorPercent, LeafWeighting, SpreadPercent, WeightingScheme};
