//! Weighted Taproot script trees.
//!
//! Leaves are arranged by Huffman coding over their weights: the two lightest
//! subtrees are merged first, so lighter leaves sink deeper and heavier ones
//! get shorter control blocks. The tree shape is then fed to
//! [`TaprootBuilder`] in depth-first order and committed to the internal key.
//!
//! # Taproot Structure
//!
//! ```text
//! Output key = taptweak(internal_key, merkle_root)
//!   Key path:    internal key (owner) or NUMS point (no key path)
//!   Script path: one leaf per k-subset of the policy keys
//! ```

use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{
    ControlBlock, LeafVersion, TapNodeHash, TaprootBuilder, TaprootSpendInfo,
    TAPROOT_CONTROL_MAX_NODE_COUNT,
};
use bitcoin::{Address, Network, Script};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::PolicyError;
use crate::leaf::{compile_leaves, LeafCondition, LeafStrategy};
use crate::policy::{InternalKey, ThresholdPolicy};
use crate::weights::LeafWeighting;

enum Node {
    Leaf(usize),
    Branch(usize, usize),
}

/// Huffman layout of `weights`: `(leaf index, depth)` in depth-first,
/// left-to-right order, ready for [`TaprootBuilder::add_leaf`].
///
/// Ties between equal weights go to the node created first; every input
/// leaf counts as created before any merged node.
fn huffman_layout(weights: &[u32]) -> Result<Vec<(usize, u8)>, PolicyError> {
    if weights.is_empty() {
        return Err(PolicyError::InvalidArgument("tree needs at least one leaf".into()));
    }

    let mut arena: Vec<Node> = (0..weights.len()).map(Node::Leaf).collect();
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| Reverse((u64::from(*w), i)))
        .collect();

    while heap.len() > 1 {
        let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        arena.push(Node::Branch(a, b));
        heap.push(Reverse((w1 + w2, arena.len() - 1)));
    }
    // Last node created is the root (or the only leaf).
    let root = arena.len() - 1;

    let mut layout = Vec::with_capacity(weights.len());
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        if depth > TAPROOT_CONTROL_MAX_NODE_COUNT {
            return Err(PolicyError::Taproot(format!(
                "leaf depth {} exceeds {}",
                depth, TAPROOT_CONTROL_MAX_NODE_COUNT
            )));
        }
        match arena[id] {
            Node::Leaf(index) => layout.push((index, depth as u8)),
            Node::Branch(left, right) => {
                stack.push((right, depth + 1));
                stack.push((left, depth + 1));
            }
        }
    }
    Ok(layout)
}

/// Depth of every leaf, in input order.
pub fn huffman_depths(weights: &[u32]) -> Result<Vec<u8>, PolicyError> {
    let mut depths = vec![0u8; weights.len()];
    for (index, depth) in huffman_layout(weights)? {
        depths[index] = depth;
    }
    Ok(depths)
}

/// A committed Taproot output over a set of leaves.
///
/// Built once and immutable afterwards. The same internal key and the same
/// leaves (order and weights included) always give the same output key.
#[derive(Debug, Clone)]
pub struct ScriptTree {
    internal: InternalKey,
    leaves: Vec<LeafCondition>,
    depths: Vec<u8>,
    spend_info: TaprootSpendInfo,
}

impl ScriptTree {
    /// Compile every k-subset of `policy` into a leaf and commit to them.
    pub fn build<W: LeafWeighting + ?Sized>(
        policy: &ThresholdPolicy,
        strategy: LeafStrategy,
        weighting: &W,
    ) -> Result<Self, PolicyError> {
        let leaves = compile_leaves(policy, strategy, weighting)?;
        let tree = Self::from_leaves(policy.internal_key(), leaves)?;
        log::info!(
            "built {}-of-{} script tree: {} leaves, output key {}",
            policy.threshold(),
            policy.keys().len(),
            tree.leaves.len(),
            tree.output_key()
        );
        Ok(tree)
    }

    /// Commit to an explicit leaf list.
    pub fn from_leaves(
        internal: InternalKey,
        leaves: Vec<LeafCondition>,
    ) -> Result<Self, PolicyError> {
        let weights: Vec<u32> = leaves.iter().map(|l| l.weight).collect();
        let layout = huffman_layout(&weights)?;

        let mut depths = vec![0u8; leaves.len()];
        let mut builder = TaprootBuilder::new();
        for (index, depth) in layout {
            depths[index] = depth;
            builder = builder
                .add_leaf(depth, leaves[index].script.clone())
                .map_err(|e| PolicyError::Taproot(format!("add leaf {}: {}", index, e)))?;
            log::debug!("leaf {} at depth {}", index, depth);
        }

        let secp = Secp256k1::verification_only();
        let spend_info = builder
            .finalize(&secp, internal.x_only()?)
            .map_err(|_| PolicyError::Taproot("taproot finalize failed".into()))?;

        Ok(Self {
            internal,
            leaves,
            depths,
            spend_info,
        })
    }

    /// The tweaked key that goes into the output script.
    pub fn output_key(&self) -> XOnlyPublicKey {
        self.spend_info.output_key().to_x_only_public_key()
    }

    pub fn internal_key(&self) -> InternalKey {
        self.internal
    }

    pub fn merkle_root(&self) -> Option<TapNodeHash> {
        self.spend_info.merkle_root()
    }

    pub fn spend_info(&self) -> &TaprootSpendInfo {
        &self.spend_info
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.spend_info.output_key(), network)
    }

    pub fn leaves(&self) -> &[LeafCondition] {
        &self.leaves
    }

    /// Control block proving `leaf` is committed to by [`Self::output_key`].
    pub fn control_block(&self, leaf: &LeafCondition) -> Result<ControlBlock, PolicyError> {
        self.spend_info
            .control_block(&(leaf.script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| PolicyError::Taproot("leaf is not part of this tree".into()))
    }

    pub fn leaf_for_script(&self, script: &Script) -> Option<&LeafCondition> {
        self.leaves.iter().find(|l| l.script.as_script() == script)
    }

    pub fn leaf_depth(&self, leaf: &LeafCondition) -> Option<u8> {
        self.leaves
            .iter()
            .position(|l| l == leaf)
            .map(|i| self.depths[i])
    }
}
