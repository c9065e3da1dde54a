//! Leaf script compilation.
//!
//! Every admissible signer subset becomes one Tapscript leaf. Two leaf
//! shapes are supported:
//!
//! ```text
//! ChecksigAdd:     <K0> OP_CHECKSIG <K1> OP_CHECKSIGADD ... <Kk-1> OP_CHECKSIGADD <k> OP_NUMEQUAL
//! MusigAggregate:  <KeyAgg(K0..Kk-1)> OP_CHECKSIG
//! ```
//!
//! The first is exactly miniscript's `multi_a(k, K0, ..., Kk-1)` and takes k
//! signatures. The second takes one MuSig2 signature from all k signers.

use bitcoin::key::XOnlyPublicKey;
use bitcoin::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGADD, OP_NUMEQUAL};
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use miniscript::{Miniscript, Tap};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::combinations::combinations;
use crate::error::PolicyError;
use crate::policy::{ThresholdPolicy, MAX_KEYS};
use crate::weights::{leaf_weights, LeafWeighting};

/// How a signer subset is turned into a leaf script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafStrategy {
    /// k individual signatures checked with OP_CHECKSIGADD.
    #[default]
    ChecksigAdd,
    /// One signature under the MuSig2 aggregate of the subset.
    MusigAggregate,
}

impl FromStr for LeafStrategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checksigadd" => Ok(LeafStrategy::ChecksigAdd),
            "musig" => Ok(LeafStrategy::MusigAggregate),
            other => Err(PolicyError::InvalidArgument(format!(
                "unknown leaf strategy {:?} (expected checksigadd or musig)",
                other
            ))),
        }
    }
}

impl fmt::Display for LeafStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafStrategy::ChecksigAdd => f.write_str("checksigadd"),
            LeafStrategy::MusigAggregate => f.write_str("musig"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeafKind {
    Multi,
    Musig { aggregate: XOnlyPublicKey },
}

/// One spending condition: a signer subset and its compiled script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafCondition {
    pub weight: u32,
    pub required_keys: Vec<XOnlyPublicKey>,
    pub script: ScriptBuf,
    pub kind: LeafKind,
}

impl LeafCondition {
    /// Compile a fresh leaf for `required_keys` (order kept).
    pub fn compile(
        required_keys: Vec<XOnlyPublicKey>,
        strategy: LeafStrategy,
        weight: u32,
    ) -> Result<Self, PolicyError> {
        let (script, kind) = match strategy {
            LeafStrategy::ChecksigAdd => (compile_checksigadd(&required_keys)?, LeafKind::Multi),
            LeafStrategy::MusigAggregate => {
                let (script, aggregate) = compile_musig_leaf(&required_keys)?;
                (script, LeafKind::Musig { aggregate })
            }
        };
        Ok(Self {
            weight,
            required_keys,
            script,
            kind,
        })
    }

    /// Number of cooperating signers this leaf needs.
    pub fn threshold(&self) -> usize {
        self.required_keys.len()
    }

    pub fn requires(&self, key: &XOnlyPublicKey) -> bool {
        self.required_keys.contains(key)
    }

    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_script(&self.script, LeafVersion::TapScript)
    }

    /// The leaf as a Tapscript miniscript fragment.
    pub fn miniscript(&self) -> Result<Miniscript<XOnlyPublicKey, Tap>, PolicyError> {
        let text = match self.kind {
            LeafKind::Multi => {
                let keys: Vec<String> = self.required_keys.iter().map(|k| k.to_string()).collect();
                format!("multi_a({},{})", self.threshold(), keys.join(","))
            }
            LeafKind::Musig { aggregate } => format!("pk({})", aggregate),
        };
        Miniscript::from_str(&text)
            .map_err(|e| PolicyError::InvalidArgument(format!("miniscript {}: {}", text, e)))
    }
}

/// `<K0> CHECKSIG <K1> CHECKSIGADD ... <k> NUMEQUAL` over `keys`.
pub fn compile_checksigadd(keys: &[XOnlyPublicKey]) -> Result<ScriptBuf, PolicyError> {
    check_leaf_size(keys)?;

    let mut builder = Builder::new();
    for (i, key) in keys.iter().enumerate() {
        let op = if i == 0 { OP_CHECKSIG } else { OP_CHECKSIGADD };
        builder = builder.push_x_only_key(key).push_opcode(op);
    }
    Ok(builder
        .push_int(keys.len() as i64)
        .push_opcode(OP_NUMEQUAL)
        .into_script())
}

/// `<KeyAgg(keys)> CHECKSIG`, plus the aggregate key.
pub fn compile_musig_leaf(
    keys: &[XOnlyPublicKey],
) -> Result<(ScriptBuf, XOnlyPublicKey), PolicyError> {
    check_leaf_size(keys)?;
    let aggregate = tapquorum_musig::aggregate_x_only(keys)?;
    let script = Builder::new()
        .push_x_only_key(&aggregate)
        .push_opcode(OP_CHECKSIG)
        .into_script();
    Ok((script, aggregate))
}

fn check_leaf_size(keys: &[XOnlyPublicKey]) -> Result<(), PolicyError> {
    if keys.is_empty() || keys.len() > MAX_KEYS {
        return Err(PolicyError::InvalidArgument(format!(
            "leaf needs 1..={} keys, got {}",
            MAX_KEYS,
            keys.len()
        )));
    }
    Ok(())
}

/// Parse a CHECKSIGADD leaf back into its keys and threshold.
///
/// Only the exact shape produced by [`compile_checksigadd`] is accepted.
pub fn decode_checksigadd(script: &Script) -> Result<(Vec<XOnlyPublicKey>, usize), PolicyError> {
    let malformed =
        |what: &str| PolicyError::InvalidArgument(format!("not a checksigadd leaf: {}", what));

    let mut keys = Vec::new();
    let mut threshold = None;
    let mut instructions = script.instructions_minimal().peekable();

    while let Some(ins) = instructions.next() {
        let ins = ins.map_err(|e| malformed(&e.to_string()))?;
        match ins {
            Instruction::PushBytes(bytes) if bytes.len() == 32 && threshold.is_none() => {
                let key = XOnlyPublicKey::from_slice(bytes.as_bytes())
                    .map_err(|e| malformed(&format!("key {}: {}", keys.len(), e)))?;
                let expected = if keys.is_empty() { OP_CHECKSIG } else { OP_CHECKSIGADD };
                match instructions.next() {
                    Some(Ok(Instruction::Op(op))) if op == expected => keys.push(key),
                    _ => return Err(malformed("key not followed by its signature check")),
                }
            }
            Instruction::Op(op) if threshold.is_none() && !keys.is_empty() => {
                let n = op.to_u8();
                // OP_PUSHNUM_1 ..= OP_PUSHNUM_16
                if !(0x51..=0x60).contains(&n) {
                    return Err(malformed("missing threshold"));
                }
                threshold = Some(usize::from(n - 0x50));
                match instructions.next() {
                    Some(Ok(Instruction::Op(op))) if op == OP_NUMEQUAL => {}
                    _ => return Err(malformed("missing OP_NUMEQUAL")),
                }
                if instructions.peek().is_some() {
                    return Err(malformed("trailing data"));
                }
            }
            _ => return Err(malformed("unexpected instruction")),
        }
    }

    let threshold = threshold.ok_or_else(|| malformed("truncated"))?;
    if threshold != keys.len() {
        return Err(malformed(&format!(
            "threshold {} does not match {} keys",
            threshold,
            keys.len()
        )));
    }
    Ok((keys, threshold))
}

/// Compile one leaf per k-subset of the policy's keys.
///
/// Leaves come out in subset enumeration order; the weight of leaf i is
/// `weighting.weight(i, C(n, k))`.
pub fn compile_leaves<W: LeafWeighting + ?Sized>(
    policy: &ThresholdPolicy,
    strategy: LeafStrategy,
    weighting: &W,
) -> Result<Vec<LeafCondition>, PolicyError> {
    let subsets = combinations(policy.keys(), policy.threshold())?;
    let weights = leaf_weights(weighting, subsets.len());

    let leaves = subsets
        .into_iter()
        .zip(weights)
        .map(|(subset, weight)| LeafCondition::compile(subset, strategy, weight))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "compiled {} {} leaves for {}-of-{}",
        leaves.len(),
        strategy,
        policy.threshold(),
        policy.keys().len()
    );
    Ok(leaves)
}
