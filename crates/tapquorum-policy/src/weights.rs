//! Leaf weighting.
//!
//! A weight is the relative likelihood that a leaf will be used. Heavier
//! leaves end up closer to the root, so their control blocks are shorter.

use serde::Serialize;
use std::str::FromStr;

use crate::error::PolicyError;

/// Assigns a weight to the leaf at `index` among `leaf_count` leaves.
pub trait LeafWeighting {
    fn weight(&self, index: usize, leaf_count: usize) -> u32;
}

impl<F> LeafWeighting for F
where
    F: Fn(usize, usize) -> u32,
{
    fn weight(&self, index: usize, leaf_count: usize) -> u32 {
        self(index, leaf_count)
    }
}

/// `floor(100 / leaf_count)` for every leaf.
///
/// The weights do not sum to 100 unless `leaf_count` divides 100; the
/// remainder is dropped. With more than 100 leaves every weight is 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloorPercent;

impl LeafWeighting for FloorPercent {
    fn weight(&self, _index: usize, leaf_count: usize) -> u32 {
        if leaf_count == 0 {
            return 0;
        }
        (100 / leaf_count) as u32
    }
}

/// Uniform weights summing to exactly 100; the first `100 % leaf_count`
/// leaves get one extra unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadPercent;

impl LeafWeighting for SpreadPercent {
    fn weight(&self, index: usize, leaf_count: usize) -> u32 {
        if leaf_count == 0 {
            return 0;
        }
        let base = 100 / leaf_count;
        let extra = usize::from(index < 100 % leaf_count);
        (base + extra) as u32
    }
}

/// Named weighting schemes, as selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightingScheme {
    #[default]
    FloorPercent,
    SpreadPercent,
}

impl LeafWeighting for WeightingScheme {
    fn weight(&self, index: usize, leaf_count: usize) -> u32 {
        match self {
            WeightingScheme::FloorPercent => FloorPercent.weight(index, leaf_count),
            WeightingScheme::SpreadPercent => SpreadPercent.weight(index, leaf_count),
        }
    }
}

impl FromStr for WeightingScheme {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "floor-percent" => Ok(WeightingScheme::FloorPercent),
            "spread-percent" => Ok(WeightingScheme::SpreadPercent),
            other => Err(PolicyError::InvalidArgument(format!(
                "unknown weighting {:?} (expected floor-percent or spread-percent)",
                other
            ))),
        }
    }
}

/// Weights for `leaf_count` leaves in order.
pub fn leaf_weights<W: LeafWeighting + ?Sized>(weighting: &W, leaf_count: usize) -> Vec<u32> {
    (0..leaf_count)
        .map(|i| weighting.weight(i, leaf_count))
        .collect()
}
