//! k-subset enumeration.

use crate::error::PolicyError;

/// All `size`-element subsets of `items`, each keeping the input order.
///
/// Subsets come out in lexicographic order of input index. Leaf order (and
/// so the output key) depends on this, so the order must never change.
pub fn combinations<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>, PolicyError> {
    if items.is_empty() {
        return Err(PolicyError::InvalidArgument(
            "cannot enumerate subsets of an empty list".into(),
        ));
    }
    if size == 0 || size > items.len() {
        return Err(PolicyError::InvalidArgument(format!(
            "subset size {} out of range 1..={}",
            size,
            items.len()
        )));
    }

    let mut out = Vec::with_capacity(binomial(items.len(), size) as usize);
    let mut current = Vec::with_capacity(size);
    collect(items, size, 0, &mut current, &mut out);
    Ok(out)
}

fn collect<T: Clone>(
    items: &[T],
    size: usize,
    start: usize,
    current: &mut Vec<T>,
    out: &mut Vec<Vec<T>>,
) {
    if current.len() == size {
        out.push(current.clone());
        return;
    }
    let needed = size - current.len();
    // Choose items[i], recurse, then skip it.
    for i in start..=items.len() - needed {
        current.push(items[i].clone());
        collect(items, size, i + 1, current, out);
        current.pop();
    }
}

/// C(n, k). Zero when k > n.
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u64;
    let n = n as u64;
    (0..k).fold(1u64, |acc, i| acc * (n - i) / (i + 1))
}
