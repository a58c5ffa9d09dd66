//! Presentation transforms for consensus matrices
//!
//! Nothing here feeds back into scoring: orderings and histograms exist only
//! so that heatmaps and density plots show the block structure clearly.

use crate::ml::linkage::{agglomerate, Linkage};
use crate::structs::{ConsensusError, ConsensusMatrix, Result};
use ndarray::Array2;
use serde::Serialize;

/// Row/column order that makes stable clusters show up as diagonal blocks
///
/// Leaves of the single-linkage dendrogram over `1 - M`. Pairs that were never
/// sampled together are placed at the maximum distance of 1.
///
/// # Errors
/// Returns error if the linkage cannot be built
pub fn display_order(m: &ConsensusMatrix) -> Result<Vec<usize>> {
    let n = m.n_items();
    let distances: Vec<f64> = (0..n * n)
        .map(|cell| {
            let (i, j) = (cell / n, cell % n);
            if i == j {
                0.0
            } else {
                1.0 - m.get(i, j).unwrap_or(0.0)
            }
        })
        .collect();

    Ok(agglomerate(&distances, n, Linkage::Single)?.leaf_order())
}

/// Dense copy of `m` with rows and columns permuted by `order`
///
/// Undefined entries become NaN, which plotting tools render as blank cells.
///
/// # Errors
/// Returns `InvalidParameter` if `order` is not a permutation of the items
pub fn reordered(m: &ConsensusMatrix, order: &[usize]) -> Result<Array2<f64>> {
    let n = m.n_items();
    let mut seen = vec![false; n];
    for &i in order {
        if i >= n || std::mem::replace(&mut seen[i], true) {
            return Err(ConsensusError::InvalidParameter(format!(
                "order is not a permutation of {n} items"
            )));
        }
    }
    if order.len() != n {
        return Err(ConsensusError::InvalidParameter(format!(
            "order has {} entries for {n} items",
            order.len()
        )));
    }

    Ok(Array2::from_shape_fn((n, n), |(r, c)| {
        m.get(order[r], order[c]).unwrap_or(f64::NAN)
    }))
}

/// One bar of a consensus density histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
    /// Normalised so that the bars integrate to 1
    pub density: f64,
}

/// Histogram of the defined off-diagonal consensus values over `[0, 1]`
///
/// A stable clustering shows two spikes at 0 and 1; a flat histogram means no
/// stable structure.
///
/// # Errors
/// Returns `InvalidParameter` for zero bins and `EmptyDistribution` if there
/// are no defined entries
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn density(m: &ConsensusMatrix, bins: usize) -> Result<Vec<DensityBin>> {
    if bins == 0 {
        return Err(ConsensusError::InvalidParameter(
            "density needs at least one bin".into(),
        ));
    }

    let mut counts = vec![0usize; bins];
    let mut total = 0usize;
    for value in m.upper_triangle().flatten() {
        let bin = ((value * bins as f64) as usize).min(bins - 1);
        counts[bin] += 1;
        total += 1;
    }
    if total == 0 {
        return Err(ConsensusError::EmptyDistribution { k: m.k() });
    }

    let width = 1.0 / bins as f64;
    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(b, count)| DensityBin {
            start: b as f64 * width,
            end: (b + 1) as f64 * width,
            count,
            density: count as f64 / (total as f64 * width),
        })
        .collect())
}
