//! Agglomerative hierarchical clustering over a dense distance matrix

use crate::structs::{ConsensusError, Result};

/// Rule for the distance between two merged groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Closest pair of members
    #[default]
    Single,
    /// Farthest pair of members
    Complete,
    /// Mean over all member pairs
    Average,
    /// Smallest increase in within-group variance; expects Euclidean distances
    Ward,
}

/// One agglomeration step: the group in slot `right` joins slot `left`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
}

/// Full merge history for `n` leaves, in merge order
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    n: usize,
    merges: Vec<Merge>,
}

/// Cluster `n` items given their distances in a flat `n x n` buffer
///
/// Ties are broken by the lowest pair of indices, so the result is
/// deterministic.
///
/// # Errors
/// Returns `InvalidParameter` if the buffer is not `n x n` or holds NaN
pub fn agglomerate(distances: &[f64], n: usize, linkage: Linkage) -> Result<Dendrogram> {
    if distances.len() != n * n {
        return Err(ConsensusError::InvalidParameter(format!(
            "distance buffer has {} cells, expected {}",
            distances.len(),
            n * n
        )));
    }
    if distances.iter().any(|d| d.is_nan()) {
        return Err(ConsensusError::InvalidParameter(
            "distance matrix contains NaN".into(),
        ));
    }

    let merges = match linkage {
        Linkage::Single => single_linkage(distances, n),
        Linkage::Complete | Linkage::Average | Linkage::Ward => {
            pairwise_linkage(distances, n, linkage)
        }
    };
    Ok(Dendrogram { n, merges })
}

/// Prim builds the minimum spanning tree, then its edges are merged in
/// ascending order with union-find: `O(n^2)`
fn single_linkage(distances: &[f64], n: usize) -> Vec<Merge> {
    if n < 2 {
        return Vec::new();
    }

    // Prim's algorithm on the complete graph
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut parent = vec![0usize; n];
    let mut edges: Vec<(usize, usize, f64)> = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        let mut next = None;
        for v in 0..n {
            if in_tree[v] {
                continue;
            }
            let d = distances[current * n + v];
            if d < best[v] {
                best[v] = d;
                parent[v] = current;
            }
            if next.map_or(true, |u: usize| best[v] < best[u]) {
                next = Some(v);
            }
        }
        let Some(v) = next else { break };
        in_tree[v] = true;
        edges.push((parent[v], v, best[v]));
        current = v;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut roots: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(edges.len());
    for (u, v, distance) in edges {
        let (ru, rv) = (find_root(&mut roots, u), find_root(&mut roots, v));
        let (left, right) = (ru.min(rv), ru.max(rv));
        roots[right] = left;
        merges.push(Merge {
            left,
            right,
            distance,
        });
    }
    merges
}

fn find_root(roots: &mut [usize], mut i: usize) -> usize {
    while roots[i] != i {
        roots[i] = roots[roots[i]];
        i = roots[i];
    }
    i
}

/// Lance-Williams updates on a working copy of the matrix: `O(n^3)`
///
/// Ward runs on squared distances and reports merge heights back on the
/// original scale.
#[allow(clippy::cast_precision_loss)]
fn pairwise_linkage(distances: &[f64], n: usize, linkage: Linkage) -> Vec<Merge> {
    let mut d: Vec<f64> = if linkage == Linkage::Ward {
        distances.iter().map(|x| x * x).collect()
    } else {
        distances.to_vec()
    };
    let mut active = vec![true; n];
    let mut sizes = vec![1usize; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for _ in 1..n {
        let mut closest: Option<(usize, usize, f64)> = None;
        for a in (0..n).filter(|&a| active[a]) {
            for b in ((a + 1)..n).filter(|&b| active[b]) {
                let dist = d[a * n + b];
                if closest.map_or(true, |(_, _, best)| dist < best) {
                    closest = Some((a, b, dist));
                }
            }
        }
        let Some((left, right, distance)) = closest else { break };

        let (size_l, size_r) = (sizes[left] as f64, sizes[right] as f64);
        for c in (0..n).filter(|&c| active[c] && c != left && c != right) {
            let (dl, dr) = (d[left * n + c], d[right * n + c]);
            let merged = match linkage {
                Linkage::Single => dl.min(dr),
                Linkage::Complete => dl.max(dr),
                Linkage::Average => (size_l * dl + size_r * dr) / (size_l + size_r),
                Linkage::Ward => {
                    let size_c = sizes[c] as f64;
                    ((size_l + size_c) * dl + (size_r + size_c) * dr - size_c * distance)
                        / (size_l + size_r + size_c)
                }
            };
            d[left * n + c] = merged;
            d[c * n + left] = merged;
        }

        active[right] = false;
        sizes[left] += sizes[right];
        merges.push(Merge {
            left,
            right,
            distance: if linkage == Linkage::Ward {
                distance.sqrt()
            } else {
                distance
            },
        });
    }
    merges
}

impl Dendrogram {
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Leaves left to right, so that every merged group is contiguous
    #[must_use]
    pub fn leaf_order(&self) -> Vec<usize> {
        let mut groups: Vec<Vec<usize>> = (0..self.n).map(|i| vec![i]).collect();
        for merge in &self.merges {
            let right = std::mem::take(&mut groups[merge.right]);
            groups[merge.left].extend(right);
        }
        groups.into_iter().flatten().collect()
    }

    /// Flat labels in `[0, k)` from stopping after `n - k` merges
    ///
    /// Labels are numbered in order of first appearance.
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `1 <= k <= n`
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        if k == 0 || k > self.n {
            return Err(ConsensusError::InvalidParameter(format!(
                "cannot cut {} leaves into {k} clusters",
                self.n
            )));
        }

        let mut slot: Vec<usize> = (0..self.n).collect();
        for merge in self.merges.iter().take(self.n - k) {
            for s in &mut slot {
                if *s == merge.right {
                    *s = merge.left;
                }
            }
        }

        let mut label_of_slot = vec![usize::MAX; self.n];
        let mut next = 0;
        Ok(slot
            .into_iter()
            .map(|s| {
                if label_of_slot[s] == usize::MAX {
                    label_of_slot[s] = next;
                    next += 1;
                }
                label_of_slot[s]
            })
            .collect())
    }
}
