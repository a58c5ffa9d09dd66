//! Consensus matrix accumulation over resampled clusterings

use crate::ml::resample::Resampler;
use crate::structs::{
    CancelFlag, ClusterRunner, ConsensusError, ConsensusMatrix, Result, Sample,
};
use ndarray::{ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Settings for building one consensus matrix
#[derive(Debug, Clone, Default)]
pub struct AccumulateOptions {
    pub iterations: usize,
    /// Round `r` draws from this seed on ChaCha stream `r`
    pub seed: u64,
    /// Allow `k >= sample size` instead of failing
    pub relaxed_validation: bool,
    pub cancel: CancelFlag,
}

/// Running co-sample and co-cluster counts for a single cluster count
///
/// Counts live in flat `n x n` buffers indexed `i * n + j`. Only off-diagonal
/// cells are ever incremented.
#[derive(Debug, Clone)]
pub struct ConsensusAccumulator {
    n: usize,
    k: usize,
    co_sampled: Vec<u64>,
    co_clustered: Vec<u64>,
}

impl ConsensusAccumulator {
    #[must_use]
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            co_sampled: vec![0; n * n],
            co_clustered: vec![0; n * n],
        }
    }

    /// Add one round's sample and its labels to the totals
    ///
    /// # Errors
    /// Returns `ClusterRunnerContract` if the labels do not match the sample
    /// or fall outside `[0, k)`, and `InvalidParameter` for out-of-range indices
    pub fn record(&mut self, sample: &Sample, labels: &[usize]) -> Result<()> {
        if labels.len() != sample.len() {
            return Err(ConsensusError::ClusterRunnerContract(format!(
                "expected {} labels, got {}",
                sample.len(),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&label| label >= self.k) {
            return Err(ConsensusError::ClusterRunnerContract(format!(
                "label {bad} is outside [0, {})",
                self.k
            )));
        }
        if let Some(&bad) = sample.indices.iter().find(|&&i| i >= self.n) {
            return Err(ConsensusError::InvalidParameter(format!(
                "sample index {bad} is outside [0, {})",
                self.n
            )));
        }

        let n = self.n;
        for (a, (&i, &label_i)) in sample.indices.iter().zip(labels).enumerate() {
            for (&j, &label_j) in sample.indices[a + 1..].iter().zip(&labels[a + 1..]) {
                // Two slots of the same item say nothing about a pair
                if i == j {
                    continue;
                }
                self.co_sampled[i * n + j] += 1;
                self.co_sampled[j * n + i] += 1;
                if label_i == label_j {
                    self.co_clustered[i * n + j] += 1;
                    self.co_clustered[j * n + i] += 1;
                }
            }
        }
        Ok(())
    }

    /// Fold another accumulator's totals into this one
    ///
    /// Plain integer addition, so the order of merges never matters.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the shapes or cluster counts differ
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.n != other.n || self.k != other.k {
            return Err(ConsensusError::InvalidParameter(format!(
                "cannot merge accumulators for (n={}, k={}) and (n={}, k={})",
                self.n, self.k, other.n, other.k
            )));
        }
        for (total, part) in self.co_sampled.iter_mut().zip(&other.co_sampled) {
            *total += part;
        }
        for (total, part) in self.co_clustered.iter_mut().zip(&other.co_clustered) {
            *total += part;
        }
        Ok(())
    }

    /// Turn the totals into consensus values
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(self) -> ConsensusMatrix {
        let n = self.n;
        let values = self
            .co_sampled
            .iter()
            .zip(&self.co_clustered)
            .enumerate()
            .map(|(cell, (&sampled, &clustered))| {
                if cell / n == cell % n {
                    Some(1.0)
                } else if sampled == 0 {
                    None
                } else {
                    Some(clustered as f64 / sampled as f64)
                }
            })
            .collect();

        ConsensusMatrix {
            k: self.k,
            n,
            values,
            co_sampled: self.co_sampled,
        }
    }
}

impl ConsensusMatrix {
    /// Wrap consensus values computed elsewhere, e.g. to score them
    ///
    /// Diagonal cells are forced to 1. Co-sample counts are unknown and
    /// reported as 1 for defined pairs, 0 for undefined ones.
    ///
    /// # Errors
    /// Returns `InvalidParameter` unless `rows` is square and symmetric with
    /// every defined value in `[0, 1]`
    #[allow(clippy::float_cmp)]
    pub fn from_rows(k: usize, rows: &[Vec<Option<f64>>]) -> Result<Self> {
        let n = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != n) {
            return Err(ConsensusError::InvalidParameter(format!(
                "consensus matrix must be square: row of length {} in {n} rows",
                row.len()
            )));
        }

        let mut values = Vec::with_capacity(n * n);
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if i == j {
                    values.push(Some(1.0));
                    continue;
                }
                if let Some(v) = value {
                    if !(0.0..=1.0).contains(&v) {
                        return Err(ConsensusError::InvalidParameter(format!(
                            "consensus value {v} at ({i}, {j}) is outside [0, 1]"
                        )));
                    }
                }
                if value != rows[j][i] {
                    return Err(ConsensusError::InvalidParameter(format!(
                        "consensus matrix is not symmetric at ({i}, {j})"
                    )));
                }
                values.push(value);
            }
        }

        let co_sampled = values.iter().map(|v| u64::from(v.is_some())).collect();
        Ok(Self {
            k,
            n,
            values,
            co_sampled,
        })
    }
}

/// Cluster many resamples of `dataset` into `k` groups and aggregate how often
/// each pair of items lands in the same cluster
///
/// Rounds run in parallel; each worker keeps its own accumulator and the
/// workers are summed at the end. Round `r` uses ChaCha stream `r` of
/// `options.seed`, so the result does not depend on scheduling.
///
/// # Errors
/// Returns `InvalidParameter` for `k < 2`, zero iterations or fewer than two
/// items, `InvalidClusterCount` when `k` is not below the sample size (unless
/// relaxed), `Cancelled` when the cancel flag is raised, and any error from
/// the runner or its contract checks. No matrix is returned on failure.
pub fn build_consensus_matrix<C: ClusterRunner + ?Sized>(
    dataset: ArrayView2<'_, f64>,
    k: usize,
    runner: &C,
    resampler: &Resampler,
    options: &AccumulateOptions,
) -> Result<ConsensusMatrix> {
    let n = dataset.nrows();

    if k < 2 {
        return Err(ConsensusError::InvalidParameter(format!(
            "cluster count must be at least 2, got {k}"
        )));
    }
    if options.iterations == 0 {
        return Err(ConsensusError::InvalidParameter(
            "iterations must be at least 1".into(),
        ));
    }

    let sample_size = resampler.sample_size(n)?;
    if k >= sample_size {
        if !options.relaxed_validation {
            return Err(ConsensusError::InvalidClusterCount { k, sample_size });
        }
        warn!(k, sample_size, "cluster count not below resample size, continuing");
    }

    debug!(
        k,
        n,
        iterations = options.iterations,
        sample_size,
        fraction = resampler.fraction(),
        with_replacement = resampler.with_replacement(),
        "accumulating consensus"
    );

    let rounds = u64::try_from(options.iterations)
        .map_err(|_| ConsensusError::InvalidParameter("too many iterations".into()))?;

    let totals = (0..rounds)
        .into_par_iter()
        .try_fold(
            || ConsensusAccumulator::new(n, k),
            |mut acc, round| -> Result<ConsensusAccumulator> {
                options.cancel.check()?;

                let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
                rng.set_stream(round);

                let sample = resampler.draw(n, &mut rng)?;
                let subset = dataset.select(Axis(0), &sample.indices);
                let labels = runner.cluster(subset.view(), k)?;
                acc.record(&sample, &labels)?;
                Ok(acc)
            },
        )
        .try_reduce(
            || ConsensusAccumulator::new(n, k),
            |mut left, right| -> Result<ConsensusAccumulator> {
                left.merge(&right)?;
                Ok(left)
            },
        )?;

    Ok(totals.finish())
}
