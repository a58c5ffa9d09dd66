//! Consolidated public types for the conscluster crate
//!
//! This module contains all public structs, enums, and traits used across the crate.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cannot form {k} clusters from a resample of {sample_size} items")]
    InvalidClusterCount { k: usize, sample_size: usize },

    #[error("Cluster runner broke its contract: {0}")]
    ClusterRunnerContract(String),

    #[error("Consensus matrix for k={k} has no defined off-diagonal entries")]
    EmptyDistribution { k: usize },

    #[error("Area under the CDF for k={k} is zero, relative change is undefined")]
    DegenerateArea { k: usize },

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

// ============================================================================
// Run Control
// ============================================================================

/// Cooperative cancellation shared between the caller and running rounds
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; rounds that have not started yet will fail
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// # Errors
    /// Returns `Cancelled` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ConsensusError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Clustering Collaborator
// ============================================================================

/// Anything that can assign `k` cluster labels to the rows of a feature matrix
///
/// Implementations must return exactly one label per row, each in `[0, k)`.
/// Rounds share one runner across threads, hence the `Sync` bound.
pub trait ClusterRunner: Sync {
    /// Cluster the rows of `features` into `k` groups
    ///
    /// # Errors
    /// Returns error if the underlying algorithm fails
    fn cluster(&self, features: ArrayView2<'_, f64>, k: usize) -> Result<Vec<usize>>;
}

impl<F> ClusterRunner for F
where
    F: Fn(ArrayView2<'_, f64>, usize) -> Result<Vec<usize>> + Sync,
{
    fn cluster(&self, features: ArrayView2<'_, f64>, k: usize) -> Result<Vec<usize>> {
        self(features, k)
    }
}

// ============================================================================
// Consensus Types
// ============================================================================

/// Indices of the items drawn for one resampling round
///
/// With replacement the same item may appear more than once; every occurrence
/// is a separate slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub indices: Vec<usize>,
}

impl Sample {
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Pairwise co-clustering frequencies for one candidate cluster count
///
/// Stored row-major in a flat buffer. `None` marks pairs that were never
/// sampled together; the diagonal is always `Some(1.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusMatrix {
    pub(crate) k: usize,
    pub(crate) n: usize,
    pub(crate) values: Vec<Option<f64>>,
    pub(crate) co_sampled: Vec<u64>,
}

impl ConsensusMatrix {
    /// Candidate cluster count this matrix was built for
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of items (rows and columns)
    #[must_use]
    pub fn n_items(&self) -> usize {
        self.n
    }

    /// Consensus value for the pair, `None` when undefined or out of range
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.n || j >= self.n {
            return None;
        }
        self.values[i * self.n + j]
    }

    /// Number of slot pairs, summed over rounds, that held both items
    ///
    /// Without replacement this is the number of rounds that drew both. With
    /// replacement one round adds `m * p` for multiplicities `m` and `p`.
    #[must_use]
    pub fn co_sample_count(&self, i: usize, j: usize) -> u64 {
        if i >= self.n || j >= self.n {
            return 0;
        }
        self.co_sampled[i * self.n + j]
    }

    /// Strictly upper-triangular entries in row order
    pub fn upper_triangle(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        (0..self.n).flat_map(move |i| ((i + 1)..self.n).map(move |j| self.values[i * self.n + j]))
    }

    /// Pairs `(i, j)` with `i < j` that were never sampled together
    #[must_use]
    pub fn undefined_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                if self.values[i * self.n + j].is_none() {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// One step of an empirical CDF
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CdfPoint {
    pub value: f64,
    pub fraction: f64,
}

/// Empirical CDF of the defined off-diagonal entries of a consensus matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CdfCurve {
    pub k: usize,
    /// Distinct values ascending, with the fraction of entries `<=` each
    pub points: Vec<CdfPoint>,
    /// Entries the curve was built from
    pub n_entries: usize,
    /// Undefined entries left out of the distribution
    pub n_excluded: usize,
}

/// Stability score for one candidate cluster count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilitySummary {
    pub k: usize,
    /// Area under the empirical CDF
    pub area: f64,
    /// Raw area for the first candidate, relative change afterwards
    pub delta: f64,
    /// Change in area relative to the previous candidate
    pub relative_change: Option<f64>,
    /// Proportion of ambiguous clustering, `F(0.9) - F(0.1)`
    pub pac: f64,
}

/// Everything produced by one analysis run
#[derive(Debug, Clone)]
pub struct ConsensusReport {
    pub matrices: Vec<ConsensusMatrix>,
    pub curves: Vec<CdfCurve>,
    pub summaries: Vec<StabilitySummary>,
    pub recommended_k: Option<usize>,
}

/// Parameters for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Smallest candidate cluster count
    pub k_min: usize,
    /// Largest candidate cluster count (inclusive)
    pub k_max: usize,
    /// Resampling rounds per candidate
    pub iterations: usize,
    /// Fraction of items drawn per round, in (0, 1]
    pub fraction: f64,
    pub with_replacement: bool,
    pub seed: u64,
    /// Allow k >= resample size instead of failing
    pub relaxed_validation: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 6,
            iterations: 100,
            fraction: 0.8,
            with_replacement: false,
            seed: 42,
            relaxed_validation: false,
        }
    }
}

impl ConsensusConfig {
    /// # Errors
    /// Returns `InvalidParameter` for an unusable combination of settings
    pub fn validate(&self) -> Result<()> {
        if self.k_min < 2 {
            return Err(ConsensusError::InvalidParameter(format!(
                "k_min must be at least 2, got {}",
                self.k_min
            )));
        }
        if self.k_max < self.k_min {
            return Err(ConsensusError::InvalidParameter(format!(
                "k_max ({}) must not be below k_min ({})",
                self.k_max, self.k_min
            )));
        }
        if self.iterations == 0 {
            return Err(ConsensusError::InvalidParameter(
                "iterations must be at least 1".into(),
            ));
        }
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(ConsensusError::InvalidParameter(format!(
                "fraction must be in (0, 1], got {}",
                self.fraction
            )));
        }
        Ok(())
    }

    /// Candidate cluster counts in ascending order
    pub fn candidates(&self) -> impl Iterator<Item = usize> {
        self.k_min..=self.k_max
    }
}

// ============================================================================
// CSV Types
// ============================================================================

/// Represents a parsed CSV/TSV file with headers and rows
#[derive(Debug, Clone)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData {
    /// Get number of rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get number of columns
    #[must_use]
    pub fn col_count(&self) -> usize {
        self.headers.len()
    }

    /// Get a column as a vector of strings
    #[must_use]
    pub fn column(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.headers.len() {
            return None;
        }
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(index).map(String::as_str))
                .collect(),
        )
    }

    /// Find columns that contain numeric data
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn numeric_column_indices(&self) -> Vec<usize> {
        (0..self.col_count())
            .filter(|&i| {
                self.column(i).is_some_and(|col| {
                    // Numeric if at least 50% of non-empty values parse
                    let non_empty: Vec<_> = col.iter().filter(|s| !s.is_empty()).collect();
                    if non_empty.is_empty() {
                        return false;
                    }
                    let numeric_count = non_empty
                        .iter()
                        .filter(|s| s.parse::<f64>().is_ok())
                        .count();
                    numeric_count as f64 / non_empty.len() as f64 >= 0.5
                })
            })
            .collect()
    }
}

// ============================================================================
// Feature Types
// ============================================================================

/// Feature matrix extracted from CSV data
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature names (column headers)
    pub names: Vec<String>,
    /// Row data as feature vectors
    pub data: Vec<Vec<f64>>,
    /// Original row indices (for mapping back)
    pub row_indices: Vec<usize>,
}

impl FeatureMatrix {
    /// Get number of samples (rows)
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.data.len()
    }

    /// Get number of features (columns)
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Convert to flat `Vec<f64>` (row-major)
    #[must_use]
    pub fn to_flat(&self) -> Vec<f64> {
        self.data.iter().flatten().copied().collect()
    }
}
