//! Concrete clustering algorithms behind the `ClusterRunner` trait

use crate::ml::linkage::{agglomerate, Linkage};
use crate::structs::{ClusterRunner, ConsensusError, Result};
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// K-means via `linfa-clustering`, seeded so repeated calls agree
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansRunner {
    pub seed: u64,
    pub max_iterations: u64,
    pub tolerance: f64,
    /// Independent initialisations; the lowest inertia wins
    pub n_runs: usize,
}

impl Default for KMeansRunner {
    fn default() -> Self {
        Self {
            seed: 0,
            max_iterations: 100,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl ClusterRunner for KMeansRunner {
    fn cluster(&self, features: ArrayView2<'_, f64>, k: usize) -> Result<Vec<usize>> {
        let n_samples = features.nrows();
        if n_samples < k {
            return Err(ConsensusError::Clustering(format!(
                "Cannot create {k} clusters with only {n_samples} samples"
            )));
        }

        let dataset = DatasetBase::from(features.to_owned());

        let model = KMeans::params_with_rng(k, ChaCha8Rng::seed_from_u64(self.seed))
            .max_n_iterations(self.max_iterations)
            .tolerance(self.tolerance)
            .n_runs(self.n_runs)
            .fit(&dataset)
            .map_err(|e| ConsensusError::Clustering(format!("K-means failed: {e}")))?;

        let labels: Array1<usize> = model.predict(dataset.records());
        Ok(labels.to_vec())
    }
}

/// Euclidean agglomerative clustering cut at `k` groups
///
/// Defaults to Ward linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgglomerativeRunner {
    pub linkage: Linkage,
}

impl Default for AgglomerativeRunner {
    fn default() -> Self {
        Self::new(Linkage::Ward)
    }
}

impl AgglomerativeRunner {
    #[must_use]
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }
}

impl ClusterRunner for AgglomerativeRunner {
    fn cluster(&self, features: ArrayView2<'_, f64>, k: usize) -> Result<Vec<usize>> {
        let n = features.nrows();
        let rows: Vec<_> = features.axis_iter(Axis(0)).collect();
        let distances: Vec<f64> = (0..n * n)
            .map(|cell| {
                let (a, b) = (&rows[cell / n], &rows[cell % n]);
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .collect();

        agglomerate(&distances, n, self.linkage)?
            .cut(k)
            .map_err(|e| ConsensusError::Clustering(e.to_string()))
    }
}

/// Z-score every column of the subsample before handing it to `inner`
///
/// Constant columns are centred but not scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardized<R> {
    pub inner: R,
}

impl<R> Standardized<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: ClusterRunner> ClusterRunner for Standardized<R> {
    fn cluster(&self, features: ArrayView2<'_, f64>, k: usize) -> Result<Vec<usize>> {
        let scaled = standardize(features)?;
        self.inner.cluster(scaled.view(), k)
    }
}

/// Population mean and standard deviation per column, as scikit-learn's
/// `StandardScaler` computes them
///
/// # Errors
/// Returns `Clustering` for an empty matrix
pub fn standardize(features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let mean = features
        .mean_axis(Axis(0))
        .ok_or_else(|| ConsensusError::Clustering("Cannot standardize an empty matrix".into()))?;
    let std = features
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });

    Ok((&features - &mean) / &std)
}
