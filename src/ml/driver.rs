//! Analysis driver that runs consensus clustering over a range of k

use crate::ml::consensus::{build_consensus_matrix, AccumulateOptions};
use crate::ml::resample::Resampler;
use crate::ml::stability::{empirical_cdf, recommend_k, scores_from_curves};
use crate::structs::{
    CancelFlag, ClusterRunner, ConsensusConfig, ConsensusError, ConsensusReport, Result,
};
use ndarray::ArrayView2;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use tracing::info;

/// Build one consensus matrix per candidate k and score them together
///
/// Each candidate gets its own accumulator and its own seed, drawn in order
/// from `config.seed`, so a run is reproducible end to end.
///
/// # Errors
/// Returns the first error from validation, accumulation, or scoring; no
/// partial report is produced.
pub fn analyze<C: ClusterRunner + ?Sized>(
    dataset: ArrayView2<'_, f64>,
    runner: &C,
    config: &ConsensusConfig,
    cancel: &CancelFlag,
) -> Result<ConsensusReport> {
    config.validate()?;
    if dataset.ncols() == 0 {
        return Err(ConsensusError::InvalidParameter(
            "dataset has no feature columns".into(),
        ));
    }

    let resampler = Resampler::new(config.fraction, config.with_replacement)?;
    let mut seeds = ChaCha8Rng::seed_from_u64(config.seed);

    info!(
        items = dataset.nrows(),
        features = dataset.ncols(),
        k_min = config.k_min,
        k_max = config.k_max,
        iterations = config.iterations,
        "starting consensus analysis"
    );

    let mut matrices = Vec::new();
    for k in config.candidates() {
        let started = Instant::now();
        let options = AccumulateOptions {
            iterations: config.iterations,
            seed: seeds.next_u64(),
            relaxed_validation: config.relaxed_validation,
            cancel: cancel.clone(),
        };

        let matrix = build_consensus_matrix(dataset, k, runner, &resampler, &options)?;
        info!(
            k,
            undefined_pairs = matrix.undefined_pairs().len(),
            elapsed_ms = started.elapsed().as_millis(),
            "consensus matrix ready"
        );
        matrices.push(matrix);
    }

    let curves = matrices
        .iter()
        .map(empirical_cdf)
        .collect::<Result<Vec<_>>>()?;
    let summaries = scores_from_curves(&curves)?;
    let recommended_k = recommend_k(&summaries);

    info!(?recommended_k, "stability scoring complete");

    Ok(ConsensusReport {
        matrices,
        curves,
        summaries,
        recommended_k,
    })
}
