//! Empirical CDF of consensus values and CDF-area stability scores

use crate::structs::{
    CdfCurve, CdfPoint, ConsensusError, ConsensusMatrix, Result, StabilitySummary,
};

/// Consensus values at or below this count as "apart" for PAC
pub const PAC_LOWER: f64 = 0.1;
/// Consensus values above this count as "together" for PAC
pub const PAC_UPPER: f64 = 0.9;

/// Build the empirical CDF of the strictly upper-triangular entries of `m`
///
/// Undefined entries (pairs never sampled together) are left out of the
/// distribution entirely and reported in `n_excluded`.
///
/// # Errors
/// Returns `EmptyDistribution` if `m` has no defined off-diagonal entries
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn empirical_cdf(m: &ConsensusMatrix) -> Result<CdfCurve> {
    let mut values: Vec<f64> = Vec::new();
    let mut n_excluded = 0usize;
    for entry in m.upper_triangle() {
        match entry {
            Some(v) => values.push(v),
            None => n_excluded += 1,
        }
    }

    if values.is_empty() {
        return Err(ConsensusError::EmptyDistribution { k: m.k() });
    }

    values.sort_by(f64::total_cmp);

    let total = values.len() as f64;
    let mut points: Vec<CdfPoint> = Vec::new();
    for (idx, &value) in values.iter().enumerate() {
        let fraction = (idx + 1) as f64 / total;
        match points.last_mut() {
            Some(last) if last.value == value => last.fraction = fraction,
            _ => points.push(CdfPoint { value, fraction }),
        }
    }

    Ok(CdfCurve {
        k: m.k(),
        points,
        n_entries: values.len(),
        n_excluded,
    })
}

impl CdfCurve {
    /// Fraction of entries `<= x`
    #[must_use]
    pub fn fraction_at(&self, x: f64) -> f64 {
        let below = self.points.partition_point(|p| p.value <= x);
        if below == 0 {
            0.0
        } else {
            self.points[below - 1].fraction
        }
    }

    /// Area under the curve by the trapezoidal rule over its points
    #[must_use]
    pub fn area(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].value - w[0].value) * (w[0].fraction + w[1].fraction) / 2.0)
            .sum()
    }

    /// Proportion of ambiguous clustering: share of entries in `(lower, upper]`
    #[must_use]
    pub fn pac(&self, lower: f64, upper: f64) -> f64 {
        self.fraction_at(upper) - self.fraction_at(lower)
    }
}

/// Score each consensus matrix by the area under its CDF
///
/// `matrices` must be ordered by strictly increasing cluster count. The first
/// candidate has no relative change; its `delta` is its raw area.
///
/// # Errors
/// Returns `InvalidParameter` for an empty or misordered list,
/// `EmptyDistribution` if a matrix has no defined entries, and
/// `DegenerateArea` when a predecessor's area is zero
pub fn stability_scores(matrices: &[ConsensusMatrix]) -> Result<Vec<StabilitySummary>> {
    let curves = matrices
        .iter()
        .map(empirical_cdf)
        .collect::<Result<Vec<_>>>()?;
    scores_from_curves(&curves)
}

/// Same as [`stability_scores`] for curves that were already computed
///
/// # Errors
/// See [`stability_scores`]
#[allow(clippy::float_cmp)]
pub fn scores_from_curves(curves: &[CdfCurve]) -> Result<Vec<StabilitySummary>> {
    if curves.is_empty() {
        return Err(ConsensusError::InvalidParameter(
            "need at least one consensus matrix to score".into(),
        ));
    }
    if let Some(w) = curves.windows(2).find(|w| w[1].k <= w[0].k) {
        return Err(ConsensusError::InvalidParameter(format!(
            "cluster counts must be strictly increasing, got {} after {}",
            w[1].k, w[0].k
        )));
    }

    let mut summaries: Vec<StabilitySummary> = Vec::with_capacity(curves.len());
    for curve in curves {
        let area = curve.area();
        let relative_change = match summaries.last() {
            None => None,
            Some(prev) if prev.area == 0.0 => {
                return Err(ConsensusError::DegenerateArea { k: prev.k });
            }
            Some(prev) => Some((area - prev.area) / prev.area),
        };

        summaries.push(StabilitySummary {
            k: curve.k,
            area,
            delta: relative_change.unwrap_or(area),
            relative_change,
            pac: curve.pac(PAC_LOWER, PAC_UPPER),
        });
    }

    Ok(summaries)
}

/// Candidate with the largest relative change in CDF area
///
/// The smallest candidate has nothing to compare against and is never
/// recommended. Ties go to the smaller cluster count.
#[must_use]
pub fn recommend_k(summaries: &[StabilitySummary]) -> Option<usize> {
    summaries
        .iter()
        .filter_map(|s| s.relative_change.map(|change| (s.k, change)))
        .fold(None, |best: Option<(usize, f64)>, (k, change)| match best {
            Some((_, best_change)) if best_change >= change => best,
            _ => Some((k, change)),
        })
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(k: usize, rows: &[&[Option<f64>]]) -> ConsensusMatrix {
        let n = rows.len();
        let values = rows.iter().flat_map(|r| r.iter().copied()).collect();
        ConsensusMatrix {
            k,
            n,
            values,
            co_sampled: vec![1; n * n],
        }
    }

    fn graded(k: usize) -> ConsensusMatrix {
        let s = Some;
        matrix(
            k,
            &[
                &[s(1.0), s(0.9), s(0.1), s(0.0)],
                &[s(0.9), s(1.0), s(0.2), s(0.1)],
                &[s(0.1), s(0.2), s(1.0), s(0.8)],
                &[s(0.0), s(0.1), s(0.8), s(1.0)],
            ],
        )
    }

    #[test]
    fn test_cdf_steps() {
        let curve = empirical_cdf(&graded(2)).expect("cdf");

        // Upper triangle: 0.9, 0.1, 0.0, 0.2, 0.1, 0.8
        let values: Vec<f64> = curve.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.0, 0.1, 0.2, 0.8, 0.9]);
        assert_eq!(curve.n_entries, 6);
        assert_eq!(curve.n_excluded, 0);
        assert!((curve.fraction_at(0.1) - 0.5).abs() < 1e-12);
        assert!((curve.fraction_at(0.15) - 0.5).abs() < 1e-12);
        assert!(curve.fraction_at(-0.1).abs() < 1e-12);
    }

    #[test]
    fn test_cdf_monotone_and_reaches_one() {
        let curve = empirical_cdf(&graded(3)).expect("cdf");

        assert!(curve
            .points
            .windows(2)
            .all(|w| w[0].fraction <= w[1].fraction && w[0].value < w[1].value));
        let last = curve.points.last().expect("non-empty");
        assert!((last.fraction - 1.0).abs() < 1e-12);
        assert!((curve.fraction_at(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_entries_excluded() {
        let s = Some;
        let m = matrix(
            2,
            &[
                &[s(1.0), None, s(0.5)],
                &[None, s(1.0), s(1.0)],
                &[s(0.5), s(1.0), s(1.0)],
            ],
        );

        let curve = empirical_cdf(&m).expect("cdf");

        assert_eq!(curve.n_entries, 2);
        assert_eq!(curve.n_excluded, 1);
        assert!((curve.fraction_at(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_distribution() {
        let m = matrix(4, &[&[Some(1.0), None], &[None, Some(1.0)]]);

        assert!(matches!(
            empirical_cdf(&m),
            Err(ConsensusError::EmptyDistribution { k: 4 })
        ));
    }

    #[test]
    fn test_area_trapezoid() {
        let s = Some;
        // Entries 0, 0, 1 -> points (0, 2/3), (1, 1)
        let m = matrix(
            2,
            &[
                &[s(1.0), s(0.0), s(0.0)],
                &[s(0.0), s(1.0), s(1.0)],
                &[s(0.0), s(1.0), s(1.0)],
            ],
        );
        let curve = empirical_cdf(&m).expect("cdf");

        assert!((curve.area() - 5.0 / 6.0).abs() < 1e-12);
        assert!(curve.pac(PAC_LOWER, PAC_UPPER).abs() < 1e-12);
    }

    #[test]
    fn test_identical_matrices_have_zero_change() {
        let matrices = vec![graded(2), graded(3), graded(4)];
        let scores = stability_scores(&matrices).expect("scores");

        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0].relative_change, None);
        assert!((scores[0].delta - scores[0].area).abs() < 1e-12);
        for s in &scores[1..] {
            assert_eq!(s.relative_change, Some(0.0));
        }
    }

    #[test]
    fn test_relative_change_and_recommendation() {
        let s = Some;
        let spread = matrix(
            2,
            &[
                &[s(1.0), s(0.5), s(0.4)],
                &[s(0.5), s(1.0), s(0.6)],
                &[s(0.4), s(0.6), s(1.0)],
            ],
        );
        let scores = stability_scores(&[spread, graded(3), graded(4)]).expect("scores");

        let expected = (scores[1].area - scores[0].area) / scores[0].area;
        assert_eq!(scores[1].relative_change, Some(expected));
        assert_eq!(recommend_k(&scores), Some(3));
    }

    #[test]
    fn test_degenerate_area() {
        let s = Some;
        let flat = matrix(2, &[&[s(1.0), s(0.5)], &[s(0.5), s(1.0)]]);

        assert!(matches!(
            stability_scores(&[flat, graded(3)]),
            Err(ConsensusError::DegenerateArea { k: 2 })
        ));
    }

    #[test]
    fn test_ordering_required() {
        assert!(matches!(
            stability_scores(&[graded(3), graded(2)]),
            Err(ConsensusError::InvalidParameter(_))
        ));
        assert!(matches!(
            stability_scores(&[]),
            Err(ConsensusError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_recommend_needs_two_candidates() {
        let scores = stability_scores(&[graded(2)]).expect("scores");
        assert_eq!(recommend_k(&scores), None);
    }
}
