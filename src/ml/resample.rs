//! Random subsampling of dataset items

use crate::structs::{ConsensusError, Result, Sample};
use rand::seq::index;
use rand::Rng;

/// Slack applied before rounding up so that `0.3 * 10` yields 3 items, not 4
const SIZE_TOLERANCE: f64 = 1e-9;

/// How each round draws its items
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    fraction: f64,
    with_replacement: bool,
}

impl Resampler {
    /// # Errors
    /// Returns `InvalidParameter` if `fraction` is not in (0, 1]
    pub fn new(fraction: f64, with_replacement: bool) -> Result<Self> {
        check_fraction(fraction)?;
        Ok(Self {
            fraction,
            with_replacement,
        })
    }

    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    #[must_use]
    pub fn with_replacement(&self) -> bool {
        self.with_replacement
    }

    /// Number of slots in every sample drawn from `n` items
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `n < 2`
    pub fn sample_size(&self, n: usize) -> Result<usize> {
        check_item_count(n)?;
        Ok(sample_size(n, self.fraction))
    }

    /// Draw one sample of `n` items
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `n < 2`
    pub fn draw<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Sample> {
        resample(n, self.fraction, self.with_replacement, rng)
    }
}

/// Draw `⌈fraction × n⌉` indices in `[0, n)`, sorted ascending
///
/// Without replacement the indices are distinct; with replacement an index may
/// repeat.
///
/// # Errors
/// Returns `InvalidParameter` if `fraction` is not in (0, 1] or `n < 2`
pub fn resample<R: Rng + ?Sized>(
    n: usize,
    fraction: f64,
    with_replacement: bool,
    rng: &mut R,
) -> Result<Sample> {
    check_fraction(fraction)?;
    check_item_count(n)?;

    let size = sample_size(n, fraction);
    let mut indices: Vec<usize> = if with_replacement {
        (0..size).map(|_| rng.gen_range(0..n)).collect()
    } else {
        index::sample(rng, n, size).into_vec()
    };
    indices.sort_unstable();

    Ok(Sample { indices })
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn sample_size(n: usize, fraction: f64) -> usize {
    let size = (fraction * n as f64 - SIZE_TOLERANCE).ceil() as usize;
    size.clamp(1, n)
}

fn check_fraction(fraction: f64) -> Result<()> {
    // Written so that NaN is rejected too
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(())
    } else {
        Err(ConsensusError::InvalidParameter(format!(
            "resample fraction must be in (0, 1], got {fraction}"
        )))
    }
}

fn check_item_count(n: usize) -> Result<()> {
    if n < 2 {
        return Err(ConsensusError::InvalidParameter(format!(
            "need at least 2 items to resample, got {n}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_half_of_five_without_replacement() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let sample = resample(5, 0.5, false, &mut rng).expect("resample");
            assert_eq!(sample.len(), 3);
            assert!(sample.indices.iter().all(|&i| i < 5));
            assert!(sample.indices.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_full_fraction_takes_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sample = resample(10, 1.0, false, &mut rng).expect("resample");

        assert_eq!(sample.indices, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_sample_size_rounding() {
        assert_eq!(sample_size(10, 0.3), 3);
        assert_eq!(sample_size(10, 0.31), 4);
        assert_eq!(sample_size(3, 0.01), 1);
        assert_eq!(sample_size(7, 1.0), 7);
    }

    #[test]
    fn test_with_replacement_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut saw_duplicate = false;

        for _ in 0..100 {
            let sample = resample(6, 1.0, true, &mut rng).expect("resample");
            assert_eq!(sample.len(), 6);
            assert!(sample.indices.iter().all(|&i| i < 6));
            saw_duplicate |= sample.indices.windows(2).any(|w| w[0] == w[1]);
        }

        assert!(saw_duplicate);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let mut a = ChaCha8Rng::seed_from_u64(99);
        let mut b = ChaCha8Rng::seed_from_u64(99);

        for _ in 0..10 {
            assert_eq!(
                resample(50, 0.4, false, &mut a).expect("resample"),
                resample(50, 0.4, false, &mut b).expect("resample")
            );
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        for fraction in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                resample(10, fraction, false, &mut rng),
                Err(ConsensusError::InvalidParameter(_))
            ));
        }
        assert!(matches!(
            resample(1, 0.5, false, &mut rng),
            Err(ConsensusError::InvalidParameter(_))
        ));
        assert!(Resampler::new(0.0, false).is_err());
    }
}
