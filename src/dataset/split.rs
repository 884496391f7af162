//! Seeded random train/validation split.
//!
//! Each record is assigned to the training subset with probability `ratio`.
//! The draw for a record depends only on the seed and the record's position:
//! every position reads from its own ChaCha stream, so the split can be
//! evaluated on any number of workers and still come out the same.

use super::{Dataset, LabeledPoint};
use crate::context::ExecutionContext;
use crate::error::{GearboxError, Result};
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use rayon::iter::Either;
use rayon::prelude::*;

/// Result of splitting one dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitOutcome {
    pub train: Dataset,
    pub validation: Dataset,
}

/// Uniform draw in `[0, 1)` for the record at `position`.
fn draw(seed: u64, position: u64) -> f64 {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(position);
    rng.gen_range(0.0..1.0)
}

/// Check that a split ratio is strictly between 0 and 1.
pub fn check_ratio(ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio < 1.0 {
        Ok(())
    } else {
        Err(GearboxError::Config(format!(
            "split ratio must be strictly between 0 and 1, got {ratio}"
        )))
    }
}

/// Split `dataset` into training and validation subsets.
///
/// Input order is preserved within each subset.
///
/// # Errors
///
/// `Config` if `ratio` is not strictly between 0 and 1.
pub fn split_dataset(
    ctx: &ExecutionContext,
    dataset: Dataset,
    ratio: f64,
    seed: u64,
) -> Result<SplitOutcome> {
    check_ratio(ratio)?;

    let (train, validation): (Vec<LabeledPoint>, Vec<LabeledPoint>) = ctx.install(|| {
        dataset
            .points
            .into_par_iter()
            .enumerate()
            .partition_map(|(position, point)| {
                if draw(seed, position as u64) < ratio {
                    Either::Left(point)
                } else {
                    Either::Right(point)
                }
            })
    });

    tracing::debug!(
        train = train.len(),
        validation = validation.len(),
        ratio,
        seed,
        "split dataset"
    );

    Ok(SplitOutcome {
        train: Dataset::new(train),
        validation: Dataset::new(validation),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx(threads: usize) -> (TempDir, ExecutionContext) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        (dir, ExecutionContext::new(store, threads).unwrap())
    }

    /// Each point carries its position as its only feature so subsets can be
    /// traced back to the input.
    fn numbered(n: usize) -> Dataset {
        (0..n)
            .map(|i| LabeledPoint::new(0, vec![i as f64]))
            .collect()
    }

    fn ids(dataset: &Dataset) -> Vec<usize> {
        dataset
            .points
            .iter()
            .map(|p| p.features[0] as usize)
            .collect()
    }

    #[test]
    fn test_disjoint_and_complete() {
        let (_dir, ctx) = ctx(4);
        let outcome = split_dataset(&ctx, numbered(1000), 0.8, 7).unwrap();

        assert_eq!(outcome.train.len() + outcome.validation.len(), 1000);

        let train: HashSet<usize> = ids(&outcome.train).into_iter().collect();
        let validation: HashSet<usize> = ids(&outcome.validation).into_iter().collect();
        assert!(train.is_disjoint(&validation));
        assert_eq!(train.len() + validation.len(), 1000);
    }

    #[test]
    fn test_same_seed_same_split_regardless_of_threads() {
        let (_d1, one) = ctx(1);
        let (_d2, four) = ctx(4);

        let a = split_dataset(&one, numbered(500), 0.8, 42).unwrap();
        let b = split_dataset(&four, numbered(500), 0.8, 42).unwrap();
        assert_eq!(ids(&a.train), ids(&b.train));
        assert_eq!(ids(&a.validation), ids(&b.validation));
    }

    #[test]
    fn test_different_seed_changes_split() {
        let (_dir, ctx) = ctx(2);
        let a = split_dataset(&ctx, numbered(500), 0.5, 1).unwrap();
        let b = split_dataset(&ctx, numbered(500), 0.5, 2).unwrap();
        assert_ne!(ids(&a.train), ids(&b.train));
    }

    #[test]
    fn test_ratio_governs_sizes() {
        let (_dir, ctx) = ctx(2);
        let outcome = split_dataset(&ctx, numbered(10_000), 0.8, 3).unwrap();
        let share = outcome.train.len() as f64 / 10_000.0;
        assert!((share - 0.8).abs() < 0.03, "train share was {share}");
    }

    #[test]
    fn test_order_preserved_within_subsets() {
        let (_dir, ctx) = ctx(3);
        let outcome = split_dataset(&ctx, numbered(200), 0.7, 11).unwrap();
        let train = ids(&outcome.train);
        assert!(train.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_ratio() {
        let (_dir, ctx) = ctx(1);
        for ratio in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(split_dataset(&ctx, numbered(3), ratio, 1).is_err());
        }
    }

    #[test]
    fn test_empty_dataset() {
        let (_dir, ctx) = ctx(1);
        let outcome = split_dataset(&ctx, Dataset::default(), 0.8, 1).unwrap();
        assert!(outcome.train.is_empty() && outcome.validation.is_empty());
    }
}
