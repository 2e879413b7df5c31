use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Folds `range` into thread-private accumulators and merges them.
///
/// `merge` must be associative and `identity()` its neutral element; the result is then
/// independent of how the range is partitioned, up to floating-point reassociation.
pub fn parallel_reduce<A, Id, F, M>(range: Range<usize>, identity: Id, fold: F, merge: M) -> A
where
    A: Send,
    Id: Fn() -> A + Sync + Send,
    F: Fn(A, usize) -> A + Sync + Send,
    M: Fn(A, A) -> A + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let result = range.into_par_iter().fold(&identity, &fold).reduce(&identity, &merge);
    #[cfg(not(feature = "parallel"))]
    let result = merge(identity(), range.fold(identity(), &fold));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_match_serial_evaluation() {
        let total = parallel_reduce(0..10_001, || 0u64, |acc, i| acc + i as u64, |a, b| a + b);
        assert_eq!(total, 10_000 * 10_001 / 2);
    }

    #[test]
    fn array_accumulators_merge_componentwise() {
        let sums = parallel_reduce(
            0..1000,
            || [0.0f64; 2],
            |mut acc, i| {
                acc[i % 2] += 1.0;
                acc
            },
            |mut a, b| {
                a[0] += b[0];
                a[1] += b[1];
                a
            },
        );
        assert_eq!(sums, [500.0, 500.0]);
    }

    #[test]
    fn empty_range_yields_identity() {
        let value = parallel_reduce(0..0, || 7i32, |acc, _| acc + 1, |a, b| a.max(b));
        assert_eq!(value, 7);
    }
}
