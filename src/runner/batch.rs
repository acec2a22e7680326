//! Batch planning over a partition's offsets.

use crate::types::BatchRange;

/// Consecutive `[start, start + batch_size)` ranges from `start` to `total`
///
/// The last range is clipped to `total`. A zero batch size is treated as 1.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    next: usize,
    total: usize,
    batch_size: usize,
}

impl BatchPlan {
    /// Plan batches from offset `start`
    pub fn new(start: usize, total: usize, batch_size: usize) -> Self {
        Self {
            next: start.min(total),
            total,
            batch_size: batch_size.max(1),
        }
    }

    /// Batches not yet yielded
    pub fn remaining_batches(&self) -> usize {
        (self.total - self.next).div_ceil(self.batch_size)
    }
}

impl Iterator for BatchPlan {
    type Item = BatchRange;

    fn next(&mut self) -> Option<BatchRange> {
        if self.next >= self.total {
            return None;
        }
        let range = BatchRange::new(self.next, (self.next + self.batch_size).min(self.total));
        self.next = range.end;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining_batches();
        (n, Some(n))
    }
}

impl ExactSizeIterator for BatchPlan {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(plan: BatchPlan) -> Vec<(usize, usize)> {
        plan.map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn full_partition_is_cut_into_clipped_batches() {
        let plan = BatchPlan::new(0, 237, 50);
        assert_eq!(plan.len(), 5);
        assert_eq!(
            ranges(plan),
            vec![(0, 50), (50, 100), (100, 150), (150, 200), (200, 237)]
        );
    }

    #[test]
    fn plan_resumes_at_checkpoint() {
        assert_eq!(ranges(BatchPlan::new(150, 237, 50)), vec![(150, 200), (200, 237)]);
        assert_eq!(ranges(BatchPlan::new(73, 130, 50)), vec![(73, 123), (123, 130)]);
    }

    #[test]
    fn complete_or_empty_partitions_yield_nothing() {
        assert_eq!(BatchPlan::new(237, 237, 50).count(), 0);
        assert_eq!(BatchPlan::new(300, 237, 50).count(), 0);
        assert_eq!(BatchPlan::new(0, 0, 50).count(), 0);
    }

    #[test]
    fn zero_batch_size_degrades_to_single_items() {
        assert_eq!(ranges(BatchPlan::new(0, 3, 0)), vec![(0, 1), (1, 2), (2, 3)]);
    }
}
