//! Capacity ledger: per-bucket accumulated totals under a shared capacity.
//!
//! The ledger is plain data. It never decides where money goes; it only
//! records allocations produced by [`allocate`](crate::allocate) and hands
//! out immutable [`LedgerSnapshot`]s for the allocator to read.

use crate::allocation::Allocation;
use crate::error::{LedgerError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whole currency units. Kiosk amounts are entered as integers.
pub type Amount = u64;

/// Position of a bucket in the campaign schedule, `0..N`.
pub type BucketIndex = usize;

/// Accumulated totals for every bucket of one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CapacityLedger {
    capacity: Amount,
    accumulated: Vec<Amount>,
}

impl CapacityLedger {
    /// Create an empty ledger of `buckets` buckets sharing `capacity`.
    pub fn new(buckets: usize, capacity: Amount) -> Result<Self> {
        Self::with_totals(capacity, vec![0; buckets])
    }

    /// Create a ledger from previously accumulated totals.
    pub fn with_totals(capacity: Amount, accumulated: Vec<Amount>) -> Result<Self> {
        if accumulated.is_empty() {
            return Err(LedgerError::NoBuckets);
        }
        if capacity == 0 {
            return Err(LedgerError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            accumulated,
        })
    }

    /// Rebuild a ledger by replaying finalized allocations in order.
    pub fn replay<'a, I>(buckets: usize, capacity: Amount, allocations: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Allocation>,
    {
        let mut ledger = Self::new(buckets, capacity)?;
        for allocation in allocations {
            ledger.apply(allocation)?;
        }
        Ok(ledger)
    }

    /// Shared per-bucket capacity (the daily target).
    pub fn capacity(&self) -> Amount {
        self.capacity
    }

    /// Change the shared capacity. Existing totals are left untouched.
    pub fn set_capacity(&mut self, capacity: Amount) -> Result<()> {
        if capacity == 0 {
            return Err(LedgerError::ZeroCapacity);
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    /// Always false for a constructed ledger.
    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    /// Accumulated total of one bucket.
    pub fn accumulated(&self, index: BucketIndex) -> Option<Amount> {
        self.accumulated.get(index).copied()
    }

    /// All accumulated totals, indexed by bucket.
    pub fn totals(&self) -> &[Amount] {
        &self.accumulated
    }

    /// Overwrite every total at once (used when a remote instance publishes
    /// its finalized ledger).
    pub fn replace_totals(&mut self, totals: Vec<Amount>) -> Result<()> {
        if totals.len() != self.accumulated.len() {
            return Err(LedgerError::LengthMismatch {
                expected: self.accumulated.len(),
                actual: totals.len(),
            });
        }
        self.accumulated = totals;
        Ok(())
    }

    /// Add every share of `allocation` to its bucket.
    ///
    /// All indices are checked before anything is written, so a rejected
    /// allocation leaves the ledger exactly as it was.
    pub fn apply(&mut self, allocation: &Allocation) -> Result<()> {
        let buckets = self.accumulated.len();
        if let Some(share) = allocation.iter().find(|share| share.bucket >= buckets) {
            return Err(LedgerError::BucketOutOfRange {
                index: share.bucket,
                buckets,
            });
        }
        for share in allocation.iter() {
            let total = &mut self.accumulated[share.bucket];
            *total = total.saturating_add(share.amount);
        }
        Ok(())
    }

    /// Administrative reset: every bucket back to zero.
    pub fn reset(&mut self) {
        self.accumulated.iter_mut().for_each(|total| *total = 0);
    }

    /// Immutable copy for the allocator.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            capacity: self.capacity,
            accumulated: self.accumulated.clone().into_boxed_slice(),
        }
    }
}

/// Point-in-time view of a [`CapacityLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    capacity: Amount,
    accumulated: Box<[Amount]>,
}

impl LedgerSnapshot {
    /// Shared per-bucket capacity.
    pub fn capacity(&self) -> Amount {
        self.capacity
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    /// True if the snapshot covers no buckets.
    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    /// Accumulated totals, indexed by bucket.
    pub fn totals(&self) -> &[Amount] {
        &self.accumulated
    }

    /// Accumulated total of one bucket.
    pub fn accumulated(&self, index: BucketIndex) -> Option<Amount> {
        self.accumulated.get(index).copied()
    }

    /// Headroom left in one bucket, floored at zero.
    pub fn remaining(&self, index: BucketIndex) -> Option<Amount> {
        self.accumulated(index)
            .map(|total| self.capacity.saturating_sub(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ledger_is_zeroed() {
        let ledger = CapacityLedger::new(30, 300).unwrap();
        assert_eq!(ledger.len(), 30);
        assert!(ledger.totals().iter().all(|&t| t == 0));
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert_eq!(CapacityLedger::new(0, 300), Err(LedgerError::NoBuckets));
        assert_eq!(CapacityLedger::new(30, 0), Err(LedgerError::ZeroCapacity));
    }

    #[test]
    fn apply_adds_each_share() {
        let mut ledger = CapacityLedger::new(5, 100).unwrap();
        let allocation = Allocation::from_shares([(1, 40), (3, 60)]);
        ledger.apply(&allocation).unwrap();
        ledger.apply(&allocation).unwrap();
        assert_eq!(ledger.totals(), &[0, 80, 0, 120, 0]);
    }

    #[test]
    fn out_of_range_allocation_is_not_partially_applied() {
        let mut ledger = CapacityLedger::new(3, 100).unwrap();
        let allocation = Allocation::from_shares([(0, 10), (7, 10)]);
        let err = ledger.apply(&allocation).unwrap_err();
        assert_eq!(err, LedgerError::BucketOutOfRange { index: 7, buckets: 3 });
        assert_eq!(ledger.totals(), &[0, 0, 0]);
    }

    #[test]
    fn capacity_change_keeps_totals() {
        let mut ledger = CapacityLedger::with_totals(300, vec![300, 150]).unwrap();
        ledger.set_capacity(100).unwrap();
        assert_eq!(ledger.totals(), &[300, 150]);
        assert_eq!(ledger.snapshot().remaining(1), Some(0));
    }

    #[test]
    fn replace_totals_checks_length() {
        let mut ledger = CapacityLedger::new(3, 100).unwrap();
        assert!(ledger.replace_totals(vec![1, 2]).is_err());
        ledger.replace_totals(vec![1, 2, 3]).unwrap();
        assert_eq!(ledger.accumulated(2), Some(3));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ledger = CapacityLedger::new(2, 100).unwrap();
        let before = ledger.snapshot();
        ledger.apply(&Allocation::from_shares([(0, 25)])).unwrap();
        assert_eq!(before.accumulated(0), Some(0));
        assert_eq!(before.remaining(0), Some(100));
        assert_eq!(ledger.snapshot().remaining(0), Some(75));
    }

    #[test]
    fn replay_matches_incremental_apply() {
        let allocations = vec![
            Allocation::from_shares([(0, 100)]),
            Allocation::from_shares([(0, 50), (2, 10)]),
        ];
        let ledger = CapacityLedger::replay(3, 100, &allocations).unwrap();
        assert_eq!(ledger.totals(), &[150, 0, 10]);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut ledger = CapacityLedger::with_totals(10, vec![5, 10, 20]).unwrap();
        ledger.reset();
        assert_eq!(ledger.totals(), &[0, 0, 0]);
        assert_eq!(ledger.capacity(), 10);
    }
}
