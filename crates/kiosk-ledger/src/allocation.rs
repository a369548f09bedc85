//! Allocation: how one contribution is split across buckets.

use crate::ledger::{Amount, BucketIndex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One `(bucket, amount)` pair of an [`Allocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BucketShare {
    pub bucket: BucketIndex,
    pub amount: Amount,
}

/// Ordered bucket shares for one contribution.
///
/// Shares are kept in the order buckets were first touched; a bucket
/// appears at most once and every amount is positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Allocation {
    shares: Vec<BucketShare>,
    #[cfg_attr(feature = "serde", serde(default))]
    overflow: Amount,
}

impl Allocation {
    /// Build an allocation from raw pairs, merging repeated buckets and
    /// dropping zero amounts.
    pub fn from_shares<I>(shares: I) -> Self
    where
        I: IntoIterator<Item = (BucketIndex, Amount)>,
    {
        let mut allocation = Self::default();
        for (bucket, amount) in shares {
            allocation.add(bucket, amount);
        }
        allocation
    }

    pub(crate) fn add(&mut self, bucket: BucketIndex, amount: Amount) {
        if amount == 0 {
            return;
        }
        match self.shares.iter_mut().find(|share| share.bucket == bucket) {
            Some(share) => share.amount += amount,
            None => self.shares.push(BucketShare { bucket, amount }),
        }
    }

    pub(crate) fn add_overflow(&mut self, bucket: BucketIndex, amount: Amount) {
        self.add(bucket, amount);
        self.overflow += amount;
    }

    /// The shares, in allocation order.
    pub fn shares(&self) -> &[BucketShare] {
        &self.shares
    }

    /// Iterate over the shares.
    pub fn iter(&self) -> impl Iterator<Item = &BucketShare> + '_ {
        self.shares.iter()
    }

    /// Sum of all shares. Equals the requested amount.
    pub fn total(&self) -> Amount {
        self.shares.iter().map(|share| share.amount).sum()
    }

    /// Part of the total that was forced past capacity because every
    /// bucket was already saturated.
    pub fn overflow(&self) -> Amount {
        self.overflow
    }

    /// Amount given to one bucket (zero if untouched).
    pub fn amount_for(&self, bucket: BucketIndex) -> Amount {
        self.shares
            .iter()
            .find(|share| share.bucket == bucket)
            .map_or(0, |share| share.amount)
    }

    /// Number of buckets touched.
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// True if nothing was allocated.
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Shares as plain `(bucket, amount)` pairs.
    pub fn to_pairs(&self) -> Vec<(BucketIndex, Amount)> {
        self.shares.iter().map(|s| (s.bucket, s.amount)).collect()
    }
}

impl<'a> IntoIterator for &'a Allocation {
    type Item = &'a BucketShare;
    type IntoIter = std::slice::Iter<'a, BucketShare>;

    fn into_iter(self) -> Self::IntoIter {
        self.shares.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_buckets_merge_in_first_seen_order() {
        let allocation = Allocation::from_shares([(4, 10), (1, 5), (4, 2), (2, 0)]);
        assert_eq!(allocation.to_pairs(), vec![(4, 12), (1, 5)]);
        assert_eq!(allocation.total(), 17);
        assert_eq!(allocation.amount_for(2), 0);
    }
}
