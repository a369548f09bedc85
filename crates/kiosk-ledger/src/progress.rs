//! Campaign progress derived from the ledger. Nothing here is cached.

use crate::ledger::{Amount, LedgerSnapshot};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of buckets that reached capacity.
pub fn funded_bucket_count(snapshot: &LedgerSnapshot) -> usize {
    let capacity = snapshot.capacity();
    snapshot.totals().iter().filter(|&&total| total >= capacity).count()
}

/// Sum of every bucket's accumulated total.
pub fn total_raised(snapshot: &LedgerSnapshot) -> Amount {
    snapshot.totals().iter().sum()
}

/// `round(100 * min(raised, target) / target)`, in `0..=100`.
///
/// A zero target reads as 0%.
pub fn percent_funded(raised: Amount, target: Amount) -> u8 {
    if target == 0 {
        return 0;
    }
    let raised = u128::from(raised.min(target));
    let target = u128::from(target);
    // half-up rounding in integers
    let percent = (raised * 200 + target) / (target * 2);
    percent.min(100) as u8
}

/// Aggregate view of a bucketed campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BucketProgress {
    /// Buckets at or above capacity
    pub funded_buckets: usize,
    /// Total bucket count
    pub buckets: usize,
    /// Sum of accumulated totals
    pub total_raised: Amount,
    /// `capacity * buckets`
    pub target_total: Amount,
    /// Amount raised beyond `target_total`
    pub excess: Amount,
}

impl BucketProgress {
    /// Derive progress from a snapshot.
    pub fn of(snapshot: &LedgerSnapshot) -> Self {
        let total_raised = total_raised(snapshot);
        let target_total = snapshot.capacity().saturating_mul(snapshot.len() as Amount);
        Self {
            funded_buckets: funded_bucket_count(snapshot),
            buckets: snapshot.len(),
            total_raised,
            target_total,
            excess: total_raised.saturating_sub(target_total),
        }
    }

    /// Percentage of the whole campaign target raised.
    pub fn percent_funded(&self) -> u8 {
        percent_funded(self.total_raised, self.target_total)
    }
}
