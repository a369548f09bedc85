//! Capacity-aware allocation of one lump contribution across buckets.
//!
//! # Phases
//!
//! ```text
//! 1. PREFERRED   min(amount, headroom of preferred set) spread evenly,
//!                rounds of ceil(rest / pool) until the pool saturates
//! 2. SPILLOVER   what is left fills non-preferred buckets one by one,
//!                ascending index, each to capacity
//! 3. FALLBACK    every bucket saturated: the remainder lands on the
//!                lowest non-preferred bucket (or the lowest preferred one)
//! ```
//!
//! The result always sums to the requested amount. Only phase 3 can push a
//! bucket past capacity, and the amount it forces is reported as
//! [`Allocation::overflow`].

use crate::allocation::Allocation;
use crate::error::{LedgerError, Result};
use crate::ledger::{Amount, BucketIndex, LedgerSnapshot};
use std::collections::BTreeSet;

/// A preferred bucket still taking money in phase 1.
#[derive(Debug, Clone, Copy)]
struct Headroom {
    bucket: BucketIndex,
    left: Amount,
}

/// Split `amount` across the snapshot's buckets, favouring `preferred`.
///
/// `preferred` is treated as a set: order and duplicates are ignored. An
/// `amount` of zero produces an empty allocation. Referencing a bucket the
/// snapshot does not have is a caller bug and yields
/// [`LedgerError::BucketOutOfRange`].
///
/// The snapshot is only read; applying the result is up to the caller.
pub fn allocate(
    amount: Amount,
    preferred: &[BucketIndex],
    snapshot: &LedgerSnapshot,
) -> Result<Allocation> {
    let buckets = snapshot.len();
    if buckets == 0 {
        return Err(LedgerError::NoBuckets);
    }
    let preferred: BTreeSet<BucketIndex> = preferred.iter().copied().collect();
    if let Some(&index) = preferred.iter().find(|&&index| index >= buckets) {
        return Err(LedgerError::BucketOutOfRange { index, buckets });
    }

    let mut allocation = Allocation::default();
    if amount == 0 {
        return Ok(allocation);
    }
    let headroom = |bucket: BucketIndex| snapshot.remaining(bucket).unwrap_or(0);
    let mut remaining = amount;

    let mut pool: Vec<Headroom> = preferred
        .iter()
        .map(|&bucket| Headroom {
            bucket,
            left: headroom(bucket),
        })
        .filter(|h| h.left > 0)
        .collect();
    let preferred_capacity: Amount = pool.iter().map(|h| h.left).sum();
    let to_preferred = remaining.min(preferred_capacity);
    distribute_evenly(&mut pool, to_preferred, &mut allocation);
    remaining -= to_preferred;

    for bucket in (0..buckets).filter(|b| !preferred.contains(b)) {
        if remaining == 0 {
            break;
        }
        let applied = remaining.min(headroom(bucket));
        allocation.add(bucket, applied);
        remaining -= applied;
    }

    if remaining > 0 {
        let fallback = (0..buckets)
            .find(|b| !preferred.contains(b))
            .or_else(|| preferred.first().copied())
            .unwrap_or(0);
        allocation.add_overflow(fallback, remaining);
    }

    Ok(allocation)
}

/// Even distribution with saturation.
///
/// Each round offers every bucket in the pool `ceil(rest / pool)`, capped
/// by its headroom and by what is still undistributed; saturated buckets
/// leave the pool. `total` must not exceed the pool's combined headroom.
fn distribute_evenly(pool: &mut Vec<Headroom>, total: Amount, allocation: &mut Allocation) {
    let mut rest = total;
    while rest > 0 && !pool.is_empty() {
        let share = rest.div_ceil(pool.len() as Amount);
        for slot in pool.iter_mut() {
            if rest == 0 {
                break;
            }
            let applied = slot.left.min(share).min(rest);
            allocation.add(slot.bucket, applied);
            slot.left -= applied;
            rest -= applied;
        }
        pool.retain(|slot| slot.left > 0);
    }
}
