//! Bucketed Campaign Ledger
//!
//! The arithmetic core of the donation kiosk: a fixed schedule of buckets
//! (one per campaign day) that share a capacity, an allocator that spreads a
//! single contribution over them, and the progress figures shown on screen.
//!
//! # Flow
//!
//! ```text
//! CapacityLedger ──snapshot()──► allocate(amount, preferred) ──► Allocation
//!       ▲                                                          │
//!       └──────────────────────── apply() ◄────────────────────────┘
//! ```
//!
//! The allocator is pure and never touches the ledger. Whoever owns the
//! ledger takes the snapshot, allocates and applies as one step.
//!
//! # Guarantees
//!
//! - An allocation always sums to the requested amount.
//! - With enough total headroom no bucket ends above capacity.
//! - Preferred buckets are filled before anything spills elsewhere.

mod allocation;
mod allocator;
mod error;
mod ledger;
mod progress;

pub use allocation::{Allocation, BucketShare};
pub use allocator::allocate;
pub use error::{LedgerError, Result};
pub use ledger::{Amount, BucketIndex, CapacityLedger, LedgerSnapshot};
pub use progress::{funded_bucket_count, percent_funded, total_raised, BucketProgress};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_apply_fills_campaign_days() {
        let mut ledger = CapacityLedger::new(30, 300).unwrap();
        let allocation = allocate(900, &[0, 1, 2], &ledger.snapshot()).unwrap();
        ledger.apply(&allocation).unwrap();

        let progress = BucketProgress::of(&ledger.snapshot());
        assert_eq!(progress.funded_buckets, 3);
        assert_eq!(progress.total_raised, 900);
    }
}
