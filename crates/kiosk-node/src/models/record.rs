//! Contribution records - immutable once created.

use chrono::{DateTime, Utc};
use kiosk_ledger::{Allocation, Amount};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide creation counter; orders ids that share a millisecond.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A category-specific annotation value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Number(u64),
    Text(String),
    List(Vec<String>),
}

/// One completed contribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContributionRecord {
    /// `<13-digit unix millis>-<10-digit sequence>-<6 char suffix>`; sorts
    /// by creation order
    pub id: String,

    /// Category the contribution was made to
    pub category_id: String,

    /// Category label at the time of the contribution
    pub category_label: String,

    /// Total amount paid
    pub amount: Amount,

    /// Payment confirmation time
    pub timestamp: DateTime<Utc>,

    /// Bucket split, for bucketed categories only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,

    /// Category-specific annotations (people count, appeal name, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaValue>,
}

impl ContributionRecord {
    /// Create a record stamped now.
    pub fn new(category_id: &str, category_label: &str, amount: Amount) -> Self {
        Self::at(Utc::now(), category_id, category_label, amount)
    }

    /// Create a record with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, category_id: &str, category_label: &str, amount: Amount) -> Self {
        Self {
            id: Self::generate_id(timestamp),
            category_id: category_id.to_string(),
            category_label: category_label.to_string(),
            amount,
            timestamp,
            allocation: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Generate a time-ordered id. Ids with the same millisecond sort in
    /// the order they were generated.
    pub fn generate_id(timestamp: DateTime<Utc>) -> String {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000_000_000;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        format!(
            "{:013}-{:010}-{}",
            timestamp.timestamp_millis().max(0),
            sequence,
            suffix
        )
    }

    /// Attach the bucket split.
    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = Some(allocation);
        self
    }

    /// Attach an annotation.
    pub fn with_meta(mut self, key: &str, value: MetaValue) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}
