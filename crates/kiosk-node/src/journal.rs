//! Transaction Log: completed contributions, oldest first.
//!
//! [`TransactionLog`] is the in-memory log; [`Journal`] persists each record
//! under its own `tx:<id>` key. Record ids start with a zero-padded
//! millisecond timestamp followed by a per-process sequence number, so key
//! order is insertion order even within one millisecond.

use crate::error::Result;
use crate::models::ContributionRecord;
use crate::store::StateStore;
use chrono::NaiveDate;
use kiosk_ledger::Amount;
use serde::{Deserialize, Serialize};
use std::iter::Rev;
use std::slice;
use std::sync::Arc;
use tracing::{info, warn};

/// Key prefix for journal records.
pub const RECORD_PREFIX: &str = "tx:";

/// Which records a query returns. Dates are inclusive and compared against
/// the UTC calendar date of each record's timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl ReportFilter {
    /// Records of one category.
    pub fn category(id: &str) -> Self {
        Self {
            category: Some(id.to_string()),
            ..Self::default()
        }
    }

    /// Restrict to an inclusive date range.
    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, record: &ContributionRecord) -> bool {
        if let Some(category) = &self.category {
            if &record.category_id != category {
                return false;
            }
        }
        let day = record.timestamp.date_naive();
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }
}

/// Append-only log of contribution records.
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    records: Vec<ContributionRecord>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record after every existing one.
    pub fn append(&mut self, record: ContributionRecord) {
        self.records.push(record);
    }

    /// Matching records, most recent first. The returned iterator is lazy
    /// and can be cloned to restart it.
    pub fn query(&self, filter: &ReportFilter) -> Query<'_> {
        Query {
            records: self.records.iter().rev(),
            filter: filter.clone(),
        }
    }

    /// Remove records of `category`, or every record when `None`. Returns
    /// how many were removed.
    pub fn purge(&mut self, category: Option<&str>) -> usize {
        let before = self.records.len();
        match category {
            Some(id) => self.records.retain(|r| r.category_id != id),
            None => self.records.clear(),
        }
        before - self.records.len()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ContributionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lazy query over a [`TransactionLog`].
#[derive(Debug, Clone)]
pub struct Query<'a> {
    records: Rev<slice::Iter<'a, ContributionRecord>>,
    filter: ReportFilter,
}

impl<'a> Iterator for Query<'a> {
    type Item = &'a ContributionRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = &self.filter;
        self.records.find(|r| filter.matches(r))
    }
}

/// Query result with its total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub filter: ReportFilter,
    pub records: Vec<ContributionRecord>,
    pub total: Amount,
}

impl Report {
    pub fn from_log(log: &TransactionLog, filter: ReportFilter) -> Self {
        let records: Vec<_> = log.query(&filter).cloned().collect();
        let total = records.iter().map(|r| r.amount).sum();
        Self {
            filter,
            records,
            total,
        }
    }
}

/// Transaction Log persisted in a [`StateStore`].
#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn StateStore>,
}

impl Journal {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Persist one record.
    pub fn append(&self, record: &ContributionRecord) -> Result<()> {
        let key = format!("{}{}", RECORD_PREFIX, record.id);
        self.store.put(&key, &serde_json::to_vec(record)?)
    }

    /// Read every record back, oldest first. Unreadable entries are skipped.
    pub fn load(&self) -> Result<TransactionLog> {
        let mut log = TransactionLog::new();
        for (key, value) in self.store.scan_prefix(RECORD_PREFIX)? {
            match serde_json::from_slice::<ContributionRecord>(&value) {
                Ok(record) => log.append(record),
                Err(e) => warn!("Skipping corrupt journal entry {}: {}", key, e),
            }
        }
        Ok(log)
    }

    /// Delete records of `category`, or all records when `None`.
    pub fn purge(&self, category: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        for (key, value) in self.store.scan_prefix(RECORD_PREFIX)? {
            let matches = match category {
                None => true,
                // Unreadable entries cannot be attributed; only a full purge removes them.
                Some(id) => serde_json::from_slice::<ContributionRecord>(&value)
                    .map(|r| r.category_id == id)
                    .unwrap_or(false),
            };
            if matches {
                self.store.delete(&key)?;
                removed += 1;
            }
        }
        info!(
            "Purged {} journal records ({})",
            removed,
            category.unwrap_or("all categories")
        );
        Ok(removed)
    }

    /// Load and query in one step.
    pub fn report(&self, filter: ReportFilter) -> Result<Report> {
        Ok(Report::from_log(&self.load()?, filter))
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}
