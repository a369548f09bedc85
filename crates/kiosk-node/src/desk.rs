//! Contribution desk: turns a confirmed donation into a ledger mutation,
//! a journal record, and a published state update.

use crate::error::{Error, Result};
use crate::journal::{Journal, Report, ReportFilter};
use crate::models::{Category, CategoryKind, ContributionRecord, MetaValue};
use crate::state::{CampaignState, StateUpdate};
use crate::sync::StateSynchronizer;
use kiosk_ledger::{
    allocate, percent_funded, Allocation, Amount, BucketIndex, BucketProgress, CapacityLedger,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A donation as confirmed by the (simulated) payment terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub category_id: String,
    /// Amount paid; derived from `people` for per-person categories
    #[serde(default)]
    pub amount: Option<Amount>,
    /// Preferred buckets, bucketed categories only
    #[serde(default)]
    pub buckets: Vec<BucketIndex>,
    /// Head count, per-person categories only
    #[serde(default)]
    pub people: Option<u32>,
}

impl ContributionRequest {
    pub fn new(category_id: &str, amount: Amount) -> Self {
        Self {
            category_id: category_id.to_string(),
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn with_buckets(mut self, buckets: &[BucketIndex]) -> Self {
        self.buckets = buckets.to_vec();
        self
    }

    pub fn for_people(category_id: &str, people: u32) -> Self {
        Self {
            category_id: category_id.to_string(),
            people: Some(people),
            ..Self::default()
        }
    }
}

/// Progress of one single-target category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProgress {
    pub category_id: String,
    pub label: String,
    pub raised: Amount,
    pub target: Amount,
    pub percent_funded: u8,
}

/// Everything a progress display needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub buckets: BucketProgress,
    pub percent_funded: u8,
    pub targets: Vec<TargetProgress>,
}

impl ProgressSummary {
    pub fn of(state: &CampaignState) -> Self {
        let buckets = BucketProgress::of(&state.ledger.snapshot());
        let targets = state
            .categories
            .values()
            .filter(|c| c.kind == CategoryKind::Target)
            .map(|c| {
                let raised = state.raised(&c.id);
                let target = c.target.unwrap_or(0);
                TargetProgress {
                    category_id: c.id.clone(),
                    label: c.label.clone(),
                    raised,
                    target,
                    percent_funded: percent_funded(raised, target),
                }
            })
            .collect();
        Self {
            percent_funded: buckets.percent_funded(),
            buckets,
            targets,
        }
    }
}

/// Parse a typed amount such as `"25"` or `"£25"`. Zero, negatives,
/// fractions and anything non-numeric are rejected.
pub fn parse_amount(raw: &str) -> Result<Amount> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('£').unwrap_or(trimmed).trim();
    match digits.parse::<Amount>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(Error::InvalidInput(format!("not a positive amount: {:?}", raw))),
    }
}

/// One instance's point of sale.
#[derive(Debug, Clone)]
pub struct DonationDesk {
    sync: Arc<StateSynchronizer>,
    journal: Journal,
}

impl DonationDesk {
    pub fn new(sync: Arc<StateSynchronizer>) -> Self {
        let journal = Journal::new(Arc::clone(sync.store()));
        Self { sync, journal }
    }

    pub fn sync(&self) -> &Arc<StateSynchronizer> {
        &self.sync
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// How `amount` would be split right now. Nothing is changed.
    pub async fn preview(&self, amount: Amount, buckets: &[BucketIndex]) -> Result<Allocation> {
        let amount = positive(Some(amount))?;
        self.sync
            .read(|state| {
                check_buckets(buckets, state.ledger.len())?;
                Ok(allocate(amount, buckets, &state.ledger.snapshot())?)
            })
            .await
    }

    /// Record a completed payment.
    ///
    /// Validation happens before anything is touched. For bucketed
    /// categories the allocation is computed and applied under the state
    /// lock, so two contributions on this instance never read the same
    /// snapshot. Other instances offer no such guarantee.
    pub async fn contribute(&self, request: ContributionRequest) -> Result<ContributionRecord> {
        let journal = &self.journal;
        let (record, _) = self
            .sync
            .publish_with(|state| {
                let category = offered(state, &request.category_id)?;
                let (record, update) = match category.kind {
                    CategoryKind::Bucketed => bucketed(state, category, &request)?,
                    CategoryKind::Target => {
                        let amount = positive(request.amount)?;
                        let raised = state.raised(&category.id).saturating_add(amount);
                        let raised = category.target.map_or(raised, |t| raised.min(t));
                        let record = ContributionRecord::new(&category.id, &category.label, amount)
                            .with_meta("appeal_name", MetaValue::Text(category.label.clone()));
                        (record, StateUpdate::target_progress(&category.id, raised))
                    }
                    CategoryKind::PerPerson => {
                        let people = request
                            .people
                            .filter(|&p| p > 0)
                            .ok_or_else(|| Error::InvalidInput("people must be positive".into()))?;
                        let per_person = category.per_person.ok_or_else(|| {
                            Error::InvalidInput(format!("{} has no per person amount", category.id))
                        })?;
                        let amount = per_person
                            .checked_mul(Amount::from(people))
                            .ok_or_else(|| Error::InvalidInput("amount too large".into()))?;
                        let record = ContributionRecord::new(&category.id, &category.label, amount)
                            .with_meta("people", MetaValue::Number(u64::from(people)))
                            .with_meta("per_person", MetaValue::Number(per_person));
                        (record, StateUpdate::default())
                    }
                    CategoryKind::Preset => {
                        let amount = positive(request.amount)?;
                        let record = ContributionRecord::new(&category.id, &category.label, amount);
                        (record, StateUpdate::default())
                    }
                };
                journal.append(&record)?;
                Ok((record, update))
            })
            .await?;

        info!(
            "Contribution {} of {} to {}",
            record.id, record.amount, record.category_id
        );
        Ok(record)
    }

    /// Clear every record and zero all progress.
    pub async fn reset_all(&self) -> Result<usize> {
        let removed = self.journal.purge(None)?;
        self.sync
            .publish_with(|state| {
                let mut update = StateUpdate::bucket_progress(vec![0; state.ledger.len()]);
                for category in state.categories.values() {
                    if category.kind == CategoryKind::Target {
                        update.target_progress.insert(category.id.clone(), 0);
                    }
                }
                for id in state.target_progress.keys() {
                    update.target_progress.insert(id.clone(), 0);
                }
                Ok(((), update))
            })
            .await?;
        info!("Reset all contributions ({} records)", removed);
        Ok(removed)
    }

    /// Clear one category's records and the progress it feeds.
    pub async fn reset_category(&self, category_id: &str) -> Result<usize> {
        let category = self
            .sync
            .read(|state| state.category(category_id).cloned())
            .await
            .ok_or_else(|| Error::NotFound(format!("category {}", category_id)))?;

        let removed = self.journal.purge(Some(category_id))?;
        self.sync
            .publish_with(|state| {
                let update = match category.kind {
                    CategoryKind::Bucketed => {
                        StateUpdate::bucket_progress(vec![0; state.ledger.len()])
                    }
                    CategoryKind::Target => StateUpdate::target_progress(&category.id, 0),
                    _ => StateUpdate::default(),
                };
                Ok(((), update))
            })
            .await?;
        info!("Reset {} ({} records)", category_id, removed);
        Ok(removed)
    }

    /// Zero the bucket ledger. Records are kept.
    pub async fn reset_ledger(&self) -> Result<()> {
        self.sync
            .publish_with(|state| Ok(((), StateUpdate::bucket_progress(vec![0; state.ledger.len()]))))
            .await?;
        info!("Reset bucket ledger");
        Ok(())
    }

    /// Re-derive bucket totals from the journal and publish them.
    ///
    /// Repairs totals after concurrent writers overwrote each other's
    /// `bucket_progress`. Contributions that overshot a bucket stay
    /// overshot: the journal is the truth.
    pub async fn rebuild_ledger(&self) -> Result<BucketProgress> {
        let journal = &self.journal;
        let (progress, _) = self
            .sync
            .publish_with(|state| {
                let log = journal.load()?;
                let allocations = log.records().iter().filter_map(|r| r.allocation.as_ref());
                let ledger =
                    CapacityLedger::replay(state.ledger.len(), state.ledger.capacity(), allocations)?;
                let progress = BucketProgress::of(&ledger.snapshot());
                Ok((progress, StateUpdate::bucket_progress(ledger.totals().to_vec())))
            })
            .await?;
        info!(
            "Rebuilt bucket ledger: {} raised, {} buckets funded",
            progress.total_raised, progress.funded_buckets
        );
        Ok(progress)
    }

    /// Records matching `filter`, most recent first.
    pub fn report(&self, filter: ReportFilter) -> Result<Report> {
        self.journal.report(filter)
    }

    /// Current progress figures.
    pub async fn progress(&self) -> ProgressSummary {
        self.sync.read(ProgressSummary::of).await
    }
}

fn positive(amount: Option<Amount>) -> Result<Amount> {
    amount
        .filter(|&a| a > 0)
        .ok_or_else(|| Error::InvalidInput("amount must be positive".into()))
}

fn check_buckets(buckets: &[BucketIndex], len: usize) -> Result<()> {
    match buckets.iter().find(|&&b| b >= len) {
        Some(b) => Err(Error::InvalidInput(format!(
            "bucket {} outside campaign of {}",
            b, len
        ))),
        None => Ok(()),
    }
}

fn offered<'a>(state: &'a CampaignState, id: &str) -> Result<&'a Category> {
    let category = state
        .category(id)
        .ok_or_else(|| Error::NotFound(format!("category {}", id)))?;
    if !state.is_visible(id) {
        return Err(Error::InvalidInput(format!("{} is not currently offered", id)));
    }
    Ok(category)
}

fn bucketed(
    state: &CampaignState,
    category: &Category,
    request: &ContributionRequest,
) -> Result<(ContributionRecord, StateUpdate)> {
    let amount = positive(request.amount)?;
    check_buckets(&request.buckets, state.ledger.len())?;

    let allocation = allocate(amount, &request.buckets, &state.ledger.snapshot())?;
    let mut ledger = state.ledger.clone();
    ledger.apply(&allocation)?;

    let days = allocation
        .iter()
        .map(|share| format!("Day {} £{}", share.bucket + 1, share.amount))
        .collect();
    let record = ContributionRecord::new(&category.id, &category.label, amount)
        .with_meta("allocations", MetaValue::List(days))
        .with_allocation(allocation);
    Ok((record, StateUpdate::bucket_progress(ledger.totals().to_vec())))
}
