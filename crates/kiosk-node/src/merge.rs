//! How an incoming [`StateUpdate`] is folded into local state.

use crate::state::{CampaignState, FieldKey, StateUpdate};
use tracing::warn;

/// Folds updates into local state.
///
/// Implementations must be idempotent: merging the same update twice
/// leaves the state as after the first merge.
pub trait MergeStrategy: Send + Sync {
    /// Apply `update`, returning the fields whose value changed.
    fn merge(&self, state: &mut CampaignState, update: &StateUpdate) -> Vec<FieldKey>;
}

/// Per-field last-writer-wins: each field in the update replaces the
/// local value whole. Fields absent from the update are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeByField;

impl MergeStrategy for MergeByField {
    fn merge(&self, state: &mut CampaignState, update: &StateUpdate) -> Vec<FieldKey> {
        let mut changed = Vec::new();

        if let Some(ids) = &update.visible_categories {
            if &state.visible_categories != ids {
                state.visible_categories = ids.clone();
                changed.push(FieldKey::VisibleCategories);
            }
        }

        for (id, category) in &update.categories {
            if state.categories.get(id) != Some(category) {
                state.categories.insert(id.clone(), category.clone());
                changed.push(FieldKey::Category(id.clone()));
            }
        }

        if let Some(capacity) = update.bucket_capacity {
            if state.ledger.capacity() != capacity {
                match state.ledger.set_capacity(capacity) {
                    Ok(()) => changed.push(FieldKey::BucketCapacity),
                    Err(e) => warn!("Skipping bucket capacity {}: {}", capacity, e),
                }
            }
        }

        if let Some(totals) = &update.bucket_progress {
            if state.ledger.totals() != totals.as_slice() {
                match state.ledger.replace_totals(totals.clone()) {
                    Ok(()) => changed.push(FieldKey::BucketProgress),
                    Err(e) => warn!("Skipping bucket progress: {}", e),
                }
            }
        }

        if let Some(start) = update.campaign_start {
            if state.campaign_start != start {
                state.campaign_start = start;
                changed.push(FieldKey::CampaignStart);
            }
        }

        if let Some(people) = update.sponsor_people {
            if state.sponsor_people != people {
                state.sponsor_people = people;
                changed.push(FieldKey::SponsorPeople);
            }
        }

        if let Some(items) = &update.sponsor_items {
            if &state.sponsor_items != items {
                state.sponsor_items = items.clone();
                changed.push(FieldKey::SponsorItems);
            }
        }

        for (id, raised) in &update.target_progress {
            if state.target_progress.get(id) != Some(raised) {
                state.target_progress.insert(id.clone(), *raised);
                changed.push(FieldKey::TargetProgress(id.clone()));
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryKind, SPECIAL_APPEALS};
    use crate::state::DEFAULT_BUCKETS;

    fn state() -> CampaignState {
        CampaignState::new(DEFAULT_BUCKETS).unwrap()
    }

    #[test]
    fn merge_replaces_only_carried_fields() {
        let mut local = state();
        local.sponsor_people = Some(10);
        let update = StateUpdate::visible(vec!["zakat".into()]);

        let changed = MergeByField.merge(&mut local, &update);
        assert_eq!(changed, vec![FieldKey::VisibleCategories]);
        assert_eq!(local.visible_categories, vec!["zakat"]);
        assert_eq!(local.sponsor_people, Some(10));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut totals = vec![0; DEFAULT_BUCKETS];
        totals[0] = 300;
        let mut update = StateUpdate::bucket_progress(totals);
        update.bucket_capacity = Some(250);
        update.target_progress.insert(SPECIAL_APPEALS.into(), 900);
        update.categories.insert(
            "roof".into(),
            Category::new("roof", "Roof Fund", CategoryKind::Preset),
        );

        let mut once = state();
        let first = MergeByField.merge(&mut once, &update);
        assert_eq!(first.len(), 4);

        let mut twice = once.clone();
        let second = MergeByField.merge(&mut twice, &update);
        assert!(second.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn later_write_wins_per_field() {
        let mut local = state();
        MergeByField.merge(&mut local, &StateUpdate::target_progress(SPECIAL_APPEALS, 100));
        MergeByField.merge(&mut local, &StateUpdate::target_progress(SPECIAL_APPEALS, 40));
        assert_eq!(local.raised(SPECIAL_APPEALS), 40);
    }

    #[test]
    fn wrong_length_progress_is_skipped() {
        let mut local = state();
        let changed = MergeByField.merge(&mut local, &StateUpdate::bucket_progress(vec![1, 2]));
        assert!(changed.is_empty());
        assert_eq!(local.ledger.len(), DEFAULT_BUCKETS);
    }
}
