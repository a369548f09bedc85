//! Replicated campaign state.
//!
//! [`CampaignState`] is what every instance keeps a local copy of. It is
//! split into logical fields ([`FieldKey`]), each persisted under its own
//! store key and replaced as a whole. A [`StateUpdate`] carries new values
//! for some subset of those fields and is also the JSON shape of a
//! broadcast notification.

use crate::models::Category;
use crate::parse::{parse_or_default, Parsed};
use crate::store::StateStore;
use chrono::NaiveDate;
use kiosk_ledger::{Amount, CapacityLedger, LedgerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Default number of campaign buckets (days of Ramadan).
pub const DEFAULT_BUCKETS: usize = 30;

/// Default per-bucket capacity (daily target).
pub const DEFAULT_BUCKET_CAPACITY: Amount = 300;

/// One independently replicated piece of [`CampaignState`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "field", content = "id", rename_all = "snake_case")]
pub enum FieldKey {
    VisibleCategories,
    Category(String),
    BucketCapacity,
    BucketProgress,
    CampaignStart,
    SponsorPeople,
    SponsorItems,
    TargetProgress(String),
}

impl FieldKey {
    /// Store key holding this field's value.
    pub fn store_key(&self) -> String {
        match self {
            FieldKey::VisibleCategories => "visible_categories".into(),
            FieldKey::Category(id) => format!("{}{}", CATEGORY_PREFIX, id),
            FieldKey::BucketCapacity => "bucket_capacity".into(),
            FieldKey::BucketProgress => "bucket_progress".into(),
            FieldKey::CampaignStart => "campaign_start".into(),
            FieldKey::SponsorPeople => "sponsor_people".into(),
            FieldKey::SponsorItems => "sponsor_items".into(),
            FieldKey::TargetProgress(id) => format!("{}{}", PROGRESS_PREFIX, id),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store_key())
    }
}

/// Key prefix for per-category configuration.
pub const CATEGORY_PREFIX: &str = "category:";

/// Key prefix for single-target progress counters.
pub const PROGRESS_PREFIX: &str = "progress:";

/// The full state an instance displays and edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignState {
    /// Category ids shown as tabs, in order
    pub visible_categories: Vec<String>,
    /// Configuration per category id
    pub categories: BTreeMap<String, Category>,
    /// Bucket totals and the shared daily target
    pub ledger: CapacityLedger,
    /// Date of bucket 0
    pub campaign_start: Option<NaiveDate>,
    /// People fed by one fully funded bucket
    pub sponsor_people: Option<u32>,
    /// What one fully funded bucket provides
    pub sponsor_items: Vec<String>,
    /// Raised so far per Target category
    pub target_progress: BTreeMap<String, Amount>,
}

impl CampaignState {
    /// Built-in defaults for a campaign of `buckets` buckets.
    pub fn new(buckets: usize) -> Result<Self, LedgerError> {
        let categories: BTreeMap<_, _> = Category::defaults()
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Ok(Self {
            visible_categories: Category::defaults().into_iter().map(|c| c.id).collect(),
            categories,
            ledger: CapacityLedger::new(buckets, DEFAULT_BUCKET_CAPACITY)?,
            campaign_start: None,
            sponsor_people: None,
            sponsor_items: Vec::new(),
            target_progress: BTreeMap::new(),
        })
    }

    /// Rebuild state from every persisted field.
    ///
    /// Missing or unusable values fall back to defaults and are logged;
    /// only a broken store (read error) or a zero bucket count fails.
    pub fn hydrate(store: &dyn StateStore, buckets: usize) -> crate::Result<Self> {
        let mut state = Self::new(buckets)?;

        state.visible_categories = load_field(
            store,
            &FieldKey::VisibleCategories,
            state.visible_categories,
            |ids: &Vec<String>| valid_visible(ids),
        )?;

        let capacity = load_field(
            store,
            &FieldKey::BucketCapacity,
            DEFAULT_BUCKET_CAPACITY,
            |c| valid_capacity(*c),
        )?;
        state.ledger.set_capacity(capacity)?;

        let totals = load_field(store, &FieldKey::BucketProgress, vec![0; buckets], |t| {
            valid_progress(t, buckets)
        })?;
        state.ledger.replace_totals(totals)?;

        state.campaign_start = load_field(store, &FieldKey::CampaignStart, None, |_| true)?;
        state.sponsor_people = load_field(store, &FieldKey::SponsorPeople, None, |p| {
            p.map_or(true, valid_people)
        })?;
        state.sponsor_items = load_field(store, &FieldKey::SponsorItems, Vec::new(), |_| true)?;

        for (key, raw) in store.scan_prefix(CATEGORY_PREFIX)? {
            let id = &key[CATEGORY_PREFIX.len()..];
            let parsed = parse_or_default(Some(&raw), None, |c: &Option<Category>| {
                c.as_ref().is_some_and(|c| c.id == id && c.validate().is_ok())
            });
            report_default(&key, &parsed);
            if let Some(category) = parsed.into_inner() {
                state.categories.insert(id.to_string(), category);
            }
        }

        for (key, raw) in store.scan_prefix(PROGRESS_PREFIX)? {
            let id = &key[PROGRESS_PREFIX.len()..];
            let parsed = parse_or_default(Some(&raw), None, |p: &Option<Amount>| p.is_some());
            report_default(&key, &parsed);
            if let Some(raised) = parsed.into_inner() {
                state.target_progress.insert(id.to_string(), raised);
            }
        }

        Ok(state)
    }

    /// Look up a category.
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Categories to show, in order. Never empty while any category exists:
    /// an unusable visibility list falls back to the first category.
    pub fn visible(&self) -> Vec<&Category> {
        let shown: Vec<_> = self
            .visible_categories
            .iter()
            .filter_map(|id| self.categories.get(id))
            .collect();
        if shown.is_empty() {
            return Category::defaults()
                .first()
                .and_then(|first| self.categories.get(&first.id))
                .or_else(|| self.categories.values().next())
                .into_iter()
                .collect();
        }
        shown
    }

    /// True if the category is currently offered.
    pub fn is_visible(&self, id: &str) -> bool {
        self.visible().iter().any(|c| c.id == id)
    }

    /// Raised so far for a Target category.
    pub fn raised(&self, id: &str) -> Amount {
        self.target_progress.get(id).copied().unwrap_or(0)
    }

    /// Every field of this state as one update.
    pub fn to_update(&self) -> StateUpdate {
        StateUpdate {
            visible_categories: Some(self.visible_categories.clone()),
            categories: self.categories.clone(),
            bucket_capacity: Some(self.ledger.capacity()),
            bucket_progress: Some(self.ledger.totals().to_vec()),
            campaign_start: Some(self.campaign_start),
            sponsor_people: Some(self.sponsor_people),
            sponsor_items: Some(self.sponsor_items.clone()),
            target_progress: self.target_progress.clone(),
        }
    }

    /// Current value of one field as JSON, for persisting.
    ///
    /// `None` for map entries that do not exist.
    pub fn field_value(&self, field: &FieldKey) -> Option<serde_json::Value> {
        let value = match field {
            FieldKey::VisibleCategories => serde_json::to_value(&self.visible_categories),
            FieldKey::Category(id) => serde_json::to_value(self.categories.get(id)?),
            FieldKey::BucketCapacity => serde_json::to_value(self.ledger.capacity()),
            FieldKey::BucketProgress => serde_json::to_value(self.ledger.totals()),
            FieldKey::CampaignStart => serde_json::to_value(self.campaign_start),
            FieldKey::SponsorPeople => serde_json::to_value(self.sponsor_people),
            FieldKey::SponsorItems => serde_json::to_value(&self.sponsor_items),
            FieldKey::TargetProgress(id) => serde_json::to_value(self.target_progress.get(id)?),
        };
        value.ok()
    }
}

/// Read one field, logging when the default had to be used.
fn load_field<T, F>(store: &dyn StateStore, field: &FieldKey, default: T, validate: F) -> crate::Result<T>
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> bool,
{
    let key = field.store_key();
    let raw = store.get(&key)?;
    let parsed = parse_or_default(raw.as_deref(), default, validate);
    report_default(&key, &parsed);
    Ok(parsed.into_inner())
}

fn report_default<T>(key: &str, parsed: &Parsed<T>) {
    use crate::parse::DefaultReason;
    match parsed.reason() {
        Some(DefaultReason::Corrupt(e)) => warn!("Ignoring corrupt value for {}: {}", key, e),
        Some(DefaultReason::Rejected) => warn!("Ignoring invalid value for {}", key),
        _ => {}
    }
}

fn valid_visible(ids: &[String]) -> bool {
    !ids.is_empty() && ids.iter().all(|id| !id.trim().is_empty())
}

fn valid_capacity(capacity: Amount) -> bool {
    capacity > 0
}

fn valid_progress(totals: &[Amount], buckets: usize) -> bool {
    totals.len() == buckets
}

fn valid_people(people: u32) -> bool {
    people > 0
}

/// Maps a key that is present, `null` included, to `Some`. Combined with
/// `#[serde(default)]` a missing key stays `None`.
pub(crate) fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// New values for a subset of [`CampaignState`] fields.
///
/// Serialized, this is the notification payload: a JSON object whose keys
/// are the updated field names. Unknown keys are ignored on receipt.
/// `campaign_start` and `sponsor_people` can be cleared: `Some(None)`,
/// `null` on the wire, unsets them while a missing key leaves them alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_capacity: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_progress: Option<Vec<Amount>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub campaign_start: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub sponsor_people: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_progress: BTreeMap<String, Amount>,
}

impl StateUpdate {
    /// Update the visible category list.
    pub fn visible(ids: Vec<String>) -> Self {
        Self {
            visible_categories: Some(ids),
            ..Self::default()
        }
    }

    /// Update the bucket totals.
    pub fn bucket_progress(totals: Vec<Amount>) -> Self {
        Self {
            bucket_progress: Some(totals),
            ..Self::default()
        }
    }

    /// Update one category's configuration.
    pub fn category(category: Category) -> Self {
        let mut update = Self::default();
        update.categories.insert(category.id.clone(), category);
        update
    }

    /// Update one Target category's progress.
    pub fn target_progress(id: &str, raised: Amount) -> Self {
        let mut update = Self::default();
        update.target_progress.insert(id.to_string(), raised);
        update
    }

    /// Fields this update carries.
    pub fn fields(&self) -> Vec<FieldKey> {
        let mut fields = Vec::new();
        if self.visible_categories.is_some() {
            fields.push(FieldKey::VisibleCategories);
        }
        fields.extend(self.categories.keys().cloned().map(FieldKey::Category));
        if self.bucket_capacity.is_some() {
            fields.push(FieldKey::BucketCapacity);
        }
        if self.bucket_progress.is_some() {
            fields.push(FieldKey::BucketProgress);
        }
        if self.campaign_start.is_some() {
            fields.push(FieldKey::CampaignStart);
        }
        if self.sponsor_people.is_some() {
            fields.push(FieldKey::SponsorPeople);
        }
        if self.sponsor_items.is_some() {
            fields.push(FieldKey::SponsorItems);
        }
        fields.extend(self.target_progress.keys().cloned().map(FieldKey::TargetProgress));
        fields
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain<F: FnMut(&FieldKey) -> bool>(mut self, mut keep: F) -> Self {
        if self.visible_categories.is_some() && !keep(&FieldKey::VisibleCategories) {
            self.visible_categories = None;
        }
        self.categories
            .retain(|id, _| keep(&FieldKey::Category(id.clone())));
        if self.bucket_capacity.is_some() && !keep(&FieldKey::BucketCapacity) {
            self.bucket_capacity = None;
        }
        if self.bucket_progress.is_some() && !keep(&FieldKey::BucketProgress) {
            self.bucket_progress = None;
        }
        if self.campaign_start.is_some() && !keep(&FieldKey::CampaignStart) {
            self.campaign_start = None;
        }
        if self.sponsor_people.is_some() && !keep(&FieldKey::SponsorPeople) {
            self.sponsor_people = None;
        }
        if self.sponsor_items.is_some() && !keep(&FieldKey::SponsorItems) {
            self.sponsor_items = None;
        }
        self.target_progress
            .retain(|id, _| keep(&FieldKey::TargetProgress(id.clone())));
        self
    }

    /// Drop fields whose values are unusable, returning what was dropped
    /// and why. Fields are judged independently.
    pub fn sanitize(self, buckets: usize) -> (Self, Vec<(FieldKey, String)>) {
        let mut rejected = Vec::new();
        let update = self.clone().retain(|field| {
            let problem = match field {
                FieldKey::VisibleCategories => self
                    .visible_categories
                    .as_ref()
                    .filter(|ids| !valid_visible(ids))
                    .map(|_| "empty category list".to_string()),
                FieldKey::Category(id) => self.categories.get(id).and_then(|c| {
                    if &c.id != id {
                        Some(format!("keyed as {} but id is {}", id, c.id))
                    } else {
                        c.validate().err()
                    }
                }),
                FieldKey::BucketCapacity => self
                    .bucket_capacity
                    .filter(|c| !valid_capacity(*c))
                    .map(|_| "capacity must be positive".to_string()),
                FieldKey::BucketProgress => self
                    .bucket_progress
                    .as_ref()
                    .filter(|t| !valid_progress(t, buckets))
                    .map(|t| format!("expected {} buckets, got {}", buckets, t.len())),
                FieldKey::SponsorPeople => self
                    .sponsor_people
                    .flatten()
                    .filter(|p| !valid_people(*p))
                    .map(|_| "people count must be positive".to_string()),
                FieldKey::CampaignStart | FieldKey::SponsorItems | FieldKey::TargetProgress(_) => {
                    None
                }
            };
            match problem {
                Some(reason) => {
                    rejected.push((field.clone(), reason));
                    false
                }
                None => true,
            }
        });
        (update, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryKind, SPECIAL_APPEALS, ZAKAT};
    use crate::store::MemoryStore;

    #[test]
    fn defaults_show_every_category() {
        let state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        assert_eq!(state.visible().len(), 5);
        assert_eq!(state.ledger.len(), 30);
        assert_eq!(state.ledger.capacity(), 300);
    }

    #[test]
    fn unknown_visible_ids_fall_back_to_first_category() {
        let mut state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        state.visible_categories = vec!["nope".into()];
        let shown: Vec<_> = state.visible().iter().map(|c| c.id.clone()).collect();
        assert_eq!(shown, vec!["daily-sadaqah".to_string()]);
    }

    #[test]
    fn hydrate_empty_store_gives_defaults() {
        let store = MemoryStore::new();
        let state = CampaignState::hydrate(&store, DEFAULT_BUCKETS).unwrap();
        assert_eq!(state, CampaignState::new(DEFAULT_BUCKETS).unwrap());
    }

    #[test]
    fn hydrate_reads_every_field() {
        let store = MemoryStore::new();
        store.put("visible_categories", br#"["zakat","special-appeals"]"#).unwrap();
        store.put("bucket_capacity", b"250").unwrap();
        store.put("bucket_progress", br#"[250, 10, 0]"#).unwrap();
        store.put("campaign_start", br#""2026-02-18""#).unwrap();
        store.put("sponsor_people", b"40").unwrap();
        store.put("sponsor_items", br#"["dates","rice"]"#).unwrap();
        store.put("progress:special-appeals", b"7500").unwrap();
        let mut zakat = Category::new(ZAKAT, "Zakat", CategoryKind::Preset);
        zakat.amounts = vec![10, 20];
        store.put("category:zakat", &serde_json::to_vec(&zakat).unwrap()).unwrap();

        let state = CampaignState::hydrate(&store, 3).unwrap();
        assert_eq!(state.visible_categories, vec!["zakat", "special-appeals"]);
        assert_eq!(state.ledger.capacity(), 250);
        assert_eq!(state.ledger.totals(), &[250, 10, 0]);
        assert_eq!(state.campaign_start, NaiveDate::from_ymd_opt(2026, 2, 18));
        assert_eq!(state.sponsor_people, Some(40));
        assert_eq!(state.sponsor_items, vec!["dates", "rice"]);
        assert_eq!(state.raised(SPECIAL_APPEALS), 7500);
        assert_eq!(state.category(ZAKAT).unwrap().amounts, vec![10, 20]);
    }

    #[test]
    fn corrupt_fields_fall_back_independently() {
        let store = MemoryStore::new();
        store.put("bucket_capacity", b"-4").unwrap();
        store.put("bucket_progress", b"[1,2").unwrap();
        store.put("visible_categories", b"[]").unwrap();
        store.put("sponsor_people", b"12").unwrap();
        store.put("category:zakat", br#"{"id":"other","label":"x","kind":"preset"}"#).unwrap();

        let state = CampaignState::hydrate(&store, DEFAULT_BUCKETS).unwrap();
        assert_eq!(state.ledger.capacity(), DEFAULT_BUCKET_CAPACITY);
        assert!(state.ledger.totals().iter().all(|&t| t == 0));
        assert_eq!(state.visible().len(), 5);
        assert_eq!(state.sponsor_people, Some(12));
        assert_eq!(state.category(ZAKAT).unwrap().label, "Zakat");
    }

    #[test]
    fn update_json_uses_field_names() {
        let update = StateUpdate::visible(vec!["zakat".into()]);
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"visible_categories":["zakat"]}"#
        );
        let parsed: StateUpdate =
            serde_json::from_str(r#"{"visible_categories":["zakat"],"shiny":true}"#).unwrap();
        assert_eq!(parsed, update);
    }

    #[test]
    fn sanitize_drops_only_bad_fields() {
        let update = StateUpdate {
            visible_categories: Some(vec![]),
            bucket_capacity: Some(0),
            bucket_progress: Some(vec![1, 2, 3]),
            sponsor_items: Some(vec!["soup".into()]),
            ..StateUpdate::default()
        };
        let (clean, rejected) = update.sanitize(3);
        assert_eq!(clean.fields(), vec![FieldKey::BucketProgress, FieldKey::SponsorItems]);
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn sanitize_rejects_mismatched_category_key() {
        let mut update = StateUpdate::default();
        update.categories.insert(
            "zakat".into(),
            Category::new("sadaqah", "Sadaqah", CategoryKind::Preset),
        );
        let (clean, rejected) = update.sanitize(DEFAULT_BUCKETS);
        assert!(clean.is_empty());
        assert_eq!(rejected[0].0, FieldKey::Category("zakat".into()));
    }

    #[test]
    fn sanitize_rejects_empty_presets() {
        let state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        let mut zakat = state.category(ZAKAT).cloned().unwrap();
        zakat.amounts.clear();
        let mut update = StateUpdate::category(zakat);
        update.sponsor_people = Some(Some(12));

        let (clean, rejected) = update.sanitize(DEFAULT_BUCKETS);
        assert_eq!(clean.fields(), vec![FieldKey::SponsorPeople]);
        assert_eq!(rejected[0].0, FieldKey::Category(ZAKAT.into()));
    }

    #[test]
    fn null_clears_and_missing_keeps() {
        let update: StateUpdate =
            serde_json::from_str(r#"{"campaign_start":null,"sponsor_items":[]}"#).unwrap();
        assert_eq!(update.campaign_start, Some(None));
        assert_eq!(update.sponsor_people, None);
        assert_eq!(update.fields(), vec![FieldKey::CampaignStart, FieldKey::SponsorItems]);

        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"campaign_start":null,"sponsor_items":[]}"#);
    }

    #[test]
    fn field_values_match_store_layout() {
        let state = CampaignState::new(2).unwrap();
        assert_eq!(
            state.field_value(&FieldKey::BucketProgress),
            Some(serde_json::json!([0, 0]))
        );
        assert_eq!(state.field_value(&FieldKey::TargetProgress("x".into())), None);
        assert_eq!(FieldKey::Category("zakat".into()).store_key(), "category:zakat");
    }
}
