//! Per-installation defaults from an external configuration feed.
//!
//! The feed is read once at startup. Its values only fill fields that have
//! nothing persisted; local state always wins.

use crate::error::Result;
use crate::models::Quote;
use crate::state::{CampaignState, StateUpdate};
use chrono::NaiveDate;
use kiosk_ledger::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// The whole feed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFeed {
    #[serde(default)]
    pub installations: Vec<InstallationDefaults>,
}

/// Defaults for one installation (one masjid).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallationDefaults {
    pub slug: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visible_categories: Option<Vec<String>>,
    #[serde(default)]
    pub bucket_capacity: Option<Amount>,
    #[serde(default)]
    pub campaign_start: Option<NaiveDate>,
    #[serde(default)]
    pub sponsor_people: Option<u32>,
    #[serde(default)]
    pub sponsor_items: Option<Vec<String>>,
    /// Overrides keyed by category id
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryDefaults>,
}

/// Overrides for one category. Absent fields keep the built-in value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDefaults {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub amounts: Option<Vec<Amount>>,
    #[serde(default)]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub per_person: Option<Amount>,
    #[serde(default)]
    pub target: Option<Amount>,
}

impl ConfigFeed {
    /// Read a feed document from disk.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let feed: Self = serde_json::from_slice(&bytes)?;
        info!(
            "Loaded config feed {} ({} installations)",
            path.as_ref().display(),
            feed.installations.len()
        );
        Ok(feed)
    }

    /// Find an installation by slug, then by alias. Case-insensitive.
    pub fn find(&self, slug: &str) -> Option<&InstallationDefaults> {
        let wanted = slug.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.installations
            .iter()
            .find(|i| i.slug.to_lowercase() == wanted)
            .or_else(|| {
                self.installations
                    .iter()
                    .find(|i| i.aliases.iter().any(|a| a.to_lowercase() == wanted))
            })
    }
}

impl InstallationDefaults {
    /// The defaults as an update against `state`. Category overrides are
    /// applied on top of the current category so the update carries whole
    /// values; overrides for unknown categories are skipped.
    pub fn to_update(&self, state: &CampaignState) -> StateUpdate {
        let mut update = StateUpdate {
            visible_categories: self.visible_categories.clone().filter(|ids| !ids.is_empty()),
            bucket_capacity: self.bucket_capacity,
            campaign_start: self.campaign_start.map(Some),
            sponsor_people: self.sponsor_people.map(Some),
            sponsor_items: self.sponsor_items.clone(),
            ..StateUpdate::default()
        };

        for (id, overrides) in &self.categories {
            let Some(current) = state.category(id) else {
                debug!("Feed names unknown category {}", id);
                continue;
            };
            let mut category = current.clone();
            if let Some(label) = &overrides.label {
                category.label = label.clone();
            }
            if let Some(subtitle) = &overrides.subtitle {
                category.subtitle = Some(subtitle.clone());
            }
            if let Some(amounts) = &overrides.amounts {
                category.amounts = amounts.clone();
            }
            if let Some(quote) = &overrides.quote {
                category.quote = Some(quote.clone());
            }
            if overrides.per_person.is_some() {
                category.per_person = overrides.per_person;
            }
            if overrides.target.is_some() {
                category.target = overrides.target;
            }
            if &category != current {
                update.categories.insert(id.clone(), category);
            }
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SPECIAL_APPEALS, ZAKAT_FITR};
    use crate::state::DEFAULT_BUCKETS;

    const FEED: &str = r#"{
        "installations": [
            {
                "slug": "east-london",
                "aliases": ["ELM", "whitechapel"],
                "name": "East London Masjid",
                "bucket_capacity": 450,
                "campaign_start": "2026-02-18",
                "categories": {
                    "zakat-fitr": { "per_person": 7 },
                    "special-appeals": { "label": "Roof Appeal", "target": 50000 },
                    "bake-sale": { "label": "Cakes" }
                }
            },
            { "slug": "leeds" }
        ]
    }"#;

    fn feed() -> ConfigFeed {
        serde_json::from_str(FEED).unwrap()
    }

    #[test]
    fn find_by_slug_then_alias() {
        let feed = feed();
        assert_eq!(feed.find("LEEDS").unwrap().slug, "leeds");
        assert_eq!(feed.find("elm").unwrap().slug, "east-london");
        assert!(feed.find("glasgow").is_none());
        assert!(feed.find("  ").is_none());
    }

    #[test]
    fn overrides_patch_whole_categories() {
        let state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        let update = feed().find("east-london").unwrap().to_update(&state);

        assert_eq!(update.bucket_capacity, Some(450));
        assert_eq!(update.campaign_start, Some(NaiveDate::from_ymd_opt(2026, 2, 18)));
        let appeal = &update.categories[SPECIAL_APPEALS];
        assert_eq!(appeal.label, "Roof Appeal");
        assert_eq!(appeal.target, Some(50_000));
        assert_eq!(appeal.amounts, vec![50, 100, 250]);
        assert_eq!(update.categories[ZAKAT_FITR].per_person, Some(7));
        assert!(!update.categories.contains_key("bake-sale"));
    }

    #[test]
    fn empty_installation_changes_nothing() {
        let state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        assert!(feed().find("leeds").unwrap().to_update(&state).is_empty());
    }

    #[tokio::test]
    async fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installations.json");
        std::fs::write(&path, FEED).unwrap();

        let feed = ConfigFeed::load(&path).await.unwrap();
        assert_eq!(feed.installations.len(), 2);
        assert!(ConfigFeed::load(dir.path().join("missing.json")).await.is_err());
    }
}
