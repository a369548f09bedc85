//! Giving categories shown as kiosk tabs.

use kiosk_ledger::Amount;
use serde::{Deserialize, Serialize};

/// Well-known category ids.
pub const DAILY_SADAQAH: &str = "daily-sadaqah";
pub const ZAKAT: &str = "zakat";
pub const RAMADAN_IFTAAR: &str = "ramadan-iftaar";
pub const ZAKAT_FITR: &str = "zakat-fitr";
pub const SPECIAL_APPEALS: &str = "special-appeals";

/// How a category turns a tap into a contribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// Preset amount tiles or a custom amount
    Preset,
    /// Fixed amount per person, multiplied by a head count
    PerPerson,
    /// Spread across the campaign buckets by the allocator
    Bucketed,
    /// Counts toward a single fundraising target
    Target,
}

/// A quoted text shown alongside a category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arabic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Quote {
    /// A quote carrying only its source reference.
    pub fn reference(reference: &str) -> Self {
        Self {
            reference: Some(reference.to_string()),
            ..Self::default()
        }
    }
}

/// A giving category and its configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: String,

    /// Tab label
    pub label: String,

    /// One-line description
    #[serde(default)]
    pub subtitle: Option<String>,

    /// Contribution behaviour
    pub kind: CategoryKind,

    /// Preset amount tiles
    #[serde(default)]
    pub amounts: Vec<Amount>,

    /// Quoted text
    #[serde(default)]
    pub quote: Option<Quote>,

    /// Amount per person (PerPerson categories)
    #[serde(default)]
    pub per_person: Option<Amount>,

    /// Fundraising target (Target categories)
    #[serde(default)]
    pub target: Option<Amount>,
}

impl Category {
    /// Create a category with no presets.
    pub fn new(id: &str, label: &str, kind: CategoryKind) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            subtitle: None,
            kind,
            amounts: Vec::new(),
            quote: None,
            per_person: None,
            target: None,
        }
    }

    fn subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = Some(subtitle.to_string());
        self
    }

    fn amounts(mut self, amounts: &[Amount]) -> Self {
        self.amounts = amounts.to_vec();
        self
    }

    fn quote(mut self, quote: Quote) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Built-in catalog, in tab order.
    pub fn defaults() -> Vec<Self> {
        let mut fitr = Self::new(ZAKAT_FITR, "Zakat al-Fitr", CategoryKind::PerPerson)
            .subtitle("Per person guidance updated annually by the masjid.")
            .amounts(&[5, 10, 15, 20, 25, 30])
            .quote(Quote::reference("Sunan Abi Dawud"));
        fitr.per_person = Some(5);

        let mut appeal = Self::new(SPECIAL_APPEALS, "Special Appeal", CategoryKind::Target)
            .subtitle("Emergency and community appeals as needed.")
            .amounts(&[50, 100, 250]);
        appeal.target = Some(15_000);

        vec![
            Self::new(DAILY_SADAQAH, "Sadaqah Yaumiyyah", CategoryKind::Preset)
                .subtitle("Daily giving for the masjid and local needs.")
                .amounts(&[5, 10, 20, 30, 50, 100])
                .quote(Quote::reference("Quran 2:261")),
            Self::new(ZAKAT, "Zakat", CategoryKind::Preset)
                .subtitle("Obligatory charity distributed to eligible recipients.")
                .amounts(&[25, 50, 100, 200, 500, 1000])
                .quote(Quote::reference("Quran 9:103")),
            Self::new(RAMADAN_IFTAAR, "Ramadan Iftaar", CategoryKind::Bucketed)
                .subtitle("Whoever feeds a fasting person will have a reward like theirs.")
                .amounts(&[25, 50, 75, 100, 150, 200])
                .quote(Quote::reference("Tirmidhi")),
            fitr,
            appeal,
        ]
    }

    /// Check the configuration is usable. Returns the reason when it isn't.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("category id is empty".into());
        }
        if self.amounts.is_empty() {
            return Err(format!("{}: preset amounts missing", self.id));
        }
        if self.amounts.iter().any(|&a| a == 0) {
            return Err(format!("{}: preset amounts must be positive", self.id));
        }
        if self.per_person == Some(0) {
            return Err(format!("{}: per person amount must be positive", self.id));
        }
        if self.target == Some(0) {
            return Err(format!("{}: target must be positive", self.id));
        }
        match self.kind {
            CategoryKind::PerPerson if self.per_person.is_none() => {
                Err(format!("{}: per person amount missing", self.id))
            }
            CategoryKind::Target if self.target.is_none() => {
                Err(format!("{}: target missing", self.id))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let defaults = Category::defaults();
        assert_eq!(defaults.len(), 5);
        assert!(defaults.iter().all(|c| c.validate().is_ok()));
        assert!(defaults.iter().any(|c| c.kind == CategoryKind::Bucketed));
    }

    #[test]
    fn zero_presets_are_rejected() {
        let mut zakat = Category::new(ZAKAT, "Zakat", CategoryKind::Preset);
        zakat.amounts = vec![25, 0];
        assert!(zakat.validate().is_err());
    }

    #[test]
    fn target_category_needs_target() {
        let appeal = Category::new("roof", "Roof Fund", CategoryKind::Target);
        assert!(appeal.validate().is_err());
    }

    #[test]
    fn deserializes_with_missing_optionals() {
        let json = r#"{"id":"zakat","label":"Zakat","kind":"preset"}"#;
        let cat: Category = serde_json::from_str(json).unwrap();
        assert!(cat.amounts.is_empty());
        assert_eq!(cat.kind, CategoryKind::Preset);
        assert!(cat.validate().is_err());
    }

    #[test]
    fn empty_presets_are_rejected() {
        let mut zakat = Category::defaults().remove(1);
        assert!(zakat.validate().is_ok());
        zakat.amounts.clear();
        assert_eq!(zakat.validate().unwrap_err(), "zakat: preset amounts missing");
    }
}
