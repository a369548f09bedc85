//! Kiosk data models.
//!
//! - [`Category`] - a giving category and its replicated configuration
//! - [`ContributionRecord`] - one completed contribution

mod category;
mod record;

pub use category::{
    Category, CategoryKind, Quote, DAILY_SADAQAH, RAMADAN_IFTAAR, SPECIAL_APPEALS, ZAKAT,
    ZAKAT_FITR,
};
pub use record::{ContributionRecord, MetaValue};
