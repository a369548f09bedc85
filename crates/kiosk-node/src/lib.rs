//! Kiosk Node - donation kiosk contribution engine
//!
//! Runs the kiosk display and admin console as independent instances over
//! one shared store, and keeps their campaign state consistent without a
//! central authority.
//!
//! # Architecture
//!
//! - **Models**: Giving categories and contribution records
//! - **Store**: Keyed JSON storage plus broadcast topics (RocksDB or memory)
//! - **State / Merge / Sync**: Replicated campaign state, per-field
//!   last-writer-wins merging, and the synchronizer that persists, notifies
//!   and reconciles
//! - **Journal**: Persisted transaction log and reports
//! - **Desk**: Allocation, contributions, resets, progress
//! - **API / WS**: HTTP endpoints and a live state stream
//! - **Admin Socket**: Unix socket for local admin commands (kiosk-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use kiosk_node::{KioskNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = KioskNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod desk;
pub mod error;
pub mod feed;
pub mod journal;
pub mod merge;
pub mod models;
pub mod node;
pub mod parse;
pub mod state;
pub mod storage;
pub mod store;
pub mod sync;
pub mod ws;

pub use desk::{ContributionRequest, DonationDesk, ProgressSummary};
pub use error::{Error, Result};
pub use journal::{Journal, Report, ReportFilter, TransactionLog};
pub use kiosk_ledger::{Allocation, Amount, BucketIndex, BucketProgress, CapacityLedger};
pub use merge::{MergeByField, MergeStrategy};
pub use models::{Category, CategoryKind, ContributionRecord, MetaValue};
pub use node::{KioskNode, NodeConfig};
pub use state::{CampaignState, FieldKey, StateUpdate};
pub use storage::RocksStore;
pub use store::{MemoryStore, Notification, StateStore};
pub use sync::{StateChange, StateSynchronizer};
