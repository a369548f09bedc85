//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for configuring the campaign and running
//! resets and reports. Commands run on the admin instance, so every change
//! reaches the kiosk the same way any other instance's would: through the
//! store and the shared topic.

use crate::desk::{DonationDesk, ProgressSummary};
use crate::error::{Error, Result};
use crate::journal::{Report, ReportFilter};
use crate::models::Quote;
use crate::state::StateUpdate;
use chrono::NaiveDate;
use kiosk_ledger::{Amount, BucketProgress};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Choose which categories the kiosk offers
    SetVisibility { categories: Vec<String> },
    /// Change parts of one category
    UpdateCategory {
        id: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        subtitle: Option<String>,
        #[serde(default)]
        amounts: Option<Vec<Amount>>,
        #[serde(default)]
        quote: Option<Quote>,
        #[serde(default)]
        per_person: Option<Amount>,
        #[serde(default)]
        target: Option<Amount>,
    },
    /// Change the bucketed campaign settings
    SetSchedule {
        #[serde(default)]
        bucket_capacity: Option<Amount>,
        /// `null` clears the start date
        #[serde(
            default,
            deserialize_with = "crate::state::present",
            skip_serializing_if = "Option::is_none"
        )]
        campaign_start: Option<Option<NaiveDate>>,
        /// `null` clears the sponsor count
        #[serde(
            default,
            deserialize_with = "crate::state::present",
            skip_serializing_if = "Option::is_none"
        )]
        sponsor_people: Option<Option<u32>>,
        #[serde(default)]
        sponsor_items: Option<Vec<String>>,
    },
    /// Clear every record and all progress
    ResetAll,
    /// Clear one category's records and progress
    ResetCategory { id: String },
    /// Zero the bucket ledger
    ResetLedger,
    /// Re-derive bucket totals from the journal
    RebuildLedger,
    /// Query the journal
    Report {
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        from: Option<NaiveDate>,
        #[serde(default)]
        to: Option<NaiveDate>,
    },
    /// Current progress
    Progress,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Report { report: Report },
    Progress { progress: ProgressSummary },
    Ledger { progress: BucketProgress },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    desk: DonationDesk,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(desk: DonationDesk, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            desk,
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket, replacing a stale socket file.
    pub fn bind(&self) -> Result<UnixListener> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);
        Ok(listener)
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let desk = self.desk.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, desk).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, desk: DonationDesk) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &desk).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

/// Run one command against the admin instance.
pub async fn execute_command(cmd: AdminCommand, desk: &DonationDesk) -> AdminResponse {
    match run_command(cmd, desk).await {
        Ok(response) => response,
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

async fn run_command(cmd: AdminCommand, desk: &DonationDesk) -> Result<AdminResponse> {
    let response = match cmd {
        AdminCommand::SetVisibility { categories } => {
            let count = categories.len();
            desk.sync().publish(StateUpdate::visible(categories)).await?;
            tracing::info!("Visible categories set ({})", count);
            ok(format!("{} categories visible", count))
        }

        AdminCommand::UpdateCategory {
            id,
            label,
            subtitle,
            amounts,
            quote,
            per_person,
            target,
        } => {
            desk.sync()
                .publish_with(|state| {
                    let mut category = state
                        .category(&id)
                        .cloned()
                        .ok_or_else(|| Error::NotFound(format!("category {}", id)))?;
                    if let Some(label) = label {
                        category.label = label;
                    }
                    if subtitle.is_some() {
                        category.subtitle = subtitle;
                    }
                    if let Some(amounts) = amounts {
                        category.amounts = amounts;
                    }
                    if quote.is_some() {
                        category.quote = quote;
                    }
                    if per_person.is_some() {
                        category.per_person = per_person;
                    }
                    if target.is_some() {
                        category.target = target;
                    }
                    Ok(((), StateUpdate::category(category)))
                })
                .await?;
            tracing::info!("Updated category {}", id);
            ok(format!("Updated {}", id))
        }

        AdminCommand::SetSchedule {
            bucket_capacity,
            campaign_start,
            sponsor_people,
            sponsor_items,
        } => {
            let update = StateUpdate {
                bucket_capacity,
                campaign_start,
                sponsor_people,
                sponsor_items,
                ..StateUpdate::default()
            };
            if update.is_empty() {
                return Err(Error::InvalidInput("nothing to change".into()));
            }
            let changed = desk.sync().publish(update).await?;
            ok(format!("{} schedule fields changed", changed.len()))
        }

        AdminCommand::ResetAll => {
            let removed = desk.reset_all().await?;
            ok(format!("Reset everything ({} records removed)", removed))
        }

        AdminCommand::ResetCategory { id } => {
            let removed = desk.reset_category(&id).await?;
            ok(format!("Reset {} ({} records removed)", id, removed))
        }

        AdminCommand::ResetLedger => {
            desk.reset_ledger().await?;
            ok("Bucket ledger reset".to_string())
        }

        AdminCommand::RebuildLedger => AdminResponse::Ledger {
            progress: desk.rebuild_ledger().await?,
        },

        AdminCommand::Report { category, from, to } => {
            let filter = ReportFilter { category, from, to };
            AdminResponse::Report {
                report: desk.report(filter)?,
            }
        }

        AdminCommand::Progress => AdminResponse::Progress {
            progress: desk.progress().await,
        },

        AdminCommand::Ping => AdminResponse::Pong,
    };
    Ok(response)
}

fn ok(message: String) -> AdminResponse {
    AdminResponse::Ok { message }
}

/// Socket file name inside the node's data directory.
pub const SOCKET_FILE: &str = "admin.sock";

/// Where the daemon listens unless told otherwise.
pub fn default_socket_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SOCKET_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::ContributionRequest;
    use crate::models::{RAMADAN_IFTAAR, SPECIAL_APPEALS, ZAKAT};
    use crate::state::DEFAULT_BUCKETS;
    use crate::store::{MemoryStore, StateStore};
    use crate::sync::StateSynchronizer;
    use std::sync::Arc;

    fn desk() -> DonationDesk {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let sync = StateSynchronizer::new("admin", "kiosk-config", store, DEFAULT_BUCKETS).unwrap();
        DonationDesk::new(Arc::new(sync))
    }

    #[test]
    fn socket_lives_in_data_dir() {
        assert_eq!(
            default_socket_path(Path::new("/var/lib/kiosk")),
            PathBuf::from("/var/lib/kiosk/admin.sock")
        );
    }

    #[test]
    fn commands_use_cmd_tag() {
        let cmd: AdminCommand =
            serde_json::from_str(r#"{"cmd":"update_category","id":"zakat","amounts":[5,10]}"#)
                .unwrap();
        assert!(matches!(cmd, AdminCommand::UpdateCategory { ref id, .. } if id == ZAKAT));

        let json = serde_json::to_string(&AdminCommand::ResetLedger).unwrap();
        assert_eq!(json, r#"{"cmd":"reset_ledger"}"#);
    }

    #[tokio::test]
    async fn update_category_patches_fields() {
        let desk = desk();
        let cmd = AdminCommand::UpdateCategory {
            id: SPECIAL_APPEALS.into(),
            label: Some("Roof Appeal".into()),
            subtitle: None,
            amounts: None,
            quote: None,
            per_person: None,
            target: Some(40_000),
        };
        assert!(matches!(execute_command(cmd, &desk).await, AdminResponse::Ok { .. }));

        let appeal = desk
            .sync()
            .read(|s| s.category(SPECIAL_APPEALS).cloned())
            .await
            .unwrap();
        assert_eq!(appeal.label, "Roof Appeal");
        assert_eq!(appeal.target, Some(40_000));
        assert_eq!(appeal.amounts, vec![50, 100, 250]);
    }

    #[tokio::test]
    async fn invalid_changes_report_errors() {
        let desk = desk();
        let zero_target = AdminCommand::UpdateCategory {
            id: SPECIAL_APPEALS.into(),
            label: None,
            subtitle: None,
            amounts: None,
            quote: None,
            per_person: None,
            target: Some(0),
        };
        assert!(matches!(execute_command(zero_target, &desk).await, AdminResponse::Error { .. }));

        let empty = AdminCommand::SetSchedule {
            bucket_capacity: None,
            campaign_start: None,
            sponsor_people: None,
            sponsor_items: None,
        };
        assert!(matches!(execute_command(empty, &desk).await, AdminResponse::Error { .. }));

        let unknown = AdminCommand::ResetCategory { id: "nope".into() };
        assert!(matches!(execute_command(unknown, &desk).await, AdminResponse::Error { .. }));
    }

    #[tokio::test]
    async fn empty_amount_list_is_refused() {
        let desk = desk();
        let cmd = AdminCommand::UpdateCategory {
            id: ZAKAT.into(),
            label: None,
            subtitle: None,
            amounts: Some(vec![]),
            quote: None,
            per_person: None,
            target: None,
        };
        assert!(matches!(execute_command(cmd, &desk).await, AdminResponse::Error { .. }));
        let amounts = desk
            .sync()
            .read(|s| s.category(ZAKAT).map(|c| c.amounts.clone()))
            .await
            .unwrap();
        assert_eq!(amounts, vec![25, 50, 100, 200, 500, 1000]);
    }

    #[tokio::test]
    async fn schedule_fields_can_be_cleared() {
        let desk = desk();
        let set: AdminCommand =
            serde_json::from_str(r#"{"cmd":"set_schedule","campaign_start":"2026-02-18","sponsor_people":40}"#)
                .unwrap();
        assert!(matches!(execute_command(set, &desk).await, AdminResponse::Ok { .. }));

        let clear: AdminCommand =
            serde_json::from_str(r#"{"cmd":"set_schedule","sponsor_people":null}"#).unwrap();
        assert!(matches!(
            clear,
            AdminCommand::SetSchedule { campaign_start: None, sponsor_people: Some(None), .. }
        ));
        assert!(matches!(execute_command(clear, &desk).await, AdminResponse::Ok { .. }));

        let (start, people) = desk.sync().read(|s| (s.campaign_start, s.sponsor_people)).await;
        assert_eq!(start, chrono::NaiveDate::from_ymd_opt(2026, 2, 18));
        assert_eq!(people, None);
    }

    #[tokio::test]
    async fn report_and_rebuild() {
        let desk = desk();
        desk.contribute(ContributionRequest::new(RAMADAN_IFTAAR, 300).with_buckets(&[2]))
            .await
            .unwrap();
        desk.contribute(ContributionRequest::new(ZAKAT, 25)).await.unwrap();

        let cmd = AdminCommand::Report {
            category: Some(ZAKAT.into()),
            from: None,
            to: None,
        };
        match execute_command(cmd, &desk).await {
            AdminResponse::Report { report } => assert_eq!(report.total, 25),
            other => panic!("unexpected {:?}", other),
        }

        execute_command(AdminCommand::ResetLedger, &desk).await;
        match execute_command(AdminCommand::RebuildLedger, &desk).await {
            AdminResponse::Ledger { progress } => assert_eq!(progress.funded_buckets, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let admin = AdminSocket::new(desk(), dir.path().join("admin.sock"));
        let listener = admin.bind().unwrap();
        let path = admin.socket_path().to_path_buf();
        let server = tokio::spawn(async move { admin.serve(listener).await });

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"cmd\":\"ping\"}\nnonsense\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let pong = lines.next_line().await.unwrap().unwrap();
        assert_eq!(pong, r#"{"status":"pong"}"#);
        let error = lines.next_line().await.unwrap().unwrap();
        assert!(error.contains("Invalid command"));
        server.abort();
    }
}
