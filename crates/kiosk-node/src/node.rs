//! Kiosk Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - Two instances on that storage: the kiosk display and the admin
//!   console, kept in step by their synchronizers over the shared topic
//! - HTTP API and WebSocket stream for the kiosk display
//! - Unix admin socket for the admin console (kiosk-admin CLI)

use crate::admin_socket::{default_socket_path, AdminSocket};
use crate::api;
use crate::desk::DonationDesk;
use crate::error::{Error, Result};
use crate::feed::ConfigFeed;
use crate::state::DEFAULT_BUCKETS;
use crate::storage::RocksStore;
use crate::store::StateStore;
use crate::sync::StateSynchronizer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Default broadcast topic for campaign state.
pub const DEFAULT_TOPIC: &str = "kiosk-config";

/// Configuration for a kiosk node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for kiosk-admin CLI)
    pub admin_socket: PathBuf,

    /// Number of campaign buckets
    pub buckets: usize,

    /// Broadcast topic shared by all instances
    pub topic: String,

    /// Installation slug to look up in the config feed
    pub installation: Option<String>,

    /// Config feed document
    pub feed_path: Option<PathBuf>,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(var("KIOSK_DATA_DIR").unwrap_or_else(|| "./kiosk-data".to_string()));

        let api_addr = var("KIOSK_API_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid KIOSK_API_ADDR: {}", e)))?;

        let admin_socket = var("KIOSK_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_socket_path(&data_dir));

        let buckets = match var("KIOSK_BUCKETS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(Error::Config(format!("Invalid KIOSK_BUCKETS: {}", raw))),
            },
            None => DEFAULT_BUCKETS,
        };

        let topic = var("KIOSK_TOPIC")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        let installation = var("KIOSK_INSTALLATION").filter(|s| !s.trim().is_empty());
        let feed_path = var("KIOSK_FEED_PATH").map(PathBuf::from);

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            buckets,
            topic,
            installation,
            feed_path,
        })
    }
}

/// Shared state for the HTTP layer.
#[derive(Debug)]
pub struct NodeState {
    /// The kiosk display instance
    pub kiosk: DonationDesk,
    /// Installation this node serves, if configured
    pub installation: Option<String>,
}

/// Instance id: role plus a random suffix, unique per process start.
pub fn instance_id(role: &str) -> String {
    format!("{}-{:08x}", role, rand::random::<u32>())
}

/// A kiosk node instance.
pub struct KioskNode {
    config: NodeConfig,
    kiosk: Arc<StateSynchronizer>,
    admin: Arc<StateSynchronizer>,
}

impl KioskNode {
    /// Create a new kiosk node.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        // Open single shared storage instance
        let store: Arc<dyn StateStore> = Arc::new(RocksStore::open(&config.data_dir)?);
        Self::with_store(config, store).await
    }

    /// Create a node on an existing store.
    pub async fn with_store(config: NodeConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        let kiosk = Arc::new(StateSynchronizer::new(
            instance_id("kiosk"),
            config.topic.clone(),
            Arc::clone(&store),
            config.buckets,
        )?);
        let admin = Arc::new(StateSynchronizer::new(
            instance_id("admin"),
            config.topic.clone(),
            store,
            config.buckets,
        )?);

        let node = Self {
            config,
            kiosk,
            admin,
        };
        node.apply_feed().await;
        Ok(node)
    }

    /// Apply installation defaults from the config feed. Failures are
    /// logged and startup continues with built-in defaults.
    async fn apply_feed(&self) {
        let (Some(path), Some(slug)) = (&self.config.feed_path, &self.config.installation) else {
            return;
        };
        let feed = match ConfigFeed::load(path).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("Config feed unavailable: {}", e);
                return;
            }
        };
        let Some(installation) = feed.find(slug) else {
            tracing::warn!("Installation {} not in config feed", slug);
            return;
        };
        tracing::info!(
            "Using defaults for {}",
            installation.name.as_deref().unwrap_or(&installation.slug)
        );

        for sync in [&self.kiosk, &self.admin] {
            let update = sync.read(|state| installation.to_update(state)).await;
            sync.apply_defaults(update).await;
        }
    }

    /// The kiosk display instance.
    pub fn kiosk(&self) -> &Arc<StateSynchronizer> {
        &self.kiosk
    }

    /// The admin console instance.
    pub fn admin(&self) -> &Arc<StateSynchronizer> {
        &self.admin
    }

    /// Shared state for the HTTP layer.
    pub fn state(&self) -> Arc<NodeState> {
        Arc::new(NodeState {
            kiosk: DonationDesk::new(Arc::clone(&self.kiosk)),
            installation: self.config.installation.clone(),
        })
    }

    /// Run the node (starts listeners, admin socket, and HTTP server).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Kiosk node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Buckets: {}", self.config.buckets);
        tracing::info!("  Topic: {}", self.config.topic);

        // Both instances follow the shared topic
        let _kiosk_listener = self.kiosk.listen();
        let _admin_listener = self.admin.listen();

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(
            DonationDesk::new(Arc::clone(&self.admin)),
            self.config.admin_socket.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(self.state());

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
