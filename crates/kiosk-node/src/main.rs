//! Kiosk Node binary
//!
//! Serves the donation kiosk and its admin console from one process.

use kiosk_node::{KioskNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiosk_node=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kiosk Node");

    let config = NodeConfig::from_env()?;

    // Create and run node
    let node = KioskNode::new(config).await?;
    node.run().await?;

    Ok(())
}
