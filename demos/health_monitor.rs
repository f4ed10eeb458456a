//! # Health Monitor Example
//!
//! Opens an in-memory SQLite connection, subscribes to lifecycle events and
//! watches the background monitor probe it a few times before shutting down.
//!
//! Run with `RUST_LOG=connhaus=debug cargo run --example health_monitor`.

use connhaus::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = ConnectionManager::new();
    manager.signals().add_callback(|event: &ConnectionEvent| {
        println!(
            "[{}] {:?} {} {}",
            event.timestamp.format("%H:%M:%S%.3f"),
            event.event_type,
            event.connection_name,
            event.message.as_deref().unwrap_or("")
        );
    });

    let config = ConnectionConfig::new("sqlite::memory:").with_options(
        ConnectionOptions::default()
            .with_pool_size(1)
            .with_health_check_interval_ms(250),
    );
    let record = manager.initialize_default(config).await?;
    println!("opened {} ({}) as {}", record.name(), record.kind(), record.id());

    tokio::time::sleep(Duration::from_secs(1)).await;

    let aggregate = manager.health_check().await;
    println!("{}", serde_json::to_string_pretty(&aggregate)?);

    manager.close_all().await?;
    Ok(())
}
