use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use dbus_interface::{AppState, FacegateService};

const BUS_NAME: &str = "org.facegate.Facegate1";
const OBJECT_PATH: &str = "/org/facegate/Facegate1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::from_env();

    let store = store::SqliteTemplateStore::open(&config.db_path).await?;
    let (identities, templates) = store.counts().await?;
    tracing::info!(
        path = %config.db_path.display(),
        identities,
        templates,
        "template store opened"
    );

    let engine = engine::spawn_engine(
        config.matcher,
        config.liveness.clone(),
        Duration::from_secs(config.check_timeout_secs),
    )?;

    let session_bus = config.session_bus;
    let service = FacegateService {
        state: Arc::new(AppState {
            config,
            engine,
            store,
        }),
    };

    let builder = if session_bus {
        tracing::info!("using session bus");
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus_name = BUS_NAME, "facegated ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
