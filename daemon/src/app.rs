use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::ops::Deref;
use std::sync::{Arc, LazyLock};
use tokio::sync::{broadcast, Notify};

use crate::config::AppConfig;
use crate::drivers::{Drivers, GracefulShutdown};
use crate::management::{BatchCoordinator, Supervisor};
use crate::storage::ConfigStore;
use crate::utils::Journal;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
static START_TIME: LazyLock<DateTime<Utc>> = LazyLock::new(Utc::now);

pub struct ApplicationState {
    pub stop_notify: Arc<Notify>,
    pub journal: Journal,
    pub store: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
    pub batch: Arc<BatchCoordinator>,
}
pub type AppState = Arc<ApplicationState>;

pub fn get_start_time() -> &'static DateTime<Utc> {
    START_TIME.deref()
}

pub(crate) fn init_app_state(config: AppConfig) -> AppState {
    let journal = Journal::new();
    let store = Arc::new(ConfigStore::new(config.storage, journal.clone()));
    let supervisor = Supervisor::new(config.supervisor, Arc::clone(&store), journal.clone());
    let batch = Arc::new(BatchCoordinator::new(
        Arc::clone(&supervisor),
        store.worker_ids().to_vec(),
        config.batch,
        journal.clone(),
    ));

    Arc::new(ApplicationState {
        stop_notify: Arc::new(Notify::new()),
        journal,
        store,
        supervisor,
        batch,
    })
}

pub async fn run_app() -> anyhow::Result<()> {
    let _ = get_start_time();
    info!("mcbot daemon v{}", VERSION);

    let config = AppConfig::load()
        .await
        .with_context(|| format!("failed to load {}", AppConfig::path().display()))?;
    debug!("config loaded: {}", serde_json::to_string_pretty(&config)?);

    let state = init_app_state(config);
    let global = state
        .store
        .load_or_init()
        .await
        .context("failed to load the shared worker configuration")?;
    info!(
        "{} accounts, server {} ({})",
        global.accounts.len(),
        global.server.address,
        global.server.protocol_version
    );

    state.supervisor.spawn_liveness_monitor();
    let mut status_changes = state.supervisor.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_changes.recv().await {
                Ok(change) => debug!("{} is now {}", change.worker_id, change.state),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut gs = GracefulShutdown::new();
    gs.add_driver(Drivers::Console.new_driver(state.clone()));
    gs.watch(state.stop_notify.clone()).await;

    state.supervisor.shutdown().await;
    info!("Bye. (up since {})", get_start_time().format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}
