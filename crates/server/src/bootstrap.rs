//! Startup wiring: pool, migrations, the conversation driver, and the
//! flows, assembled into one [`AppState`].

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use frontdesk_agent::{
    ConversationDriver, DriverSettings, EngagementFlow, OpenAiBackend, RoutingEngine,
};
use frontdesk_core::config::AppConfig;
use frontdesk_db::repositories::{
    SqlContactRepository, SqlDirectoryRepository, SqlTenantRepository,
};
use frontdesk_db::{connect_with_settings, migrations};

use crate::state::{AppState, SweepGuard};

pub async fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .context("opening the database pool")?;
    migrations::run_pending(&pool).await.context("applying pending migrations")?;

    let tenants = Arc::new(SqlTenantRepository::new(pool.clone()));
    let directory = Arc::new(SqlDirectoryRepository::new(pool.clone()));
    let contacts = Arc::new(SqlContactRepository::new(pool.clone()));

    let backend = Arc::new(OpenAiBackend::new(&config.model));
    let driver = Arc::new(ConversationDriver::new(
        backend,
        DriverSettings::from_model_config(&config.model),
    ));

    let routing = RoutingEngine::new(directory.clone(), contacts.clone(), driver.clone());
    let engagement = EngagementFlow::new(directory.clone(), driver.clone());

    info!(
        event_name = "state_built",
        database = %config.database.url,
        model_base_url = %config.model.base_url,
        "application state ready"
    );

    Ok(Arc::new(AppState {
        config,
        pool,
        tenants,
        directory,
        contacts,
        driver,
        routing,
        engagement,
        sweep_guard: SweepGuard::default(),
    }))
}
