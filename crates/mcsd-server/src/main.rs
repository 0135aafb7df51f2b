//! Binds the registry, mass sync scheduler, and downstream routing API
//! together into one process. No auth, CORS, or rate limiting here — that
//! is the façade's job (§13 Non-goals).

use std::sync::Arc;

use mcsd_client::FhirClient;
use mcsd_db_postgres::PgDirectoryStore;
use mcsd_registry::NoopCleanupHook;
use mcsd_scheduler::{ClientDirectorySyncRunner, CleanupTick, MassSyncScheduler};
use tokio::net::TcpListener;
use tracing::info;

use mcsd_server::app::{self, AppState};
use mcsd_server::config::Config;
use mcsd_server::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing("info");

    let config = Config::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    let (directory_store, resource_map_store) = mcsd_db_postgres::connect(&config.postgres).await?;
    let directory_store: Arc<PgDirectoryStore> = Arc::new(directory_store);
    let resource_map_store = Arc::new(resource_map_store);

    let runner = Arc::new(ClientDirectorySyncRunner {
        local_base_url: config.local_fhir_base_url.clone(),
        resource_map_store: resource_map_store.clone(),
    });
    let scheduler = Arc::new(MassSyncScheduler::new(
        config.scheduler.clone(),
        directory_store.clone(),
        runner,
    ));
    let _scheduler_shutdown = scheduler.start();

    let cleanup = CleanupTick::new(config.scheduler.clone(), directory_store.clone(), Arc::new(NoopCleanupHook));
    tokio::spawn({
        let interval = config.scheduler.cleanup_interval;
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cleanup.run().await;
            }
        }
    });

    let local_client = Arc::new(FhirClient::new(config.local_client_config())?);
    let state = AppState { local_client };
    let router = app::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "mcsd-server listening");
    axum::serve(listener, router).await?;

    Ok(())
}
