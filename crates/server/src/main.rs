use std::{sync::Arc, time::Duration};

use dashboard::{Dashboard, DashboardHandle};
use schemagen::DslGenerator;
use storage::{prepare_database_url, Storage};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings, DEFAULT_DATABASE_URL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let mut handle = start_dashboard(&settings).await?;

    let exited = tokio::select! {
        result = handle.closed() => Some(result),
        _ = shutdown_signal() => None,
    };
    match exited {
        Some(result) => result,
        None => {
            info!("shutdown requested");
            handle
                .stop(Duration::from_secs(settings.shutdown_grace_seconds))
                .await
        }
    }
}

/// Opens the datastore named by `settings` and serves the dashboard on
/// `dashboard_bind`.
async fn start_dashboard(settings: &Settings) -> anyhow::Result<DashboardHandle> {
    let database_url = prepare_database_url(&settings.database_url, DEFAULT_DATABASE_URL)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    storage.health_check().await?;

    match storage.migration_status().await? {
        Some(status) => info!(
            revision = %status.revision,
            applied_at = %status.applied_at,
            "datastore migration status"
        ),
        None => warn!("datastore is not migrated; the dashboard will show migration guidance"),
    }

    let dashboard = Dashboard::new(
        settings.dashboard_args(),
        Arc::new(storage),
        Arc::new(DslGenerator),
    );
    dashboard.start(&settings.dashboard_bind).await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
