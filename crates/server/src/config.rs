use std::{collections::HashMap, path::Path};

use ::config::{Config, Environment, File};
use anyhow::Context;
use dashboard::DashboardArgs;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "dashboard.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/permissions.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub dashboard_bind: String,
    pub database_url: String,
    pub grpc_addr: String,
    pub grpc_no_tls: bool,
    pub datastore_engine: String,
    pub shutdown_grace_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dashboard_bind: "127.0.0.1:8080".into(),
            database_url: DEFAULT_DATABASE_URL.into(),
            grpc_addr: "localhost:50051".into(),
            grpc_no_tls: false,
            datastore_engine: "sqlite".into(),
            shutdown_grace_seconds: 10,
        }
    }
}

impl Settings {
    pub fn dashboard_args(&self) -> DashboardArgs {
        DashboardArgs {
            grpc_addr: self.grpc_addr.clone(),
            grpc_no_tls: self.grpc_no_tls,
            datastore_engine: self.datastore_engine.clone(),
        }
    }
}

/// Defaults, then `dashboard.toml` when present, then `APP__*` variables.
/// A bare `DATABASE_URL` wins over everything else.
pub fn load_settings() -> anyhow::Result<Settings> {
    let env: HashMap<String, String> = std::env::vars().collect();
    build_settings(Path::new(SETTINGS_FILE), &env)
}

fn build_settings(file: &Path, env: &HashMap<String, String>) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let layered = Config::builder()
        .set_default("dashboard_bind", defaults.dashboard_bind)?
        .set_default("database_url", defaults.database_url)?
        .set_default("grpc_addr", defaults.grpc_addr)?
        .set_default("grpc_no_tls", defaults.grpc_no_tls)?
        .set_default("datastore_engine", defaults.datastore_engine)?
        .set_default("shutdown_grace_seconds", defaults.shutdown_grace_seconds as i64)?
        .add_source(File::from(file).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        )
        .set_override_option("database_url", env.get("DATABASE_URL").cloned())?
        .build()
        .with_context(|| format!("failed to load settings from '{}'", file.display()))?;

    layered
        .try_deserialize()
        .context("invalid dashboard settings")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
