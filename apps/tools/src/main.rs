use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemagen::generate_source;
use shared::domain::NamespaceDefinition;
use storage::{Datastore, Storage};

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/permissions.db";

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the datastore to the head revision.
    Migrate,
    /// Store every namespace from a JSON array of definitions.
    WriteSchema { path: PathBuf },
    /// Print the stored schema as schema language.
    PrintSchema,
    /// Remove one namespace definition by name.
    DeleteNamespace { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let database_url = storage::prepare_database_url(&cli.database_url, DEFAULT_DATABASE_URL)?;
    let storage = Storage::new(&database_url).await?;

    println!("{}", run(&storage, cli.command).await?);
    Ok(())
}

async fn run(storage: &Storage, command: Command) -> Result<String> {
    match command {
        Command::Migrate => {
            let status = storage.migrate().await?;
            Ok(format!(
                "migrated to revision={} applied_at={}",
                status.revision,
                status.applied_at.to_rfc3339()
            ))
        }
        Command::WriteSchema { path } => {
            let definitions = read_definitions(&path)?;
            storage.write_namespaces(&definitions).await?;
            Ok(format!("wrote {} namespace definitions", definitions.len()))
        }
        Command::PrintSchema => render_schema(&storage.list_namespaces().await?),
        Command::DeleteNamespace { name } => {
            if storage.delete_namespace(&name).await? {
                Ok(format!("deleted namespace {name}"))
            } else {
                Ok(format!("namespace {name} not found"))
            }
        }
    }
}

fn read_definitions(path: &Path) -> Result<Vec<NamespaceDefinition>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a JSON array of namespace definitions", path.display()))
}

/// Unlike the dashboard, a definition that cannot be printed fails the command.
fn render_schema(definitions: &[NamespaceDefinition]) -> Result<String> {
    let blocks = definitions
        .iter()
        .map(|definition| {
            generate_source(definition)
                .with_context(|| format!("failed to print namespace '{}'", definition.name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(blocks.join("\n\n"))
}
