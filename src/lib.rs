//! Caching document models with TTL expiry notifications, layered over a
//! pluggable document store.

pub mod builders;
pub mod cli;
pub mod core;
pub mod database;
pub mod store;

pub use crate::builders::{
    ConnectionStringBuilder, DocumentBuilder, SchemaBuilder, SchemaFieldBuilder,
};
pub use crate::core::{
    Cache, ClientOptions, Document, EditOptions, Engine, Error, ExpiryManager, FieldType,
    Model, RawRecord, Result, Schema, SchemaField, SchemaOptions, StorageConfig,
};
pub use crate::database::Database;
pub use crate::store::CollectionStore;

use std::path::PathBuf;
use tracing::debug;

/// Commands the binary dispatches to [`run_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Schemas {
        dir: Option<PathBuf>,
    },
    ConnectionString(ConnectionStringBuilder),
}

fn load_options(config_path: Option<&str>) -> anyhow::Result<ClientOptions> {
    match config_path {
        Some(path) => ClientOptions::load_from_path(path),
        None => {
            let path = ClientOptions::default_config_path()?;
            if path.exists() {
                ClientOptions::load_from_path(&path)
            } else {
                debug!("No config at {}, using defaults", path.display());
                Ok(ClientOptions::default())
            }
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> anyhow::Result<()> {
    match command {
        AppCommand::Schemas { dir } => {
            let options = load_options(config_path)?;
            debug!("Loaded config: {options:#?}");
            cli::schemas::display_schemas(
                dir.as_deref(),
                options.schema_folder_path.as_deref(),
                &options.ignored_files,
            )
        }
        AppCommand::ConnectionString(builder) => {
            println!("{builder}");
            Ok(())
        }
    }
}
