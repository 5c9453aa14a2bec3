use crate::core::schema::Schema;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// One schema file: `{ name, fields, options }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaFile {
    /// Defaults to the file name up to its first dot.
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub schema: Schema,
}

/// Parses a single YAML or JSON schema file.
pub fn load_schema_file(path: &Path) -> Result<SchemaFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;

    let mut file: SchemaFile = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))?,
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))?,
    };

    if file.name.is_empty() {
        file.name = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.split('.').next())
            .unwrap_or_default()
            .to_string();
    }
    Ok(file)
}

/// Loads every schema file in `dir`, in file name order, skipping the
/// names listed in `ignored`.
pub fn load_schema_files(dir: &Path, ignored: &[String]) -> Result<Vec<SchemaFile>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read schema folder: {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read schema folder: {}", dir.display()))?
            .path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let is_schema = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCHEMA_EXTENSIONS.contains(&ext));
        if !path.is_file() || !is_schema {
            continue;
        }
        if ignored.iter().any(|name| name == file_name) {
            debug!("Skipping ignored schema file {}", file_name);
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            info!("Registering schema file {}", path.display());
            load_schema_file(path)
        })
        .collect()
}
