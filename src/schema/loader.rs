//! Schema file loading (TOML or JSON).

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{EntityMeta, Schema, SchemaError, SchemaResult};

/// On-disk layout: a list of entity tables.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, alias = "entities")]
    entity: Vec<EntityMeta>,
}

impl Schema {
    /// Parse a schema from TOML text.
    pub fn from_toml_str(content: &str) -> SchemaResult<Self> {
        let file: SchemaFile = toml::from_str(content)?;
        Self::from_entities(file.entity)
    }

    /// Parse a schema from JSON text.
    pub fn from_json_str(content: &str) -> SchemaResult<Self> {
        let file: SchemaFile = serde_json::from_str(content)?;
        Self::from_entities(file.entity)
    }

    /// Load a schema file, choosing the format by extension.
    pub fn load<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SchemaError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let schema = match ext.as_str() {
            "toml" => Self::from_toml_str(&content)?,
            "json" => Self::from_json_str(&content)?,
            other => return Err(SchemaError::UnsupportedFormat(other.to_string())),
        };
        debug!(path = %path.display(), entities = schema.len(), "loaded schema");
        Ok(schema)
    }

    fn from_entities(entities: Vec<EntityMeta>) -> SchemaResult<Self> {
        let mut schema = Schema::new();
        for entity in entities {
            schema.add(entity)?;
        }
        Ok(schema)
    }
}
