//! Entity metadata registry.
//!
//! The criteria compiler validates ORDER, GROUP and predicate field
//! references against this registry and reads primary keys from it to
//! synthesize join conditions. Entities are registered in code or loaded
//! from a TOML/JSON file:
//!
//! ```toml
//! [[entity]]
//! name = "App\\Entity\\User"
//! fields = ["Id", "Name", "Email"]
//! primary_key = ["Id"]
//!
//! [[entity.association]]
//! name = "Roles"
//! target = "App\\Entity\\Role"
//! ```

mod entity;
mod loader;

pub use entity::{Association, EntityMeta};

use indexmap::IndexMap;
use std::path::PathBuf;

use crate::sql::dialect::helpers::short_entity_name;

/// Errors that can occur while building a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML schema: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported schema file extension: {0}")]
    UnsupportedFormat(String),

    #[error("Entity '{0}' is defined more than once")]
    DuplicateEntity(String),

    #[error("Entity '{entity}' declares primary key field '{field}' which is not a mapped field")]
    UnknownPrimaryKey { entity: String, field: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Registry of mapped entities, keyed by fully-qualified name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: IndexMap<String, EntityMeta>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity.
    pub fn add(&mut self, entity: EntityMeta) -> SchemaResult<()> {
        let key = normalize(&entity.name).to_string();
        if self.entities.contains_key(&key) {
            return Err(SchemaError::DuplicateEntity(entity.name));
        }
        if let Some(field) = entity.primary_key.iter().find(|pk| !entity.has_field(pk)) {
            return Err(SchemaError::UnknownPrimaryKey {
                entity: entity.name.clone(),
                field: field.clone(),
            });
        }
        self.entities.insert(key, entity);
        Ok(())
    }

    /// Builder-style [`Schema::add`].
    pub fn with_entity(mut self, entity: EntityMeta) -> SchemaResult<Self> {
        self.add(entity)?;
        Ok(self)
    }

    /// Look up an entity by fully-qualified name, or by short name when the
    /// short name is unambiguous.
    pub fn get(&self, name: &str) -> Option<&EntityMeta> {
        let key = normalize(name);
        if let Some(entity) = self.entities.get(key) {
            return Some(entity);
        }

        let short = short_entity_name(key);
        let mut matches = self.entities.values().filter(|e| e.short_name() == short);
        match (matches.next(), matches.next()) {
            (Some(only), None) if short == key => Some(only),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All entities, in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityMeta> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn normalize(name: &str) -> &str {
    name.trim().trim_start_matches('\\')
}
