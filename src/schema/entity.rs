//! Entity metadata - the mapped shape of one entity.

use serde::{Deserialize, Serialize};

use crate::sql::dialect::helpers::{entity_namespace, short_entity_name};

/// A mapped entity: its properties and primary key.
///
/// Properties are either plain fields or associations to other entities.
/// Both may appear in criteria; only fields make up the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Fully-qualified name (e.g., "App\\Entity\\User")
    pub name: String,

    /// Mapped field names
    #[serde(default)]
    pub fields: Vec<String>,

    /// Associations to other entities
    #[serde(default, alias = "association")]
    pub associations: Vec<Association>,

    /// Primary key fields, in declaration order
    #[serde(default)]
    pub primary_key: Vec<String>,
}

/// An association property pointing at another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub name: String,
    pub target: String,
}

impl EntityMeta {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            fields: Vec::new(),
            associations: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_association(mut self, name: &str, target: &str) -> Self {
        self.associations.push(Association {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    /// Last segment of the qualified name.
    pub fn short_name(&self) -> &str {
        short_entity_name(&self.name)
    }

    /// Namespace part of the qualified name, without the trailing separator.
    pub fn namespace(&self) -> Option<&str> {
        entity_namespace(&self.name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.associations.iter().any(|a| a.name == name)
    }

    /// Whether `name` is a field or an association.
    pub fn has_property(&self, name: &str) -> bool {
        self.has_field(name) || self.has_association(name)
    }

    /// All property names: fields, then associations.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain(self.associations.iter().map(|a| a.name.as_str()))
    }

    /// First primary key field, if any.
    pub fn first_primary_key(&self) -> Option<&str> {
        self.primary_key.first().map(String::as_str)
    }
}
