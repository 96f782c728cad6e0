//! Entities handled by the service layer.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::schema::EntityMeta;

/// Field payload for create and update.
pub type Payload = Map<String, Value>;

/// A persistable entity.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Current value of a property.
    fn get(&self, field: &str) -> Option<&Value>;

    /// Copy the payload's properties onto the entity.
    fn exchange(&mut self, payload: &Payload);

    /// Validation messages. Empty when valid.
    fn validate(&self) -> Vec<String>;

    /// Properties the entity accepts from a payload.
    fn properties(&self) -> Vec<&str>;

    fn has_property(&self, field: &str) -> bool {
        self.properties().contains(&field)
    }
}

/// Map-backed entity.
///
/// Accepts only its declared properties; `required` properties must be
/// present, non-null and non-blank to validate.
#[derive(Clone, Default, PartialEq, Serialize)]
pub struct Record {
    #[serde(skip)]
    properties: Vec<String>,
    #[serde(skip)]
    required: Vec<String>,
    #[serde(flatten)]
    values: Payload,
}

impl Record {
    pub fn new<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A record accepting every field and association of `meta`.
    pub fn for_entity(meta: &EntityMeta) -> Self {
        Self::new(meta.properties())
    }

    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a value, declared or not.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn values(&self) -> &Payload {
        &self.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl Entity for Record {
    fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    fn exchange(&mut self, payload: &Payload) {
        for (field, value) in payload {
            if self.properties.iter().any(|p| p == field) {
                self.values.insert(field.clone(), value.clone());
            }
        }
    }

    fn validate(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|field| match self.values.get(field.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|field| format!("{} is required.", field))
            .collect()
    }

    fn properties(&self) -> Vec<&str> {
        self.properties.iter().map(String::as_str).collect()
    }
}
