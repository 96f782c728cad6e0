//! Parameter bindings carried by a compiled query.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Key of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// Positional parameter (`?0`, `?1`, ...).
    Positional(usize),
    /// Named parameter (`:name`).
    Named(String),
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Positional(n) => write!(f, "?{}", n),
            ParamKey::Named(name) => write!(f, ":{}", name),
        }
    }
}

impl From<usize> for ParamKey {
    fn from(n: usize) -> Self {
        ParamKey::Positional(n)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Named(name.trim_start_matches(':').to_string())
    }
}

/// Ordered parameter set.
///
/// Positional keys are allocated by [`Parameters::bind`], which always hands
/// out one past the highest positional key in use, so bindings made by
/// separate clauses never collide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: IndexMap<ParamKey, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to the next free positional key.
    pub fn bind(&mut self, value: Value) -> ParamKey {
        let key = ParamKey::Positional(self.next_position());
        self.values.insert(key.clone(), value);
        key
    }

    /// Set a value under an explicit key, replacing any previous binding.
    pub fn set(&mut self, key: impl Into<ParamKey>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge another set into this one. Later bindings win.
    pub fn merge(&mut self, other: impl IntoIterator<Item = (ParamKey, Value)>) {
        for (key, value) in other {
            self.values.insert(key, value);
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Value)> {
        self.values.iter()
    }

    /// The positional key [`Parameters::bind`] would hand out next.
    pub fn next_position(&self) -> usize {
        self.values
            .keys()
            .filter_map(|k| match k {
                ParamKey::Positional(n) => Some(n + 1),
                ParamKey::Named(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}
