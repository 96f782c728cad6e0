//! Alias derivation and the alias registry used for positional substitution.
//!
//! Criteria refer to entities through aliases, either by name (`User.Name`)
//! or by position (`%2$s.Name` is the second registered alias). The
//! [`AliasContext`] is rebuilt from the query's roots and joins and grows as
//! joins register, so placeholders always resolve against what the query
//! actually contains.

use inflector::Inflector;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::schema::Schema;
use crate::sql::dialect::helpers::short_entity_name;
use crate::sql::{table_col, CompiledQuery, Expr};

// =============================================================================
// Derivation
// =============================================================================

/// How an alias is derived from an entity name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasStyle {
    /// `App\Entity\UserRole` → `UserRole`
    #[default]
    ShortName,
    /// `App\Entity\UserRole` → `ur`
    Initials,
}

/// Derive the alias for an entity name.
pub fn derive_alias(entity: &str, style: AliasStyle) -> String {
    let short = short_entity_name(entity);
    match style {
        AliasStyle::ShortName => short.to_string(),
        AliasStyle::Initials => short
            .to_snake_case()
            .split('_')
            .filter_map(|word| word.chars().next())
            .collect(),
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One alias bound to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasBinding {
    pub alias: String,
    pub entity: String,
}

/// Ordered alias registry. Position 1 is the primary root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasContext {
    bindings: Vec<AliasBinding>,
}

/// A resolved `alias.property` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub alias: String,
    pub property: String,
}

impl FieldPath {
    pub fn to_expr(&self) -> Expr {
        table_col(&self.alias, &self.property)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.property)
    }
}

impl AliasContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots first, then joins, as registered on the query.
    pub fn from_query(query: &CompiledQuery) -> Self {
        Self {
            bindings: query
                .aliases()
                .into_iter()
                .map(|(alias, entity)| AliasBinding {
                    alias: alias.to_string(),
                    entity: entity.to_string(),
                })
                .collect(),
        }
    }

    pub fn register(&mut self, alias: &str, entity: &str) -> &mut Self {
        self.bindings.push(AliasBinding {
            alias: alias.to_string(),
            entity: entity.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.alias.as_str())
    }

    /// Binding at a 1-based position.
    pub fn get(&self, position: usize) -> Option<&AliasBinding> {
        position.checked_sub(1).and_then(|i| self.bindings.get(i))
    }

    pub fn first_alias(&self) -> Option<&str> {
        self.bindings.first().map(|b| b.alias.as_str())
    }

    pub fn primary_entity(&self) -> Option<&str> {
        self.bindings.first().map(|b| b.entity.as_str())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.bindings.iter().any(|b| b.alias == alias)
    }

    pub fn entity_of(&self, alias: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.alias == alias)
            .map(|b| b.entity.as_str())
    }

    /// `base`, or `base` with the smallest numeric suffix (from 2) that is
    /// not yet bound.
    pub fn unique_alias(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // =========================================================================
    // Substitution
    // =========================================================================

    /// Replace alias placeholders in `template`.
    ///
    /// - `%N$s` is the alias at 1-based position N
    /// - `%s` takes the next alias in order
    /// - `%%` is a literal percent sign
    ///
    /// Returns `None` for an out-of-range position or any other `%`
    /// directive.
    pub fn substitute(&self, template: &str) -> Option<String> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        let mut sequential = 0usize;

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            match chars.next()? {
                '%' => out.push('%'),
                's' => {
                    sequential += 1;
                    out.push_str(&self.get(sequential)?.alias);
                }
                d if d.is_ascii_digit() => {
                    let mut digits = String::from(d);
                    while let Some(next) = chars.next_if(char::is_ascii_digit) {
                        digits.push(next);
                    }
                    if chars.next() != Some('$') || chars.next() != Some('s') {
                        return None;
                    }
                    let position: usize = digits.parse().ok()?;
                    out.push_str(&self.get(position)?.alias);
                }
                _ => return None,
            }
        }

        Some(out)
    }

    // =========================================================================
    // Field resolution
    // =========================================================================

    /// Resolve a field reference.
    ///
    /// - `Name` → first alias, `Name`
    /// - `%2$s.Name` / `Role.Name` → substituted, split at the first dot
    ///
    /// When the alias is registered and its entity is known to the schema,
    /// the property must exist on it. Prefixes that are not registered
    /// aliases pass through unchecked.
    pub fn resolve_field(&self, reference: &str, schema: &Schema) -> Option<FieldPath> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if !reference.contains('.') {
            return Some(FieldPath {
                alias: self.first_alias()?.to_string(),
                property: reference.to_string(),
            });
        }

        let path = self.split_dotted(reference)?;
        if let Some(meta) = self.entity_of(&path.alias).and_then(|e| schema.get(e)) {
            if !meta.has_property(&path.property) {
                trace!(field = %path, entity = %meta.name, "property not mapped");
                return None;
            }
        }
        Some(path)
    }

    /// Resolve an ordering reference.
    ///
    /// Stricter than [`AliasContext::resolve_field`]: an unqualified field
    /// must be a mapped field of the primary entity, and a dotted field must
    /// name a registered alias whose entity has the property.
    pub fn resolve_strict(&self, reference: &str, schema: &Schema) -> Option<FieldPath> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if !reference.contains('.') {
            let primary = schema.get(self.primary_entity()?)?;
            if !primary.has_field(reference) {
                return None;
            }
            return Some(FieldPath {
                alias: self.first_alias()?.to_string(),
                property: reference.to_string(),
            });
        }

        let path = self.split_dotted(reference)?;
        let meta = schema.get(self.entity_of(&path.alias)?)?;
        meta.has_property(&path.property).then_some(path)
    }

    fn split_dotted(&self, reference: &str) -> Option<FieldPath> {
        let resolved = self.substitute(reference)?;
        let (alias, property) = resolved.split_once('.')?;
        let (alias, property) = (alias.trim(), property.trim());
        if alias.is_empty() || property.is_empty() {
            return None;
        }
        Some(FieldPath {
            alias: alias.to_string(),
            property: property.to_string(),
        })
    }
}
