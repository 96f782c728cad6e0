//! Tests for alias derivation, substitution and field resolution.

use pretty_assertions::assert_eq;
use sieve::criteria::{derive_alias, AliasContext, AliasStyle, FieldPath};
use sieve::schema::{EntityMeta, Schema};
use sieve::sql::{CompiledQuery, ConditionType, Join, JoinKind};

fn schema() -> Schema {
    Schema::new()
        .with_entity(
            EntityMeta::new("App\\Entity\\User")
                .with_fields(["Id", "Name"])
                .with_primary_key(["Id"])
                .with_association("Roles", "App\\Entity\\Role"),
        )
        .and_then(|s| s.with_entity(EntityMeta::new("App\\Entity\\Role").with_fields(["Id", "Label"])))
        .unwrap()
}

fn context() -> AliasContext {
    let mut query = CompiledQuery::for_entity("App\\Entity\\User", "u");
    query.add_join(Join {
        kind: JoinKind::Inner,
        entity: "App\\Entity\\Role".into(),
        alias: "r".into(),
        condition_type: ConditionType::With,
        condition: None,
        index_by: None,
    });
    AliasContext::from_query(&query)
}

fn path(alias: &str, property: &str) -> FieldPath {
    FieldPath {
        alias: alias.into(),
        property: property.into(),
    }
}

#[test]
fn test_derive_alias_separators() {
    for name in ["App\\Entity\\UserRole", "app::entity::UserRole", "app.entity.UserRole", "UserRole"] {
        assert_eq!(derive_alias(name, AliasStyle::ShortName), "UserRole", "{}", name);
        assert_eq!(derive_alias(name, AliasStyle::Initials), "ur", "{}", name);
    }
}

#[test]
fn test_context_from_query_orders_roots_then_joins() {
    let ctx = context();
    assert_eq!(ctx.aliases().collect::<Vec<_>>(), vec!["u", "r"]);
    assert_eq!(ctx.primary_entity(), Some("App\\Entity\\User"));
}

#[test]
fn test_resolve_unqualified_uses_first_alias() {
    assert_eq!(context().resolve_field("Name", &schema()), Some(path("u", "Name")));
    // Lenient: not checked against the schema
    assert_eq!(context().resolve_field("Whatever", &schema()), Some(path("u", "Whatever")));
}

#[test]
fn test_resolve_dotted() {
    let ctx = context();
    let schema = schema();
    assert_eq!(ctx.resolve_field("%2$s.Label", &schema), Some(path("r", "Label")));
    assert_eq!(ctx.resolve_field("u.Roles", &schema), Some(path("u", "Roles")));
    assert_eq!(ctx.resolve_field("r.Nope", &schema), None);
    assert_eq!(ctx.resolve_field("%4$s.Label", &schema), None);
    assert_eq!(ctx.resolve_field("x.Label", &schema), Some(path("x", "Label")));
}

#[test]
fn test_resolve_strict() {
    let ctx = context();
    let schema = schema();
    assert_eq!(ctx.resolve_strict("Id", &schema), Some(path("u", "Id")));
    // Associations are not sortable fields of the primary entity
    assert_eq!(ctx.resolve_strict("Roles", &schema), None);
    assert_eq!(ctx.resolve_strict("r.Label", &schema), Some(path("r", "Label")));
    assert_eq!(ctx.resolve_strict("x.Label", &schema), None);
    assert_eq!(ctx.resolve_strict("Id", &Schema::new()), None);
}

#[test]
fn test_field_path_display() {
    assert_eq!(path("r", "Label").to_string(), "r.Label");
}
