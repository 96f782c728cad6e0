//! Tests for compiling criteria into a CompiledQuery.

use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use serde_json::json;
use sieve::criteria::{
    AliasStyle, ClauseKind, CompilerOptions, Criteria, CriteriaCompiler, CriteriaError,
    JoinClause, JoinSpec, OrderClause, SourceClause, SourceSpec,
};
use sieve::schema::{EntityMeta, Schema};
use sieve::sql::{
    table_col, ConditionType, Dialect, ExprExt, JoinKind, NullsOrder, OrderByExpr, ParamKey,
    SortDir,
};
use std::sync::Arc;

fn schema() -> Arc<Schema> {
    let schema = Schema::new()
        .with_entity(
            EntityMeta::new("App\\Entity\\User")
                .with_fields(["Id", "Name", "Email"])
                .with_primary_key(["Id"])
                .with_association("Roles", "App\\Entity\\Role"),
        )
        .and_then(|s| {
            s.with_entity(
                EntityMeta::new("App\\Entity\\Role")
                    .with_fields(["Id", "Name"])
                    .with_primary_key(["Id"]),
            )
        })
        .and_then(|s| {
            s.with_entity(
                EntityMeta::new("App\\Entity\\Permission")
                    .with_fields(["PermissionId", "Name"])
                    .with_primary_key(["PermissionId"]),
            )
        })
        .unwrap();
    Arc::new(schema)
}

fn compiler() -> CriteriaCompiler {
    CriteriaCompiler::new(schema(), "User")
}

fn where_text(criteria: serde_json::Value) -> Option<String> {
    let query = compiler().compile_json(&criteria, None).unwrap();
    query.where_clause.map(|e| e.to_text(Dialect::Dql))
}

// =============================================================================
// SOURCE
// =============================================================================

#[test]
fn test_new_query_is_rooted_at_canonical_entity() {
    let c = compiler();
    assert_eq!(c.entity(), "App\\Entity\\User");
    let q = c.new_query();
    assert_eq!(q.aliases(), vec![("User", "App\\Entity\\User")]);
}

#[test]
fn test_source_roots_get_derived_aliases() {
    let q = compiler()
        .compile_json(&json!({"from": "Role, Permission p"}), None)
        .unwrap();
    assert_eq!(
        q.aliases(),
        vec![
            ("User", "App\\Entity\\User"),
            ("Role", "App\\Entity\\Role"),
            ("p", "App\\Entity\\Permission"),
        ]
    );
    assert_eq!(
        q.to_sql(Dialect::Dql),
        "SELECT\n  User\nFROM App\\Entity\\User User, App\\Entity\\Role Role, App\\Entity\\Permission p"
    );
}

#[test]
fn test_source_existing_root_is_not_readded() {
    let criteria = Criteria::new().source(SourceClause::Many(vec![
        SourceSpec::new("User"),
        SourceSpec::new("\\App\\Entity\\User").alias("u2"),
    ]));
    let q = compiler().compile(&criteria, None).unwrap();
    assert_eq!(q.root_entities(), vec!["App\\Entity\\User"]);
}

#[test]
fn test_source_alias_collision_gets_suffix() {
    let q = compiler()
        .compile_json(&json!({"from": [{"from": "Other\\User"}]}), None)
        .unwrap();
    assert_eq!(q.aliases()[1], ("User2", "Other\\User"));
}

#[test]
fn test_source_index_by() {
    let q = compiler()
        .compile_json(&json!({"from": "Role r INDEX BY r.Id"}), None)
        .unwrap();
    assert_eq!(q.from[1].index_by.as_deref(), Some("r.Id"));
    assert_eq!(
        q.to_sql(Dialect::Dql),
        "SELECT\n  User\nFROM App\\Entity\\User User, App\\Entity\\Role r INDEX BY r.Id"
    );
}

#[test]
fn test_source_blank_entity_is_an_error() {
    let criteria = Criteria::new().source(SourceClause::One(SourceSpec::new("  ")));
    assert_eq!(
        compiler().compile(&criteria, None).unwrap_err(),
        CriteriaError::MissingKey {
            clause: ClauseKind::Source,
            key: "from"
        }
    );
}

// =============================================================================
// SELECT / DISTINCT
// =============================================================================

#[test]
fn test_select_twice_has_no_duplicates() {
    let c = compiler();
    let criteria = Criteria::from_json(&json!({"select": "User.Name, User.Email"})).unwrap();
    let first = c.compile(&criteria, None).unwrap();
    assert_eq!(first.select.len(), 3);

    let second = c.compile(&criteria, Some(first.clone())).unwrap();
    assert_eq!(second.select, first.select);
}

#[test]
fn test_select_positional_and_expressions() {
    let q = compiler()
        .compile_json(
            &json!({"select": "%1$s.Name, CONCAT(%1$s.Name, ', ', %1$s.Email) AS Label, *"}),
            None,
        )
        .unwrap();
    assert_snapshot!(q.to_sql(Dialect::Dql), @r"
    SELECT
      User,
      User.Name,
      CONCAT(User.Name, ', ', User.Email) AS Label
    FROM App\Entity\User User
    ");
}

#[test]
fn test_distinct_quantifier() {
    let q = compiler()
        .compile_json(&json!({"quantifier": "DISTINCT"}), None)
        .unwrap();
    assert!(q.distinct);

    let q = compiler().compile_json(&json!({"distinct": false}), None).unwrap();
    assert!(!q.distinct);
}

// =============================================================================
// JOIN
// =============================================================================

#[test]
fn test_join_without_condition_uses_preceding_alias() {
    let q = compiler()
        .compile_json(
            &json!({"joins": [{"join": "Role"}, {"leftJoin": "Permission", "alias": "p"}]}),
            None,
        )
        .unwrap();

    assert_eq!(q.joins.len(), 2);
    assert_eq!(q.joins[0].kind, JoinKind::Inner);
    assert_eq!(q.joins[0].condition_type, ConditionType::With);
    assert_eq!(
        q.joins[0].condition,
        Some(table_col("Role", "Id").eq(table_col("User", "Id")))
    );
    assert_eq!(
        q.joins[1].condition,
        Some(table_col("p", "PermissionId").eq(table_col("Role", "PermissionId")))
    );
}

#[test]
fn test_join_unknown_target_uses_guessed_field() {
    let options = CompilerOptions {
        guess_join_field: "Uid".into(),
        ..CompilerOptions::default()
    };
    let q = compiler()
        .with_options(options)
        .compile(&Criteria::new().join(JoinClause::One(JoinSpec::left("Audit"))), None)
        .unwrap();
    assert_eq!(q.joins[0].entity, "App\\Entity\\Audit");
    assert_eq!(
        q.joins[0].condition,
        Some(table_col("Audit", "Uid").eq(table_col("User", "Uid")))
    );
}

#[test]
fn test_join_condition_placeholders() {
    let q = compiler()
        .compile(
            &Criteria::new().join(JoinClause::One(
                JoinSpec::inner("Role").alias("r").on("%2$s.Id = %1$s.Id"),
            )),
            None,
        )
        .unwrap();
    assert_eq!(
        q.to_sql(Dialect::Dql),
        "SELECT\n  User\nFROM App\\Entity\\User User\nINNER JOIN App\\Entity\\Role r ON r.Id = User.Id"
    );
}

#[test]
fn test_join_unresolved_condition_is_dropped() {
    let q = compiler()
        .compile_json(&json!({"join": {"join": "Role", "condition": "%5$s.Id = %1$s.Id"}}), None)
        .unwrap();
    assert_eq!(q.joins.len(), 1);
    assert_eq!(q.joins[0].condition, None);
}

#[test]
fn test_join_rejects_unknown_kind() {
    let err = compiler()
        .compile_json(&json!({"join": {"target": "Role", "kind": "outer"}}), None)
        .unwrap_err();
    assert_eq!(err.clause(), ClauseKind::Join);
}

// =============================================================================
// WHERE / HAVING
// =============================================================================

#[test]
fn test_where_map_is_or_combined() {
    let q = compiler()
        .compile_json(&json!({"where": {"Name": "demo", "field.Name": "demo2"}}), None)
        .unwrap();
    assert_eq!(
        q.where_clause.as_ref().map(|e| e.to_text(Dialect::Dql)).as_deref(),
        Some("User.Name = ?0 OR field.Name = ?1")
    );
    assert_eq!(q.parameters.get(&ParamKey::Positional(0)), Some(&json!("demo")));
    assert_eq!(q.parameters.get(&ParamKey::Positional(1)), Some(&json!("demo2")));
}

#[test]
fn test_where_list_value_is_in() {
    let q = compiler()
        .compile_json(&json!({"where": {"Id": [1, 2, 3]}}), None)
        .unwrap();
    assert_eq!(
        q.where_clause.as_ref().map(|e| e.to_text(Dialect::Dql)).as_deref(),
        Some("User.Id IN(?0)")
    );
    assert_eq!(q.parameters.get(&ParamKey::Positional(0)), Some(&json!([1, 2, 3])));
}

#[test]
fn test_where_pluck() {
    let q = compiler()
        .compile_json(
            &json!({"where": {"Id": {"array": [{"Id": 4}, {"Id": 9}], "column_key": "Id"}}}),
            None,
        )
        .unwrap();
    assert_eq!(q.parameters.get(&ParamKey::Positional(0)), Some(&json!([4, 9])));
}

#[test]
fn test_where_unmapped_property_is_dropped() {
    assert_eq!(
        where_text(json!({"where": {"User.Nope": 1, "Name": "x"}})).as_deref(),
        Some("User.Name = ?0")
    );
    assert_eq!(where_text(json!({"where": {"%3$s.Name": 1}})), None);
}

#[test]
fn test_where_predicate_drops_only_unresolvable_node() {
    let text = where_text(json!({"where": [
        {"type": "eq", "field": "Name", "value": "a"},
        {"type": "eq", "field": "%5$s.Name", "value": "b"},
        {"type": "eq", "field": "Email", "value": "c"}
    ]}));
    assert_eq!(text.as_deref(), Some("User.Name = ?0 AND User.Email = ?1"));
}

#[test]
fn test_where_expression_parameters_follow_value_predicates() {
    let q = compiler()
        .compile_json(
            &json!({"where": [
                {"type": "eq", "field": "Name", "value": "alice"},
                {"type": "expression", "text": "User.Id > ?0", "parameters": [30]}
            ]}),
            None,
        )
        .unwrap();
    assert_eq!(
        q.where_clause.map(|e| e.to_text(Dialect::Dql)).as_deref(),
        Some("User.Name = ?0 AND User.Id > ?1")
    );
    assert_eq!(q.parameters.get(&ParamKey::Positional(0)), Some(&json!("alice")));
    assert_eq!(q.parameters.get(&ParamKey::Positional(1)), Some(&json!(30)));
}

#[test]
fn test_where_raw_string_substituted() {
    assert_eq!(
        where_text(json!({"where": "%1$s.Id > 5"})).as_deref(),
        Some("User.Id > 5")
    );
    // Unresolvable placeholders keep the text
    assert_eq!(
        where_text(json!({"where": "%9$s.Id > 5"})).as_deref(),
        Some("%9$s.Id > 5")
    );
}

#[test]
fn test_where_and_having_parameters_do_not_collide() {
    let q = compiler()
        .compile_json(
            &json!({
                "where": {"Name": "a"},
                "group": "Name",
                "having": [{"type": "gt", "field": "Id", "value": 3}]
            }),
            None,
        )
        .unwrap();
    assert_snapshot!(q.to_sql(Dialect::Dql), @r"
    SELECT
      User
    FROM App\Entity\User User
    WHERE User.Name = ?0
    GROUP BY User.Name
    HAVING User.Id > ?1
    ");
}

#[test]
fn test_existing_where_is_anded() {
    let c = compiler();
    let mut existing = c.new_query();
    existing.and_where(table_col("User", "Email").is_not_null());
    let q = c
        .compile_json(&json!({"where": {"Name": "a", "Email": "b"}}), Some(existing))
        .unwrap();
    assert_eq!(
        q.where_clause.as_ref().map(|e| e.to_text(Dialect::Dql)).as_deref(),
        Some("User.Email IS NOT NULL AND (User.Name = ?0 OR User.Email = ?1)")
    );
}

// =============================================================================
// ORDER / window / flags
// =============================================================================

#[test]
fn test_order_text() {
    let q = compiler()
        .compile(
            &Criteria::new().order(OrderClause::Text("Id DESC NULLS FIRST, Name".into())),
            None,
        )
        .unwrap();
    assert_eq!(
        q.order_by,
        vec![
            OrderByExpr {
                expr: table_col("User", "Id"),
                dir: SortDir::Desc,
                nulls: Some(NullsOrder::First),
            },
            OrderByExpr::asc(table_col("User", "Name")),
        ]
    );
}

#[test]
fn test_order_skips_unmapped_fields() {
    let q = compiler()
        .compile_json(
            &json!({"join": {"join": "Role", "alias": "r"}, "order": {"Nope": "ASC", "r.Name": "desc", "Ghost.Id": "ASC"}}),
            None,
        )
        .unwrap();
    assert_eq!(q.order_by, vec![OrderByExpr::desc(table_col("r", "Name"))]);
}

#[test]
fn test_limit_offset_and_clamp() {
    let options = CompilerOptions {
        max_limit: Some(100),
        ..CompilerOptions::default()
    };
    let q = compiler()
        .with_options(options)
        .compile_json(&json!({"limit": 500, "offset": "0"}), None)
        .unwrap();
    assert_eq!(q.limit_offset.limit, Some(100));
    assert_eq!(q.limit_offset.offset, None);
}

#[test]
fn test_cacheable() {
    let q = compiler().compile_json(&json!({"cache": true}), None).unwrap();
    assert!(q.cacheable);
    assert!(q.cache_key(Dialect::Dql).is_some());
}

#[test]
fn test_set_is_rejected_whatever_it_holds() {
    for criteria in [json!({"set": null}), json!({"combine": {"from": "Role"}}), json!({"set": []})] {
        assert_eq!(
            compiler().compile_json(&criteria, None).unwrap_err(),
            CriteriaError::Unsupported {
                clause: ClauseKind::Set
            }
        );
    }
}

#[test]
fn test_initials_alias_style() {
    let options = CompilerOptions {
        alias_style: AliasStyle::Initials,
        ..CompilerOptions::default()
    };
    let c = CriteriaCompiler::new(schema(), "App\\Entity\\User").with_options(options);
    let q = c.compile_json(&json!({"join": {"join": "Role"}, "where": {"Name": "x"}}), None).unwrap();
    assert_eq!(q.aliases(), vec![("u", "App\\Entity\\User"), ("r", "App\\Entity\\Role")]);
}

#[test]
fn test_full_query_postgres() {
    let q = compiler()
        .compile_json(
            &json!({
                "select": "User.Name",
                "join": {"join": "Role"},
                "where": {"Name": "demo"},
                "order": "Id DESC",
                "limit": 10,
                "offset": 20
            }),
            None,
        )
        .unwrap();
    assert_snapshot!(q.to_sql(Dialect::Postgres), @r#"
    SELECT
      "User".*,
      "User"."Name"
    FROM "User" "User"
    INNER JOIN "Role" "Role" ON "Role"."Id" = "User"."Id"
    WHERE "User"."Name" = $1
    ORDER BY "User"."Id" DESC
    LIMIT 10 OFFSET 20
    "#);
}
