//! Tests for rendering compiled queries through each dialect.

use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use serde_json::json;
use sieve::sql::{
    lit_bool, lit_str, param, raw, table_col, CompiledQuery, ConditionType, Dialect, ExprExt,
    FromClause, Join, JoinKind, OrderByExpr, ParamKey, SqlDialect,
};

fn sample() -> CompiledQuery {
    let mut q = CompiledQuery::for_entity("App\\Entity\\User", "u");
    q.add_root(FromClause::new("App\\Entity\\Tag", "t").with_index_by("t.Id"));
    q.add_select(table_col("r", "Name"));
    q.add_join(Join {
        kind: JoinKind::Left,
        entity: "App\\Entity\\Role".into(),
        alias: "r".into(),
        condition_type: ConditionType::With,
        condition: Some(table_col("r", "Id").eq(table_col("u", "Id"))),
        index_by: None,
    });
    let name = q.bind(json!("demo"));
    let active = q.bind(json!(true));
    q.and_where(table_col("u", "Name").eq(sieve::sql::Expr::Param(name)))
        .and_where(table_col("u", "Active").eq(sieve::sql::Expr::Param(active)))
        .or_where(table_col("u", "Email").is_null());
    q.add_order_by(OrderByExpr::asc(table_col("u", "Name")).nulls_last())
        .set_distinct(true)
        .set_limit(Some(5));
    q
}

#[test]
fn test_dql() {
    assert_snapshot!(sample().to_sql(Dialect::Dql), @r"
    SELECT DISTINCT
      u,
      r.Name
    FROM App\Entity\User u, App\Entity\Tag t INDEX BY t.Id
    LEFT JOIN App\Entity\Role r WITH r.Id = u.Id
    WHERE (u.Name = ?0 AND u.Active = ?1) OR u.Email IS NULL
    ORDER BY u.Name ASC NULLS LAST
    ");
}

#[test]
fn test_postgres() {
    assert_snapshot!(sample().to_sql(Dialect::Postgres), @r#"
    SELECT DISTINCT
      "u".*,
      "r"."Name"
    FROM "User" "u", "Tag" "t"
    LEFT JOIN "Role" "r" ON "r"."Id" = "u"."Id"
    WHERE ("u"."Name" = $1 AND "u"."Active" = $2) OR "u"."Email" IS NULL
    ORDER BY "u"."Name" ASC NULLS LAST
    LIMIT 5
    "#);
}

#[test]
fn test_mysql() {
    assert_snapshot!(sample().to_sql(Dialect::MySql), @r"
    SELECT DISTINCT
      `u`.*,
      `r`.`Name`
    FROM `User` `u`, `Tag` `t`
    LEFT JOIN `Role` `r` ON `r`.`Id` = `u`.`Id`
    WHERE (`u`.`Name` = ? AND `u`.`Active` = ?) OR `u`.`Email` IS NULL
    ORDER BY `u`.`Name` ASC
    LIMIT 5
    ");
}

#[test]
fn test_empty_select_falls_back_to_roots() {
    let mut q = CompiledQuery::new();
    q.add_root(FromClause::new("User", "u"));
    assert_eq!(q.to_sql(Dialect::Dql), "SELECT\n  u\nFROM User u");
}

#[test]
fn test_literals_per_dialect() {
    let e = table_col("u", "Active").eq(lit_bool(true)).and(table_col("u", "Name").eq(lit_str("O'Neil")));
    assert_eq!(e.to_text(Dialect::Postgres), "\"u\".\"Active\" = TRUE AND \"u\".\"Name\" = 'O''Neil'");
    assert_eq!(e.to_text(Dialect::MySql), "`u`.`Active` = 1 AND `u`.`Name` = 'O''Neil'");
}

#[test]
fn test_raw_with_or_is_parenthesized() {
    let e = raw("u.Id = 1 OR u.Id = 2").and(table_col("u", "Name").is_not_null());
    assert_eq!(e.to_text(Dialect::Dql), "(u.Id = 1 OR u.Id = 2) AND u.Name IS NOT NULL");
}

#[test]
fn test_dialect_names() {
    for (text, dialect) in [("dql", Dialect::Dql), ("PG", Dialect::Postgres), ("mysql", Dialect::MySql)] {
        assert_eq!(text.parse::<Dialect>(), Ok(dialect));
    }
    assert!("oracle".parse::<Dialect>().is_err());
    assert_eq!(Dialect::Postgres.name(), "postgres");
}

#[test]
fn test_display_uses_dql() {
    let q = CompiledQuery::for_entity("User", "u");
    assert_eq!(q.to_string(), q.to_sql(Dialect::Dql));
}

/// HAVING bound before WHERE: the WHERE value is bound second but rendered first.
fn having_bound_first() -> CompiledQuery {
    let mut q = CompiledQuery::for_entity("App\\Entity\\User", "u");
    q.add_group_by(table_col("u", "Name"));
    let min = q.bind(json!(3));
    q.and_having(table_col("u", "Id").gt(param(min)));
    let name = q.bind(json!("demo"));
    q.and_where(
        table_col("u", "Name")
            .eq(param(name))
            .or(raw("u.Email = :email OR u.Id = ?0")),
    );
    q.parameters.set("email", json!("a@b.c"));
    q
}

#[test]
fn test_anonymous_placeholders_bind_in_text_order() {
    let q = having_bound_first();
    assert_eq!(
        q.bind_values(Dialect::MySql),
        vec![
            (ParamKey::Positional(1), json!("demo")),
            (ParamKey::from("email"), json!("a@b.c")),
            (ParamKey::Positional(0), json!(3)),
            (ParamKey::Positional(0), json!(3)),
        ]
    );
}

#[test]
fn test_keyed_placeholders_bind_as_stored() {
    let q = having_bound_first();
    assert_eq!(
        q.bind_values(Dialect::Postgres),
        vec![
            (ParamKey::Positional(0), json!(3)),
            (ParamKey::Positional(1), json!("demo")),
            (ParamKey::from("email"), json!("a@b.c")),
        ]
    );
    assert!(!Dialect::Postgres.anonymous_parameters());
    assert!(Dialect::MySql.anonymous_parameters());
}
