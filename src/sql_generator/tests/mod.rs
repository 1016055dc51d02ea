use super::*;
use crate::error::{GenerationError, QueryError};
use crate::lowering::lower_source;
use crate::plan::{QueryPlan, StatementKind};
use serde_json::{json, Value};
use std::sync::Arc;

fn plan(source: &str) -> QueryPlan {
    let lowered = Arc::new(lower_source(source).unwrap());
    let kind = StatementKind::of(&lowered.operation);
    QueryPlan::new(lowered, kind)
}

fn pg_sql(source: &str, params: Value) -> String {
    SqlGenerator::new(Box::new(PostgreSqlDialect::new()))
        .generate(&plan(source), &params)
        .unwrap()
        .sql
}

fn sqlite_sql(source: &str, params: Value) -> String {
    SqlGenerator::new(Box::new(SqliteDialect::new()))
        .generate(&plan(source), &params)
        .unwrap()
        .sql
}

fn pg_error(source: &str, params: Value) -> QueryError {
    SqlGenerator::new(Box::new(PostgreSqlDialect::new()))
        .generate(&plan(source), &params)
        .unwrap_err()
}

// ===== SQL Dialect Tests =====

mod dialect_tests {
    use super::*;
    use crate::ir::SetOpKind;

    #[test]
    fn test_postgresql_identifier_quoting() {
        let dialect = PostgreSqlDialect::new();
        assert_eq!(dialect.quote_identifier("test"), "\"test\"");
        assert_eq!(dialect.quote_identifier("CamelCase"), "\"CamelCase\"");
    }

    #[test]
    fn test_postgresql_parameter_format() {
        let dialect = PostgreSqlDialect::new();
        assert_eq!(dialect.format_parameter("minAge"), "$(minAge)");
        assert_eq!(dialect.format_parameter("__p1"), "$(__p1)");
    }

    #[test]
    fn test_sqlite_parameter_format() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.format_parameter("minAge"), "@minAge");
    }

    #[test]
    fn test_string_concat() {
        let pg = PostgreSqlDialect::new();
        let lite = SqliteDialect::new();
        assert_eq!(pg.string_concat("a", "b"), "a || b");
        assert_eq!(lite.string_concat("a", "b"), "a || b");
    }

    #[test]
    fn test_membership_test_diverges() {
        let pg = PostgreSqlDialect::new();
        let lite = SqliteDialect::new();
        assert_eq!(pg.membership_test("\"id\"", "$(ids)"), "\"id\" = ANY($(ids))");
        assert_eq!(
            lite.membership_test("\"id\"", "@ids"),
            "\"id\" IN (SELECT \"value\" FROM json_each(@ids))"
        );
    }

    #[test]
    fn test_pagination_clauses() {
        let pg = PostgreSqlDialect::new();
        let lite = SqliteDialect::new();

        assert_eq!(
            pg.pagination_clause(Some("$(__p1)"), None),
            Some("LIMIT $(__p1)".to_string())
        );
        assert_eq!(
            pg.pagination_clause(None, Some("$(__p1)")),
            Some("OFFSET $(__p1)".to_string())
        );
        // SQLite cannot express OFFSET without a LIMIT.
        assert_eq!(
            lite.pagination_clause(None, Some("@__p1")),
            Some("LIMIT -1 OFFSET @__p1".to_string())
        );
        assert_eq!(pg.pagination_clause(None, None), None);
    }

    #[test]
    fn test_compound_select_parentheses() {
        let pg = PostgreSqlDialect::new();
        let lite = SqliteDialect::new();
        assert_eq!(
            pg.compound_select("SELECT 1", SetOpKind::Union, "SELECT 2"),
            "(SELECT 1) UNION (SELECT 2)"
        );
        assert_eq!(
            lite.compound_select("SELECT 1", SetOpKind::Except, "SELECT 2"),
            "SELECT 1 EXCEPT SELECT 2"
        );
    }
}

// ===== Generation Tests =====

#[test]
fn test_plain_from_selects_star() {
    assert_eq!(
        pg_sql("from(\"users\").toArray()", json!({})),
        "SELECT * FROM \"users\""
    );
}

#[test]
fn test_schema_qualified_table() {
    assert_eq!(
        pg_sql("from(\"users\", \"app\").count()", json!({})),
        "SELECT COUNT(*) FROM \"app\".\"users\""
    );
}

#[test]
fn test_where_combines_with_and() {
    assert_eq!(
        pg_sql(
            "from(\"users\").where(x => x.age > 18).where(x => x.isActive)",
            json!({})
        ),
        "SELECT * FROM \"users\" WHERE \"age\" > $(__p1) AND \"isActive\""
    );
}

#[test]
fn test_order_by_then_by() {
    assert_eq!(
        pg_sql(
            "from(\"users\").orderBy(x => x.lastName).thenByDescending(x => x.age)",
            json!({})
        ),
        "SELECT * FROM \"users\" ORDER BY \"lastName\" ASC, \"age\" DESC"
    );
}

#[test]
fn test_second_order_by_replaces_first() {
    assert_eq!(
        pg_sql(
            "from(\"users\").orderBy(x => x.lastName).orderBy(x => x.age)",
            json!({})
        ),
        "SELECT * FROM \"users\" ORDER BY \"age\" ASC"
    );
}

#[test]
fn test_reverse_flips_directions() {
    assert_eq!(
        pg_sql(
            "from(\"users\").orderBy(x => x.a).thenByDescending(x => x.b).reverse()",
            json!({})
        ),
        "SELECT * FROM \"users\" ORDER BY \"a\" DESC, \"b\" ASC"
    );
}

#[test]
fn test_reverse_twice_is_identity() {
    let once = pg_sql("from(\"t\").orderBy(x => x.a)", json!({}));
    let twice = pg_sql("from(\"t\").orderBy(x => x.a).reverse().reverse()", json!({}));
    assert_eq!(once, twice);
}

#[test]
fn test_reverse_without_order_fails() {
    let err = pg_error("from(\"users\").reverse()", json!({}));
    assert!(matches!(
        err,
        QueryError::Generation(GenerationError::ReverseWithoutOrderBy)
    ));
}

#[test]
fn test_take_and_skip_parameterised() {
    assert_eq!(
        pg_sql("from(\"users\").skip(20).take(10)", json!({})),
        "SELECT * FROM \"users\" LIMIT $(__p2) OFFSET $(__p1)"
    );
    assert_eq!(
        sqlite_sql("from(\"users\").skip(20)", json!({})),
        "SELECT * FROM \"users\" LIMIT -1 OFFSET @__p1"
    );
}

#[test]
fn test_first_and_single_limits() {
    assert_eq!(
        pg_sql("from(\"users\").first()", json!({})),
        "SELECT * FROM \"users\" LIMIT 1"
    );
    assert_eq!(
        pg_sql("from(\"users\").single()", json!({})),
        "SELECT * FROM \"users\" LIMIT 2"
    );
}

#[test]
fn test_first_with_predicate() {
    assert_eq!(
        pg_sql("from(\"users\").first(x => x.age > 18)", json!({})),
        "SELECT * FROM \"users\" WHERE \"age\" > $(__p1) LIMIT 1"
    );
}

#[test]
fn test_last_reverses_ordering() {
    assert_eq!(
        pg_sql("from(\"users\").orderBy(x => x.id).last()", json!({})),
        "SELECT * FROM \"users\" ORDER BY \"id\" DESC LIMIT 1"
    );
}

#[test]
fn test_any_wraps_exists_with_predicate() {
    assert_eq!(
        pg_sql("from(\"users\").any(x => x.isAdmin)", json!({})),
        "SELECT EXISTS (SELECT 1 FROM \"users\" WHERE \"isAdmin\")"
    );
}

#[test]
fn test_any_without_predicate() {
    assert_eq!(
        pg_sql("from(\"users\").any()", json!({})),
        "SELECT EXISTS (SELECT 1 FROM \"users\")"
    );
}

#[test]
fn test_all_preserves_inner_predicate() {
    assert_eq!(
        pg_sql("from(\"users\").all(x => x.age >= 18)", json!({})),
        "SELECT NOT EXISTS (SELECT 1 FROM \"users\" WHERE NOT (\"age\" >= $(__p1)))"
    );
}

#[test]
fn test_contains_uses_scalar_projection() {
    assert_eq!(
        pg_sql("from(\"users\").select(x => x.id).contains(5)", json!({})),
        "SELECT EXISTS (SELECT 1 FROM \"users\" WHERE \"id\" = $(__p1))"
    );
}

#[test]
fn test_contains_without_scalar_fails() {
    let err = pg_error("from(\"users\").contains(5)", json!({}));
    assert!(matches!(
        err,
        QueryError::Generation(GenerationError::ContainsNeedsScalar)
    ));
}

#[test]
fn test_aggregate_with_selector() {
    assert_eq!(
        pg_sql("from(\"orders\").sum(x => x.amount)", json!({})),
        "SELECT SUM(\"amount\") FROM \"orders\""
    );
    assert_eq!(
        pg_sql("from(\"orders\").average(x => x.amount)", json!({})),
        "SELECT AVG(\"amount\") FROM \"orders\""
    );
}

#[test]
fn test_aggregate_over_scalar_projection() {
    assert_eq!(
        pg_sql("from(\"orders\").select(x => x.amount).max()", json!({})),
        "SELECT MAX(\"amount\") FROM \"orders\""
    );
}

#[test]
fn test_aggregate_without_scalar_fails() {
    let err = pg_error("from(\"orders\").sum()", json!({}));
    assert!(matches!(
        err,
        QueryError::Generation(GenerationError::AggregateNeedsScalar { .. })
    ));
}

#[test]
fn test_group_by_with_aggregates() {
    assert_eq!(
        pg_sql(
            "from(\"orders\").groupBy(x => x.category).select(g => ({cat: g.key, n: g.count(), total: g.sum(x => x.amount)}))",
            json!({})
        ),
        "SELECT \"category\" AS \"cat\", COUNT(*) AS \"n\", SUM(\"amount\") AS \"total\" FROM \"orders\" GROUP BY \"category\""
    );
}

#[test]
fn test_predicate_after_group_by_emits_having() {
    assert_eq!(
        pg_sql(
            "from(\"orders\").groupBy(x => x.category).where(g => g.count() > 5).select(g => ({cat: g.key}))",
            json!({})
        ),
        "SELECT \"category\" AS \"cat\" FROM \"orders\" GROUP BY \"category\" HAVING COUNT(*) > $(__p1)"
    );
}

#[test]
fn test_join_aliases_and_resolves_shape() {
    assert_eq!(
        pg_sql(
            "from(\"users\").join(from(\"orders\"), u => u.id, o => o.userId, (u, o) => ({name: u.name, total: o.total})).where(r => r.total > 100)",
            json!({})
        ),
        "SELECT t0.\"name\" AS \"name\", t1.\"total\" AS \"total\" FROM \"users\" AS t0 INNER JOIN \"orders\" AS t1 ON t0.\"id\" = t1.\"userId\" WHERE t1.\"total\" > $(__p1)"
    );
}

#[test]
fn test_left_join_keyword() {
    let sql = pg_sql(
        "from(\"users\").leftJoin(from(\"orders\"), u => u.id, o => o.userId, (u, o) => ({u, o}))",
        json!({}),
    );
    assert!(sql.contains("LEFT JOIN \"orders\" AS t1 ON t0.\"id\" = t1.\"userId\""));
    assert!(sql.starts_with("SELECT t0.*, t1.* FROM \"users\" AS t0"));
}

#[test]
fn test_whole_row_shapes_survive_into_later_lookups() {
    assert_eq!(
        pg_sql(
            "from(\"users\").join(from(\"orders\"), u => u.id, o => o.userId, (u, o) => ({u, o})).where(x => x.o.total > 100).select(x => ({name: x.u.name}))",
            json!({})
        ),
        "SELECT t0.\"name\" AS \"name\" FROM \"users\" AS t0 INNER JOIN \"orders\" AS t1 ON t0.\"id\" = t1.\"userId\" WHERE t1.\"total\" > $(__p1)"
    );
}

#[test]
fn test_union_merges_and_orders() {
    assert_eq!(
        pg_sql(
            "from(\"a\").select(x => x.id).union(from(\"b\").select(x => x.id)).orderBy(x => x.id)",
            json!({})
        ),
        "(SELECT \"id\" FROM \"a\") UNION (SELECT \"id\" FROM \"b\") ORDER BY \"id\" ASC"
    );
    assert_eq!(
        sqlite_sql(
            "from(\"a\").select(x => x.id).intersect(from(\"b\").select(x => x.id))",
            json!({})
        ),
        "SELECT \"id\" FROM \"a\" INTERSECT SELECT \"id\" FROM \"b\""
    );
}

#[test]
fn test_unknown_column_path_quotes_verbatim() {
    // A projection that renames the shape: later references to the original
    // name fall back to verbatim quoting.
    let sql = pg_sql(
        "from(\"users\").select(x => ({id: x.id})).orderBy(x => x.missing)",
        json!({}),
    );
    assert!(sql.contains("ORDER BY \"missing\" ASC"));
}

#[test]
fn test_unsafe_update_is_rejected() {
    let err = pg_error("update(\"users\").set(x => ({name: \"x\"}))", json!({}));
    assert!(matches!(
        err,
        QueryError::Generation(GenerationError::UnsafeStatement { ref statement }) if statement == "update"
    ));
}

#[test]
fn test_unsafe_delete_is_rejected() {
    let err = pg_error("deleteFrom(\"users\")", json!({}));
    assert!(matches!(
        err,
        QueryError::Generation(GenerationError::UnsafeStatement { ref statement }) if statement == "delete"
    ));
}

#[test]
fn test_allow_full_table_update() {
    assert_eq!(
        pg_sql(
            "update(\"users\").set(x => ({active: false})).allowFullTableUpdate()",
            json!({})
        ),
        "UPDATE \"users\" SET \"active\" = $(__p1)"
    );
}

#[test]
fn test_insert_with_returning_star() {
    assert_eq!(
        pg_sql(
            "insertInto(\"users\").values({name: \"Ann\", age: 30}).returning(x => x)",
            json!({})
        ),
        "INSERT INTO \"users\" (\"name\", \"age\") VALUES ($(__p1), $(__p2)) RETURNING *"
    );
}

#[test]
fn test_insert_returning_columns() {
    assert_eq!(
        pg_sql(
            "insertInto(\"users\").values({name: \"Ann\"}).returning(x => ({id: x.id}))",
            json!({})
        ),
        "INSERT INTO \"users\" (\"name\") VALUES ($(__p1)) RETURNING \"id\" AS \"id\""
    );
}

#[test]
fn test_update_with_row_reference_in_assignment() {
    assert_eq!(
        pg_sql(
            "(p) => update(\"counters\").set(x => ({value: x.value + 1})).where(x => x.name == p.name)",
            json!({"name": "visits"})
        ),
        "UPDATE \"counters\" SET \"value\" = \"value\" + $(__p1) WHERE \"name\" = $(name)"
    );
}

#[test]
fn test_delete_with_predicate() {
    assert_eq!(
        sqlite_sql(
            "(p) => deleteFrom(\"sessions\").where(x => x.expiresAt < p.now)",
            json!({"now": 1700000000})
        ),
        "DELETE FROM \"sessions\" WHERE \"expiresAt\" < @now"
    );
}

#[test]
fn test_null_comparisons() {
    assert_eq!(
        pg_sql("from(\"users\").where(x => x.deletedAt == null)", json!({})),
        "SELECT * FROM \"users\" WHERE \"deletedAt\" IS NULL"
    );
    assert_eq!(
        pg_sql("from(\"users\").where(x => x.deletedAt != null)", json!({})),
        "SELECT * FROM \"users\" WHERE \"deletedAt\" IS NOT NULL"
    );
}

#[test]
fn test_coalesce_and_case() {
    assert_eq!(
        pg_sql(
            "from(\"orders\").where(o => (o.priority ?? 5) < 3)",
            json!({})
        ),
        "SELECT * FROM \"orders\" WHERE COALESCE(\"priority\", $(__p1)) < $(__p2)"
    );
    assert_eq!(
        pg_sql(
            "from(\"users\").select(x => x.age >= 18 ? x.adultRate : x.minorRate)",
            json!({})
        ),
        "SELECT CASE WHEN \"age\" >= $(__p1) THEN \"adultRate\" ELSE \"minorRate\" END FROM \"users\""
    );
}

#[test]
fn test_membership_generation_diverges_by_dialect() {
    assert_eq!(
        pg_sql(
            "(p) => from(\"users\").where(x => p.ids.includes(x.id))",
            json!({"ids": [1, 2]})
        ),
        "SELECT * FROM \"users\" WHERE \"id\" = ANY($(ids))"
    );
    assert_eq!(
        sqlite_sql(
            "(p) => from(\"users\").where(x => p.ids.includes(x.id))",
            json!({"ids": [1, 2]})
        ),
        "SELECT * FROM \"users\" WHERE \"id\" IN (SELECT \"value\" FROM json_each(@ids))"
    );
}

#[test]
fn test_string_helper_with_parameter_argument() {
    assert_eq!(
        pg_sql(
            "(p) => from(\"users\").where(x => x.name.startsWith(p.prefix))",
            json!({"prefix": "A"})
        ),
        "SELECT * FROM \"users\" WHERE \"name\" LIKE $(prefix) || '%'"
    );
}

#[test]
fn test_string_functions() {
    assert_eq!(
        pg_sql("from(\"users\").select(x => x.name.toUpperCase())", json!({})),
        "SELECT UPPER(\"name\") FROM \"users\""
    );
    assert_eq!(
        pg_sql("from(\"users\").where(x => x.name.trim() == \"x\")", json!({})),
        "SELECT * FROM \"users\" WHERE TRIM(\"name\") = $(__p1)"
    );
}

#[test]
fn test_concat_uses_dialect_operator() {
    assert_eq!(
        pg_sql("from(\"users\").select(x => `${x.first} ${x.last}`)", json!({})),
        "SELECT \"first\" || $(__p1) || \"last\" FROM \"users\""
    );
}

#[test]
fn test_arithmetic_parentheses_on_mixed_precedence() {
    assert_eq!(
        pg_sql(
            "from(\"items\").select(x => (x.a + x.b) * x.c)",
            json!({})
        ),
        "SELECT (\"a\" + \"b\") * \"c\" FROM \"items\""
    );
}

#[test]
fn test_on_sql_callback_fires_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    let calls = StdArc::new(AtomicUsize::new(0));
    let seen = StdArc::clone(&calls);
    let options = crate::plan::StatementOptions::with_on_sql(move |statement| {
        assert!(statement.sql.starts_with("SELECT"));
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let generator = SqlGenerator::new(Box::new(PostgreSqlDialect::new()));
    generator
        .generate_with_options(&plan("from(\"users\").count()"), &json!({}), &options)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
