//! PostgreSQL statement surface.
//!
//! One-call helpers that compose `define_*` with the PostgreSQL generator.
//! Parameter placeholders use the pg-promise style `$(name)`.

use serde_json::Value;

use crate::error::QueryResult;
use crate::plan::{DatabaseSchema, QueryPlan, SqlStatement, StatementOptions};
use crate::sql_generator::{PostgreSqlDialect, SqlGenerator};
use crate::{define_delete, define_insert, define_select, define_update};

fn generator() -> SqlGenerator {
    SqlGenerator::new(Box::new(PostgreSqlDialect::new()))
}

/// Binds runtime parameters and renders PostgreSQL SQL for a plan.
pub fn to_sql(plan: &QueryPlan, params: &Value) -> QueryResult<SqlStatement> {
    generator().generate(plan, params)
}

/// Like [`to_sql`], invoking `options.on_sql` before returning.
pub fn to_sql_with_options(
    plan: &QueryPlan,
    params: &Value,
    options: &StatementOptions,
) -> QueryResult<SqlStatement> {
    generator().generate_with_options(plan, params, options)
}

/// Compiles and renders a select statement in one call.
pub fn select_statement(
    schema: &DatabaseSchema,
    builder: &str,
    params: &Value,
) -> QueryResult<SqlStatement> {
    to_sql(&define_select(schema, builder)?, params)
}

/// Compiles and renders an insert statement in one call.
pub fn insert_statement(
    schema: &DatabaseSchema,
    builder: &str,
    params: &Value,
) -> QueryResult<SqlStatement> {
    to_sql(&define_insert(schema, builder)?, params)
}

/// Compiles and renders an update statement in one call.
pub fn update_statement(
    schema: &DatabaseSchema,
    builder: &str,
    params: &Value,
) -> QueryResult<SqlStatement> {
    to_sql(&define_update(schema, builder)?, params)
}

/// Compiles and renders a delete statement in one call.
pub fn delete_statement(
    schema: &DatabaseSchema,
    builder: &str,
    params: &Value,
) -> QueryResult<SqlStatement> {
    to_sql(&define_delete(schema, builder)?, params)
}
