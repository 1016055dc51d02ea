//! # sqlinq
//!
//! A Rust-based query compiler that translates LINQ-style builder expressions
//! into parameterised SQL.
//!
//! The builder is supplied as source text: a chain of method calls with
//! arrow-function predicates and selectors. Compilation parses that text,
//! lowers it to a dialect-neutral operation tree (auto-parameterising every
//! embedded literal), and generates SQL plus a parameter map for a target
//! dialect. Execution is left entirely to the caller's database driver.
//!
//! ## Usage Example
//!
//! ```rust
//! use serde_json::json;
//! use sqlinq::{create_schema, postgres};
//!
//! let schema = create_schema();
//!
//! let statement = postgres::select_statement(
//!     &schema,
//!     "from(\"users\").where(u => u.isActive).count()",
//!     &json!({}),
//! )
//! .unwrap();
//!
//! assert_eq!(statement.sql, "SELECT COUNT(*) FROM \"users\" WHERE \"isActive\"");
//! assert!(statement.params.is_empty());
//! ```
//!
//! Plans are reusable: [`define_select`] compiles once (through a global
//! parse cache), and [`QueryPlan::finalize`] or the dialect `to_sql` helpers
//! bind fresh runtime parameters per execution.

pub mod cache;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod lowering;
pub mod parser;
pub mod plan;
pub mod postgres;
pub mod sql_generator;
pub mod sqlite;

// Re-export public API
pub use crate::cache::{
    clear_parse_cache, get_parse_cache_config, parse_cache_stats, set_parse_cache_config,
    ParseCacheConfig, ParseCacheStats,
};
pub use crate::error::{
    ConfigError, GenerationError, LexError, LoweringError, ParseError, QueryError, ShapeError,
};
pub use crate::plan::{
    create_schema, DatabaseSchema, QueryPlan, SqlStatement, StatementKind, StatementOptions,
};
pub use crate::sql_generator::{PostgreSqlDialect, SqlDialect, SqlGenerator, SqliteDialect};

use crate::error::QueryResult;

fn define(source: &str, expected: StatementKind) -> QueryResult<QueryPlan> {
    let lowered = cache::lower_cached(source)?;
    let found = StatementKind::of(&lowered.operation);
    if found != expected {
        return Err(ConfigError::StatementKindMismatch {
            expected: expected.name(),
            found: found.name(),
        }
        .into());
    }
    Ok(QueryPlan::new(lowered, expected))
}

/// Compiles a select builder into a reusable plan.
///
/// The schema handle carries no runtime state; it anchors the plan to a
/// database definition in user code.
pub fn define_select(_schema: &DatabaseSchema, builder: &str) -> QueryResult<QueryPlan> {
    define(builder, StatementKind::Select)
}

/// Compiles an insert builder (`insertInto(...).values(...)`) into a plan.
pub fn define_insert(_schema: &DatabaseSchema, builder: &str) -> QueryResult<QueryPlan> {
    define(builder, StatementKind::Insert)
}

/// Compiles an update builder (`update(...).set(...)`) into a plan.
pub fn define_update(_schema: &DatabaseSchema, builder: &str) -> QueryResult<QueryPlan> {
    define(builder, StatementKind::Update)
}

/// Compiles a delete builder (`deleteFrom(...)`) into a plan.
pub fn define_delete(_schema: &DatabaseSchema, builder: &str) -> QueryResult<QueryPlan> {
    define(builder, StatementKind::Delete)
}
