//! SQL dialects.

use crate::ir::SetOpKind;

/// SQL dialect trait for database-specific SQL generation
///
/// The operation walk is shared between dialects; everything a target
/// database disagrees on — parameter placeholders, identifier quoting,
/// pagination, string concatenation, membership tests, compound-select
/// syntax — goes through this trait.
///
/// # Examples
///
/// ```rust
/// use sqlinq::sql_generator::{PostgreSqlDialect, SqliteDialect, SqlDialect};
///
/// let pg = PostgreSqlDialect::new();
/// let lite = SqliteDialect::new();
///
/// assert_eq!(pg.quote_identifier("name"), "\"name\"");
/// assert_eq!(pg.format_parameter("minAge"), "$(minAge)");
/// assert_eq!(lite.format_parameter("minAge"), "@minAge");
/// ```
pub trait SqlDialect {
    /// Dialect name for error messages.
    fn dialect_name(&self) -> &'static str;

    /// Quotes an identifier (table or column name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Renders a named parameter placeholder.
    ///
    /// The placeholder syntax is fixed per dialect; parameter values are
    /// never embedded in the SQL text.
    fn format_parameter(&self, name: &str) -> String;

    /// Generates string concatenation for two already-rendered operands.
    fn string_concat(&self, left: &str, right: &str) -> String;

    /// Renders a membership test of `member` against an array-valued
    /// parameter.
    fn membership_test(&self, member: &str, collection: &str) -> String;

    /// Renders the pagination clause for already-rendered operands, or
    /// `None` when neither limit nor offset is present.
    fn pagination_clause(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String>;

    /// Combines two complete SELECT statements with a set operation.
    fn compound_select(&self, left: &str, op: SetOpKind, right: &str) -> String;

    /// Whether the dialect supports `RETURNING` on mutations.
    fn supports_returning(&self) -> bool {
        true
    }

    /// Creates a boxed clone of this dialect.
    fn clone_box(&self) -> Box<dyn SqlDialect>;
}

/// PostgreSQL dialect implementation
///
/// Uses pg-promise style `$(name)` placeholders, double-quoted identifiers,
/// `||` concatenation, `= ANY(...)` membership, and parenthesised compound
/// selects.
#[derive(Debug, Clone)]
pub struct PostgreSqlDialect;

impl PostgreSqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgreSqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgreSqlDialect {
    fn dialect_name(&self) -> &'static str {
        "postgresql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    fn format_parameter(&self, name: &str) -> String {
        format!("$({name})")
    }

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("{left} || {right}")
    }

    fn membership_test(&self, member: &str, collection: &str) -> String {
        format!("{member} = ANY({collection})")
    }

    fn pagination_clause(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String> {
        match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            (None, Some(offset)) => Some(format!("OFFSET {offset}")),
            (None, None) => None,
        }
    }

    fn compound_select(&self, left: &str, op: SetOpKind, right: &str) -> String {
        format!("({left}) {} ({right})", op.sql_keyword())
    }

    fn clone_box(&self) -> Box<dyn SqlDialect> {
        Box::new(self.clone())
    }
}

/// SQLite dialect implementation
///
/// Uses `@name` placeholders and double-quoted identifiers. SQLite rejects
/// parenthesised compound-select operands, requires a LIMIT before OFFSET,
/// and has no array parameters — membership tests go through `json_each`.
#[derive(Debug, Clone)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SqliteDialect {
    fn dialect_name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{name}\"")
    }

    fn format_parameter(&self, name: &str) -> String {
        format!("@{name}")
    }

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("{left} || {right}")
    }

    fn membership_test(&self, member: &str, collection: &str) -> String {
        format!("{member} IN (SELECT \"value\" FROM json_each({collection}))")
    }

    fn pagination_clause(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String> {
        match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            // OFFSET is only valid after a LIMIT
            (None, Some(offset)) => Some(format!("LIMIT -1 OFFSET {offset}")),
            (None, None) => None,
        }
    }

    fn compound_select(&self, left: &str, op: SetOpKind, right: &str) -> String {
        format!("{left} {} {right}", op.sql_keyword())
    }

    fn clone_box(&self) -> Box<dyn SqlDialect> {
        Box::new(self.clone())
    }
}
