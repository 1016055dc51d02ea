//! Error type definitions
//!
//! Defines all error types used in sqlinq.

use thiserror::Error;

/// Errors that occur during lexing (tokenization)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character: '{0}' (position: {1})")]
    UnexpectedCharacter(char, usize),

    #[error("Unterminated string literal (start position: {0})")]
    UnterminatedString(usize),

    #[error("Unterminated template literal (start position: {0})")]
    UnterminatedTemplate(usize),

    #[error("Invalid number format: '{0}' (position: {1})")]
    InvalidNumber(String, usize),

    #[error("Input is empty")]
    EmptyInput,
}

/// Errors that occur during parsing
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token: expected '{expected}' but found '{found}' (position: {position})")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Invalid arrow function parameter list (position: {0})")]
    InvalidArrowParameters(usize),

    #[error("Lexing error: {0}")]
    LexError(#[from] LexError),

    #[error("Unexpected end of input (position: {0})")]
    UnexpectedEof(usize),
}

/// Errors that occur while lowering the syntax tree to the query IR
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoweringError {
    #[error("Unsupported syntax: {construct} (position: {position})")]
    UnsupportedSyntax { construct: String, position: usize },

    #[error("Unknown identifier: '{name}' is not a row, parameter, or grouping binding (position: {position})")]
    UnknownIdentifier { name: String, position: usize },

    #[error("Unknown query method: '{method}' (position: {position})")]
    UnknownMethod { method: String, position: usize },

    #[error("Invalid arguments for '{helper}' (position: {position})")]
    InvalidHelperArguments { helper: String, position: usize },

    #[error("A query chain must start with from/insertInto/update/deleteFrom, found '{found}' (position: {position})")]
    InvalidChainRoot { found: String, position: usize },

    #[error("'{operation}' is a terminal operation and must end the chain")]
    TerminalNotLast { operation: String },

    #[error("'{operation}' is not valid in a {statement} chain")]
    InvalidMutationOperation {
        operation: String,
        statement: String,
    },

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Parsing error: {0}")]
    Parse(#[from] ParseError),
}

/// IR invariant violations, detected during lowering or generation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("'thenBy' requires a preceding 'orderBy'")]
    ThenByWithoutOrderBy,

    #[error("'{operation}' requires an explicit ordering; add 'orderBy' first")]
    LastWithoutOrderBy { operation: String },

    #[error("'key' is only available on a grouping; add 'groupBy' first")]
    GroupKeyOutsideGroupBy,

    #[error("Grouped projection '{name}' must use the group key or an aggregate")]
    InvalidGroupProjection { name: String },

    #[error("Group key has no property named '{property}'")]
    UnknownGroupKeyProperty { property: String },

    #[error("'insert' requires at least one column value")]
    EmptyInsert,

    #[error("'update' requires at least one assignment")]
    EmptyUpdate,
}

/// Errors that occur during SQL generation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Unsupported operation in '{dialect}' dialect: '{operation}'")]
    UnsupportedOperation { operation: String, dialect: String },

    #[error("Refusing to generate '{statement}' without a predicate; add 'where' or an explicit allow-full-table call")]
    UnsafeStatement { statement: String },

    #[error("'reverse' requires an ordering to invert")]
    ReverseWithoutOrderBy,

    #[error("'{function}' needs a selector or a preceding scalar projection")]
    AggregateNeedsScalar { function: String },

    #[error("'contains' needs a preceding scalar projection")]
    ContainsNeedsScalar,

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
}

/// Configuration and parameter-binding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Parse cache capacity must be at least 1")]
    InvalidCacheCapacity,

    #[error("Missing parameter: '{name}'")]
    MissingParameter { name: String },

    #[error("Unexpected parameter: '{name}'")]
    UnexpectedParameter { name: String },

    #[error("Parameters must be a JSON object")]
    InvalidParametersValue,

    #[error("Expected a {expected} statement but the builder produced {found}")]
    StatementKindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Unified error that can occur during the entire compilation process
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("Lexing error: {0}")]
    Lex(#[from] LexError),

    #[error("Parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error("Lowering error: {0}")]
    Lowering(#[from] LoweringError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("SQL generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type aliases
pub type LexResult<T> = Result<T, LexError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type LoweringResult<T> = Result<T, LoweringError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type QueryResult<T> = Result<T, QueryError>;
