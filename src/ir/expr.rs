//! Expression IR.
//!
//! Dialect-neutral expression nodes produced by lowering. Literals that the
//! user embedded in predicates or selectors do not survive to this IR:
//! they are coined into auto-parameters, so a generated statement carries no
//! inline constants. Null literals are the one exception and get their own
//! node (they render as `IS NULL` / `IS NOT NULL`).

use serde_json::Value;

use crate::lexer::NumberValue;

/// Literal value types, as captured from the source before they become
/// auto-parameter values.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl LiteralValue {
    /// Converts the literal into the JSON value stored in a params map.
    pub fn to_json(&self) -> Value {
        match self {
            LiteralValue::String(s) => Value::String(s.clone()),
            LiteralValue::Int(n) => Value::from(*n),
            LiteralValue::Float(n) => Value::from(*n),
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Null => Value::Null,
        }
    }
}

impl From<NumberValue> for LiteralValue {
    fn from(value: NumberValue) -> Self {
        match value {
            NumberValue::Int(n) => LiteralValue::Int(n),
            NumberValue::Float(n) => LiteralValue::Float(n),
        }
    }
}

/// Comparison operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    In,
}

/// Arithmetic operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Logical operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Whitelisted string helper methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMethod {
    StartsWith,
    EndsWith,
    Includes,
    ToLowerCase,
    ToUpperCase,
    Trim,
}

impl StringMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "includes" => Some(Self::Includes),
            "toLowerCase" => Some(Self::ToLowerCase),
            "toUpperCase" => Some(Self::ToUpperCase),
            "trim" => Some(Self::Trim),
            _ => None,
        }
    }
}

/// Aggregate functions usable both as terminals and inside grouped
/// projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Expression IR node
///
/// `Column` paths may be dotted (`"u.name"` after a join projection); the
/// generator resolves them against its symbol table. The optional `source`
/// marks which side of a join result selector a reference came from
/// (0 = outer, 1 = inner).
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Inline null literal; the only literal that is not auto-parameterised
    Null,
    Column {
        path: String,
        source: Option<usize>,
    },
    /// A column used directly as a predicate (`where(x => x.isActive)`)
    BooleanColumn {
        path: String,
        source: Option<usize>,
    },
    /// External query parameter reference (`p.minAge`)
    Param {
        name: String,
        property: Option<String>,
    },
    /// Auto-coined parameter for an embedded literal (`__p1`)
    AutoParam {
        name: String,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// String concatenation (from `+` on strings and template literals)
    Concat {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Option<Box<Expression>>,
    },
    /// `??`, emitted as COALESCE
    Coalesce {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Ternary, emitted as CASE WHEN
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    StringMethod {
        method: StringMethod,
        object: Box<Expression>,
        args: Vec<Expression>,
    },
    /// Ordered projection shape
    Object {
        properties: Vec<(String, Expression)>,
    },
    /// Identity selector / whole-row reference
    AllColumns {
        source: Option<usize>,
    },
    /// Aggregate inside a grouped projection (`g.count()`, `g.sum(sel)`)
    Aggregate {
        function: AggregateFunction,
        selector: Option<Box<Expression>>,
    },
}

impl Expression {
    pub fn column(path: impl Into<String>) -> Self {
        Expression::Column {
            path: path.into(),
            source: None,
        }
    }

    /// True for nodes that already produce a boolean in SQL.
    pub fn is_predicate_shaped(&self) -> bool {
        matches!(
            self,
            Expression::Comparison { .. }
                | Expression::Logical { .. }
                | Expression::BooleanColumn { .. }
                | Expression::StringMethod {
                    method: StringMethod::StartsWith
                        | StringMethod::EndsWith
                        | StringMethod::Includes,
                    ..
                }
        )
    }
}
