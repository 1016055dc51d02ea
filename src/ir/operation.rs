//! Query Operation Tree.
//!
//! A lowered builder chain is a singly-linked list of operations rooted at
//! the terminal (or the data-definition op for mutations), each non-root
//! holding its `source`. Exactly one `From` sits at the deepest source of a
//! query chain; mutations have no source chain at all.

use super::expr::{AggregateFunction, Expression};

/// Pagination operand: an auto-coined literal or an external parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum CountOperand {
    Auto { name: String },
    Param { name: String, property: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Set operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

impl SetOpKind {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            SetOpKind::Union => "UNION",
            SetOpKind::Intersect => "INTERSECT",
            SetOpKind::Except => "EXCEPT",
        }
    }
}

/// Element terminal kinds (`first`, `single`, `last` and their OrDefault
/// variants; the driver enforces the exact-one check for `single`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
}

impl ElementKind {
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::FirstOrDefault => "firstOrDefault",
            Self::Single => "single",
            Self::SingleOrDefault => "singleOrDefault",
            Self::Last => "last",
            Self::LastOrDefault => "lastOrDefault",
        }
    }

    pub fn reverses_ordering(&self) -> bool {
        matches!(self, Self::Last | Self::LastOrDefault)
    }

    /// LIMIT emitted for the terminal: 2 for `single` so the driver can
    /// detect a second row, 1 otherwise.
    pub fn row_limit(&self) -> u8 {
        match self {
            Self::Single | Self::SingleOrDefault => 2,
            _ => 1,
        }
    }
}

/// Query operation node
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperation {
    From {
        table: String,
        schema: Option<String>,
    },
    Where {
        source: Box<QueryOperation>,
        predicate: Expression,
    },
    Select {
        source: Box<QueryOperation>,
        selector: Expression,
    },
    Distinct {
        source: Box<QueryOperation>,
    },
    OrderBy {
        source: Box<QueryOperation>,
        key: Expression,
        descending: bool,
    },
    ThenBy {
        source: Box<QueryOperation>,
        key: Expression,
        descending: bool,
    },
    Reverse {
        source: Box<QueryOperation>,
    },
    Take {
        source: Box<QueryOperation>,
        count: CountOperand,
    },
    Skip {
        source: Box<QueryOperation>,
        count: CountOperand,
    },
    GroupBy {
        source: Box<QueryOperation>,
        key: Expression,
    },
    Join {
        source: Box<QueryOperation>,
        inner: Box<QueryOperation>,
        outer_key: Expression,
        inner_key: Expression,
        result_selector: Expression,
        kind: JoinKind,
    },
    SetOp {
        source: Box<QueryOperation>,
        kind: SetOpKind,
        second: Box<QueryOperation>,
    },
    Count {
        source: Box<QueryOperation>,
        predicate: Option<Expression>,
    },
    /// Terminal sum/average/min/max
    Aggregate {
        source: Box<QueryOperation>,
        function: AggregateFunction,
        selector: Option<Expression>,
    },
    Element {
        source: Box<QueryOperation>,
        kind: ElementKind,
        predicate: Option<Expression>,
    },
    Any {
        source: Box<QueryOperation>,
        predicate: Option<Expression>,
    },
    All {
        source: Box<QueryOperation>,
        predicate: Expression,
    },
    Contains {
        source: Box<QueryOperation>,
        value: Expression,
    },
    ToArray {
        source: Box<QueryOperation>,
    },
    Insert {
        table: String,
        schema: Option<String>,
        values: Vec<(String, Expression)>,
        returning: Option<Expression>,
    },
    Update {
        table: String,
        schema: Option<String>,
        assignments: Vec<(String, Expression)>,
        predicate: Option<Expression>,
        allow_full_table: bool,
    },
    Delete {
        table: String,
        schema: Option<String>,
        predicate: Option<Expression>,
        allow_full_table: bool,
    },
}

impl QueryOperation {
    /// Returns the operation name as written in the builder DSL.
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::From { .. } => "from",
            Self::Where { .. } => "where",
            Self::Select { .. } => "select",
            Self::Distinct { .. } => "distinct",
            Self::OrderBy { .. } => "orderBy",
            Self::ThenBy { .. } => "thenBy",
            Self::Reverse { .. } => "reverse",
            Self::Take { .. } => "take",
            Self::Skip { .. } => "skip",
            Self::GroupBy { .. } => "groupBy",
            Self::Join { .. } => "join",
            Self::SetOp { kind, .. } => match kind {
                SetOpKind::Union => "union",
                SetOpKind::Intersect => "intersect",
                SetOpKind::Except => "except",
            },
            Self::Count { .. } => "count",
            Self::Aggregate { function, .. } => match function {
                AggregateFunction::Sum => "sum",
                AggregateFunction::Avg => "average",
                AggregateFunction::Min => "min",
                AggregateFunction::Max => "max",
                AggregateFunction::Count => "count",
            },
            Self::Element { kind, .. } => kind.method_name(),
            Self::Any { .. } => "any",
            Self::All { .. } => "all",
            Self::Contains { .. } => "contains",
            Self::ToArray { .. } => "toArray",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Source operation, when this op wraps one.
    pub fn source(&self) -> Option<&QueryOperation> {
        match self {
            Self::Where { source, .. }
            | Self::Select { source, .. }
            | Self::Distinct { source }
            | Self::OrderBy { source, .. }
            | Self::ThenBy { source, .. }
            | Self::Reverse { source }
            | Self::Take { source, .. }
            | Self::Skip { source, .. }
            | Self::GroupBy { source, .. }
            | Self::Join { source, .. }
            | Self::SetOp { source, .. }
            | Self::Count { source, .. }
            | Self::Aggregate { source, .. }
            | Self::Element { source, .. }
            | Self::Any { source, .. }
            | Self::All { source, .. }
            | Self::Contains { source, .. }
            | Self::ToArray { source } => Some(source),
            Self::From { .. } | Self::Insert { .. } | Self::Update { .. } | Self::Delete { .. } => {
                None
            }
        }
    }

    /// Terminal operations conclude a chain; nothing may wrap them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Count { .. }
                | Self::Aggregate { .. }
                | Self::Element { .. }
                | Self::Any { .. }
                | Self::All { .. }
                | Self::Contains { .. }
                | Self::ToArray { .. }
        )
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Insert { .. } | Self::Update { .. } | Self::Delete { .. }
        )
    }
}
