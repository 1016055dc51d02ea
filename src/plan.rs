//! Plan handles.
//!
//! A `QueryPlan` is created once per `define_*` call and holds the lowered
//! operation tree, the auto-coined parameters, and the set of declared
//! external parameter names. `finalize` merges runtime parameters without
//! re-parsing anything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigError, QueryResult};
use crate::ir::QueryOperation;
use crate::lowering::LoweredQuery;

/// Opaque schema handle.
///
/// Exists to anchor `define_*` calls to a database definition in user code;
/// it carries no runtime state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseSchema;

/// Creates a schema handle.
pub fn create_schema() -> DatabaseSchema {
    DatabaseSchema
}

/// What kind of statement a plan produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// The statement kind a lowered root operation belongs to.
    pub(crate) fn of(operation: &QueryOperation) -> Self {
        match operation {
            QueryOperation::Insert { .. } => Self::Insert,
            QueryOperation::Update { .. } => Self::Update,
            QueryOperation::Delete { .. } => Self::Delete,
            _ => Self::Select,
        }
    }
}

/// A compiled query plan: build once, finalize per execution.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    lowered: Arc<LoweredQuery>,
    kind: StatementKind,
}

impl QueryPlan {
    pub(crate) fn new(lowered: Arc<LoweredQuery>, kind: StatementKind) -> Self {
        Self { lowered, kind }
    }

    pub fn operation(&self) -> &QueryOperation {
        &self.lowered.operation
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Parameters coined for embedded literals during lowering.
    pub fn auto_params(&self) -> &BTreeMap<String, Value> {
        &self.lowered.auto_params
    }

    /// External parameter names the builder referenced.
    pub fn declared_params(&self) -> &BTreeSet<String> {
        &self.lowered.declared_params
    }

    /// Merges runtime parameters with the plan's auto-parameters.
    ///
    /// The union of the result's keys is exactly `auto ∪ declared`: a missing
    /// declared name or a stray user key is a `ConfigError`.
    pub fn finalize(&self, user_params: &Value) -> QueryResult<FinalizedPlan<'_>> {
        let user: BTreeMap<String, Value> = match user_params {
            Value::Null => BTreeMap::new(),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => return Err(ConfigError::InvalidParametersValue.into()),
        };

        for name in self.declared_params() {
            if !user.contains_key(name) {
                return Err(ConfigError::MissingParameter { name: name.clone() }.into());
            }
        }
        for name in user.keys() {
            if !self.declared_params().contains(name) {
                return Err(ConfigError::UnexpectedParameter { name: name.clone() }.into());
            }
        }

        let mut params = self.auto_params().clone();
        params.extend(user);

        Ok(FinalizedPlan {
            operation: self.operation(),
            params,
        })
    }
}

/// A plan bound to runtime parameters, ready for SQL generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedPlan<'a> {
    pub operation: &'a QueryOperation,
    pub params: BTreeMap<String, Value>,
}

/// The generated statement handed to a database driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: BTreeMap<String, Value>,
}

/// Per-call generation options.
#[derive(Default)]
pub struct StatementOptions {
    /// Invoked once with the generated statement immediately before it is
    /// returned; intended for logging and tests.
    pub on_sql: Option<Box<dyn Fn(&SqlStatement) + Send + Sync>>,
}

impl StatementOptions {
    pub fn with_on_sql(callback: impl Fn(&SqlStatement) + Send + Sync + 'static) -> Self {
        Self {
            on_sql: Some(Box::new(callback)),
        }
    }
}

impl std::fmt::Debug for StatementOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementOptions")
            .field("on_sql", &self.on_sql.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
