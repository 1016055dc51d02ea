//! Lowering scopes and auto-parameter coining.
//!
//! A builder function introduces parameters in three disjoint categories:
//! the table row parameter (`x` in `where(x => ...)`), external query
//! parameters (`p` in `(q, p) => ...`), and the grouping parameter (`g` in a
//! `select` after `groupBy`). Resolution of a bare identifier consults these
//! sets; anything unresolved is an error rather than a captured closure.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::ir::Expression;

/// Per-plan auto-parameter counter and value store.
///
/// Names are coined `__p1`, `__p2`, ... in lowering order, which is
/// deterministic for a given source text.
#[derive(Debug, Default)]
pub struct AutoParams {
    counter: u32,
    values: BTreeMap<String, Value>,
}

impl AutoParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coins a fresh auto-parameter holding `value` and returns its name.
    pub fn coin(&mut self, value: Value) -> String {
        self.counter += 1;
        let name = format!("__p{}", self.counter);
        self.values.insert(name.clone(), value);
        name
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

/// Shared state threaded through one plan's lowering.
#[derive(Debug)]
pub struct LoweringContext {
    pub auto: AutoParams,
    /// Property names accessed off external query parameters.
    pub declared: BTreeSet<String>,
    /// Names bound by the outer lambda (query context and parameter objects).
    pub query_params: BTreeSet<String>,
}

impl LoweringContext {
    pub fn new(outer_params: Vec<String>) -> Self {
        Self {
            auto: AutoParams::new(),
            declared: BTreeSet::new(),
            query_params: outer_params.into_iter().collect(),
        }
    }
}

/// What a bare identifier resolves to inside a lambda body.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A row parameter; the side index distinguishes join result-selector
    /// parameters (0 = outer, 1 = inner).
    Row { side: Option<usize> },
    Query,
    Group,
}

/// The lambda-local name environment for one lowering call.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    row_params: Vec<(String, Option<usize>)>,
    group_param: Option<String>,
    group_key: Option<Expression>,
}

impl Scope {
    /// A scope with no row bindings (insert values, take/skip operands).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A scope binding each lambda parameter as a row over the current shape.
    pub fn rows(params: &[String]) -> Self {
        let sided = params.len() > 1;
        Self {
            row_params: params
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), sided.then_some(i)))
                .collect(),
            group_param: None,
            group_key: None,
        }
    }

    /// A scope binding the single lambda parameter as a grouping.
    pub fn group(param: &str, key: Expression) -> Self {
        Self {
            row_params: Vec::new(),
            group_param: Some(param.to_string()),
            group_key: Some(key),
        }
    }

    pub fn group_key(&self) -> Option<&Expression> {
        self.group_key.as_ref()
    }

    /// Resolves an identifier against row, group, then query bindings.
    pub fn lookup(&self, name: &str, ctx: &LoweringContext) -> Option<Binding> {
        if let Some((_, side)) = self.row_params.iter().find(|(n, _)| n == name) {
            return Some(Binding::Row { side: *side });
        }
        if self.group_param.as_deref() == Some(name) {
            return Some(Binding::Group);
        }
        if ctx.query_params.contains(name) {
            return Some(Binding::Query);
        }
        None
    }
}
