//! Operation lowering.
//!
//! Unrolls the outermost call chain of a builder function into its method
//! links, then folds a visitor over them from the root (`from`, `insertInto`,
//! `update`, `deleteFrom`) outward, producing the Query Operation Tree.
//! Sub-chains (join sources, set-operation operands) recurse through the same
//! pipeline and share the plan's auto-parameter counter.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{LoweringError, LoweringResult, ShapeError};
use crate::ir::{
    AggregateFunction, CountOperand, ElementKind, Expression, JoinKind, LogicalOp, QueryOperation,
    SetOpKind,
};
use crate::lexer::Lexer;
use crate::parser::{Node, NodeKind, Parser};

use super::expression::{lower_expression, lower_predicate};
use super::scope::{LoweringContext, Scope};

/// The result of lowering one builder function.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredQuery {
    pub operation: QueryOperation,
    pub auto_params: BTreeMap<String, Value>,
    pub declared_params: BTreeSet<String>,
}

/// Parses and lowers a builder function source text.
pub fn lower_source(source: &str) -> LoweringResult<LoweredQuery> {
    let mut parser = Parser::new(Lexer::new(source)).map_err(LoweringError::from)?;
    let root = parser.parse()?;

    // The outer lambda's parameters are the query context and external
    // parameter objects; a bare chain has neither.
    let (outer_params, chain) = match root.kind {
        NodeKind::ArrowFunction { params, body } => (params, *body),
        _ => (Vec::new(), root),
    };

    let mut ctx = LoweringContext::new(outer_params);
    let operation = lower_chain(&chain, &mut ctx)?;

    Ok(LoweredQuery {
        operation,
        auto_params: ctx.auto.into_values(),
        declared_params: ctx.declared,
    })
}

struct ChainLink<'a> {
    method: &'a str,
    args: &'a [Node],
    offset: usize,
}

fn is_root_method(name: &str) -> bool {
    matches!(name, "from" | "insertInto" | "update" | "deleteFrom" | "delete")
}

/// Lowers a call chain (the whole builder body, a join source, or a
/// set-operation operand).
pub(crate) fn lower_chain(
    node: &Node,
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    let links = unroll_chain(node, ctx)?;
    let (root, rest) = links.split_first().expect("unroll yields at least the root");

    match root.method {
        "from" => lower_query_chain(root, rest, ctx),
        "insertInto" => lower_insert_chain(root, rest, ctx),
        "update" => lower_update_chain(root, rest, ctx),
        "deleteFrom" | "delete" => lower_delete_chain(root, rest, ctx),
        _ => unreachable!("unroll_chain only accepts known roots"),
    }
}

/// Unrolls the rightmost-outermost call expression into root-first links.
fn unroll_chain<'a>(
    node: &'a Node,
    ctx: &LoweringContext,
) -> LoweringResult<Vec<ChainLink<'a>>> {
    let mut links = Vec::new();
    let mut current = node;

    loop {
        match &current.kind {
            NodeKind::Call { callee, args } => match &callee.kind {
                NodeKind::Identifier(name) => {
                    if is_root_method(name) {
                        links.push(ChainLink {
                            method: name.as_str(),
                            args,
                            offset: current.offset,
                        });
                        break;
                    }
                    return Err(LoweringError::InvalidChainRoot {
                        found: name.clone(),
                        position: current.offset,
                    });
                }
                NodeKind::Member { object, property } => {
                    // `q.from(...)` roots the chain when `q` is an outer
                    // lambda parameter (the query context object).
                    if let NodeKind::Identifier(base) = &object.kind {
                        if is_root_method(property) && ctx.query_params.contains(base) {
                            links.push(ChainLink {
                                method: property.as_str(),
                                args,
                                offset: current.offset,
                            });
                            break;
                        }
                    }
                    links.push(ChainLink {
                        method: property.as_str(),
                        args,
                        offset: current.offset,
                    });
                    current = object;
                }
                _ => {
                    return Err(LoweringError::InvalidChainRoot {
                        found: callee.kind_name().to_string(),
                        position: callee.offset,
                    })
                }
            },
            _ => {
                return Err(LoweringError::InvalidChainRoot {
                    found: current.kind_name().to_string(),
                    position: current.offset,
                })
            }
        }
    }

    links.reverse();
    Ok(links)
}

/// Extracts `(table, schema?)` from a root call's arguments, skipping a
/// leading database-handle identifier when present.
fn table_arguments(link: &ChainLink) -> LoweringResult<(String, Option<String>)> {
    let mut strings = link.args.iter().filter_map(|arg| match &arg.kind {
        NodeKind::StringLiteral(s) => Some(s.clone()),
        _ => None,
    });

    let table = strings.next().ok_or(LoweringError::InvalidHelperArguments {
        helper: link.method.to_string(),
        position: link.offset,
    })?;
    Ok((table, strings.next()))
}

fn lambda_parts(node: &Node) -> Option<(&[String], &Node)> {
    match &node.kind {
        NodeKind::ArrowFunction { params, body } => Some((params.as_slice(), body.as_ref())),
        _ => None,
    }
}

fn expect_lambda<'a>(link: &ChainLink<'a>, index: usize) -> LoweringResult<(&'a [String], &'a Node)> {
    link.args
        .get(index)
        .and_then(lambda_parts)
        .ok_or(LoweringError::InvalidHelperArguments {
            helper: link.method.to_string(),
            position: link.offset,
        })
}

/// Builds the lambda scope for the current chain position: a grouping scope
/// while a `groupBy` is awaiting its projection, a row scope otherwise.
fn chain_scope(params: &[String], group: &Option<Expression>) -> Scope {
    match (group, params) {
        (Some(key), [param]) => Scope::group(param, key.clone()),
        _ => Scope::rows(params),
    }
}

fn optional_predicate(
    link: &ChainLink,
    group: &Option<Expression>,
    ctx: &mut LoweringContext,
) -> LoweringResult<Option<Expression>> {
    match link.args.first() {
        None => Ok(None),
        Some(arg) => {
            let (params, body) = lambda_parts(arg).ok_or(LoweringError::InvalidHelperArguments {
                helper: link.method.to_string(),
                position: link.offset,
            })?;
            let scope = chain_scope(params, group);
            Ok(Some(lower_predicate(body, &scope, ctx)?))
        }
    }
}

fn optional_selector(
    link: &ChainLink,
    group: &Option<Expression>,
    ctx: &mut LoweringContext,
) -> LoweringResult<Option<Expression>> {
    match link.args.first() {
        None => Ok(None),
        Some(arg) => {
            let (params, body) = lambda_parts(arg).ok_or(LoweringError::InvalidHelperArguments {
                helper: link.method.to_string(),
                position: link.offset,
            })?;
            let scope = chain_scope(params, group);
            Ok(Some(lower_expression(body, &scope, ctx)?))
        }
    }
}

/// Lowers a pagination operand: an embedded literal (auto-parameterised) or
/// an external parameter reference.
fn count_operand(link: &ChainLink, ctx: &mut LoweringContext) -> LoweringResult<CountOperand> {
    let arg = link.args.first().ok_or(LoweringError::InvalidHelperArguments {
        helper: link.method.to_string(),
        position: link.offset,
    })?;

    match lower_expression(arg, &Scope::empty(), ctx)? {
        Expression::AutoParam { name } => Ok(CountOperand::Auto { name }),
        Expression::Param { name, property } => Ok(CountOperand::Param { name, property }),
        _ => Err(LoweringError::InvalidHelperArguments {
            helper: link.method.to_string(),
            position: link.offset,
        }),
    }
}

fn lower_query_chain(
    root: &ChainLink,
    rest: &[ChainLink],
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    let (table, schema) = table_arguments(root)?;
    let mut op = QueryOperation::From { table, schema };

    let mut has_order_by = false;
    let mut group: Option<Expression> = None;
    let mut terminal: Option<&'static str> = None;

    for link in rest {
        if let Some(name) = terminal {
            return Err(LoweringError::TerminalNotLast {
                operation: name.to_string(),
            });
        }
        let source = Box::new(op);

        op = match link.method {
            "where" => QueryOperation::Where {
                source,
                predicate: required_predicate(link, &group, ctx)?,
            },
            "select" => {
                let (params, body) = expect_lambda(link, 0)?;
                let scope = chain_scope(params, &group);
                let selector = lower_expression(body, &scope, ctx)?;
                if group.take().is_some() {
                    validate_group_projection(&selector)?;
                }
                QueryOperation::Select { source, selector }
            }
            "distinct" => QueryOperation::Distinct { source },
            "orderBy" | "orderByDescending" => {
                has_order_by = true;
                let (params, body) = expect_lambda(link, 0)?;
                let scope = chain_scope(params, &group);
                QueryOperation::OrderBy {
                    source,
                    key: lower_expression(body, &scope, ctx)?,
                    descending: link.method == "orderByDescending",
                }
            }
            "thenBy" | "thenByDescending" => {
                if !has_order_by {
                    return Err(ShapeError::ThenByWithoutOrderBy.into());
                }
                let (params, body) = expect_lambda(link, 0)?;
                let scope = chain_scope(params, &group);
                QueryOperation::ThenBy {
                    source,
                    key: lower_expression(body, &scope, ctx)?,
                    descending: link.method == "thenByDescending",
                }
            }
            "reverse" => QueryOperation::Reverse { source },
            "take" => QueryOperation::Take {
                source,
                count: count_operand(link, ctx)?,
            },
            "skip" => QueryOperation::Skip {
                source,
                count: count_operand(link, ctx)?,
            },
            "groupBy" => {
                let (params, body) = expect_lambda(link, 0)?;
                let key = lower_expression(body, &Scope::rows(params), ctx)?;
                group = Some(key.clone());
                QueryOperation::GroupBy { source, key }
            }
            "join" | "leftJoin" => lower_join(link, source, ctx)?,
            "union" | "intersect" | "except" => {
                let second = link.args.first().ok_or(LoweringError::InvalidHelperArguments {
                    helper: link.method.to_string(),
                    position: link.offset,
                })?;
                QueryOperation::SetOp {
                    source,
                    kind: match link.method {
                        "union" => SetOpKind::Union,
                        "intersect" => SetOpKind::Intersect,
                        _ => SetOpKind::Except,
                    },
                    second: Box::new(lower_chain(second, ctx)?),
                }
            }
            "count" => {
                terminal = Some("count");
                QueryOperation::Count {
                    source,
                    predicate: optional_predicate(link, &group, ctx)?,
                }
            }
            "sum" | "average" | "avg" | "min" | "max" => {
                terminal = Some("aggregate");
                QueryOperation::Aggregate {
                    source,
                    function: match link.method {
                        "sum" => AggregateFunction::Sum,
                        "average" | "avg" => AggregateFunction::Avg,
                        "min" => AggregateFunction::Min,
                        _ => AggregateFunction::Max,
                    },
                    selector: optional_selector(link, &group, ctx)?,
                }
            }
            "first" | "firstOrDefault" | "single" | "singleOrDefault" | "last"
            | "lastOrDefault" => {
                let kind = match link.method {
                    "first" => ElementKind::First,
                    "firstOrDefault" => ElementKind::FirstOrDefault,
                    "single" => ElementKind::Single,
                    "singleOrDefault" => ElementKind::SingleOrDefault,
                    "last" => ElementKind::Last,
                    _ => ElementKind::LastOrDefault,
                };
                if kind.reverses_ordering() && !has_order_by {
                    return Err(ShapeError::LastWithoutOrderBy {
                        operation: kind.method_name().to_string(),
                    }
                    .into());
                }
                terminal = Some(kind.method_name());
                QueryOperation::Element {
                    source,
                    kind,
                    predicate: optional_predicate(link, &group, ctx)?,
                }
            }
            "any" => {
                terminal = Some("any");
                QueryOperation::Any {
                    source,
                    predicate: optional_predicate(link, &group, ctx)?,
                }
            }
            "all" => {
                terminal = Some("all");
                QueryOperation::All {
                    source,
                    predicate: required_predicate(link, &group, ctx)?,
                }
            }
            "contains" => {
                terminal = Some("contains");
                let arg = link.args.first().ok_or(LoweringError::InvalidHelperArguments {
                    helper: "contains".to_string(),
                    position: link.offset,
                })?;
                QueryOperation::Contains {
                    source,
                    value: lower_expression(arg, &Scope::empty(), ctx)?,
                }
            }
            "toArray" => {
                terminal = Some("toArray");
                QueryOperation::ToArray { source }
            }
            _ => {
                return Err(LoweringError::UnknownMethod {
                    method: link.method.to_string(),
                    position: link.offset,
                })
            }
        };
    }

    Ok(op)
}

fn required_predicate(
    link: &ChainLink,
    group: &Option<Expression>,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    optional_predicate(link, group, ctx)?.ok_or(LoweringError::InvalidHelperArguments {
        helper: link.method.to_string(),
        position: link.offset,
    })
}

/// A projection after `groupBy` may only use the group key and aggregates;
/// key uses were substituted during lowering, so anything else that still
/// references a column is a stray row access.
fn validate_group_projection(selector: &Expression) -> LoweringResult<()> {
    match selector {
        Expression::Object { properties } => {
            for (name, value) in properties {
                if contains_raw_all_columns(value) {
                    return Err(ShapeError::InvalidGroupProjection { name: name.clone() }.into());
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn contains_raw_all_columns(expr: &Expression) -> bool {
    matches!(expr, Expression::AllColumns { .. })
}

fn lower_join(
    link: &ChainLink,
    source: Box<QueryOperation>,
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    if link.args.len() != 4 {
        return Err(LoweringError::InvalidHelperArguments {
            helper: link.method.to_string(),
            position: link.offset,
        });
    }

    let inner = lower_chain(&link.args[0], ctx)?;

    let (outer_params, outer_body) = expect_lambda(link, 1)?;
    let outer_key = lower_expression(outer_body, &Scope::rows(outer_params), ctx)?;

    let (inner_params, inner_body) = expect_lambda(link, 2)?;
    let inner_key = lower_expression(inner_body, &Scope::rows(inner_params), ctx)?;

    let (result_params, result_body) = expect_lambda(link, 3)?;
    let result_selector = lower_expression(result_body, &Scope::rows(result_params), ctx)?;

    Ok(QueryOperation::Join {
        source,
        inner: Box::new(inner),
        outer_key,
        inner_key,
        result_selector,
        kind: if link.method == "leftJoin" {
            JoinKind::Left
        } else {
            JoinKind::Inner
        },
    })
}

fn lower_insert_chain(
    root: &ChainLink,
    rest: &[ChainLink],
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    let (table, schema) = table_arguments(root)?;
    let mut values: Vec<(String, Expression)> = Vec::new();
    let mut returning = None;

    for link in rest {
        match link.method {
            "values" => {
                let arg = link.args.first().ok_or(LoweringError::InvalidHelperArguments {
                    helper: "values".to_string(),
                    position: link.offset,
                })?;
                let properties = match &arg.kind {
                    NodeKind::Object { properties } => properties,
                    _ => {
                        return Err(LoweringError::InvalidHelperArguments {
                            helper: "values".to_string(),
                            position: link.offset,
                        })
                    }
                };
                for (name, value) in properties {
                    values.push((name.clone(), lower_expression(value, &Scope::empty(), ctx)?));
                }
            }
            "returning" => {
                let (params, body) = expect_lambda(link, 0)?;
                returning = Some(lower_expression(body, &Scope::rows(params), ctx)?);
            }
            _ => {
                return Err(LoweringError::InvalidMutationOperation {
                    operation: link.method.to_string(),
                    statement: "insert".to_string(),
                })
            }
        }
    }

    if values.is_empty() {
        return Err(ShapeError::EmptyInsert.into());
    }

    Ok(QueryOperation::Insert {
        table,
        schema,
        values,
        returning,
    })
}

fn lower_update_chain(
    root: &ChainLink,
    rest: &[ChainLink],
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    let (table, schema) = table_arguments(root)?;
    let mut assignments: Vec<(String, Expression)> = Vec::new();
    let mut predicate: Option<Expression> = None;
    let mut allow_full_table = false;

    for link in rest {
        match link.method {
            "set" => {
                let (params, body) = expect_lambda(link, 0)?;
                let properties = match &body.kind {
                    NodeKind::Object { properties } => properties,
                    _ => {
                        return Err(LoweringError::InvalidHelperArguments {
                            helper: "set".to_string(),
                            position: link.offset,
                        })
                    }
                };
                let scope = Scope::rows(params);
                for (name, value) in properties {
                    assignments.push((name.clone(), lower_expression(value, &scope, ctx)?));
                }
            }
            "where" => {
                let next = required_predicate(link, &None, ctx)?;
                predicate = Some(merge_predicates(predicate.take(), next));
            }
            "allowFullTableUpdate" => allow_full_table = true,
            _ => {
                return Err(LoweringError::InvalidMutationOperation {
                    operation: link.method.to_string(),
                    statement: "update".to_string(),
                })
            }
        }
    }

    if assignments.is_empty() {
        return Err(ShapeError::EmptyUpdate.into());
    }

    Ok(QueryOperation::Update {
        table,
        schema,
        assignments,
        predicate,
        allow_full_table,
    })
}

fn lower_delete_chain(
    root: &ChainLink,
    rest: &[ChainLink],
    ctx: &mut LoweringContext,
) -> LoweringResult<QueryOperation> {
    let (table, schema) = table_arguments(root)?;
    let mut predicate: Option<Expression> = None;
    let mut allow_full_table = false;

    for link in rest {
        match link.method {
            "where" => {
                let next = required_predicate(link, &None, ctx)?;
                predicate = Some(merge_predicates(predicate.take(), next));
            }
            "allowFullTableDelete" => allow_full_table = true,
            _ => {
                return Err(LoweringError::InvalidMutationOperation {
                    operation: link.method.to_string(),
                    statement: "delete".to_string(),
                })
            }
        }
    }

    Ok(QueryOperation::Delete {
        table,
        schema,
        predicate,
        allow_full_table,
    })
}

fn merge_predicates(existing: Option<Expression>, next: Expression) -> Expression {
    match existing {
        None => next,
        Some(prev) => Expression::Logical {
            op: LogicalOp::And,
            left: Box::new(prev),
            right: Some(Box::new(next)),
        },
    }
}

#[cfg(test)]
#[path = "tests/operation_tests.rs"]
mod tests;
