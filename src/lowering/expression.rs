//! Expression lowering.
//!
//! Converts syntax-tree sub-expressions into the Expression IR: resolving
//! identifiers against the active scope, mapping operators, coining
//! auto-parameters for embedded literals, and applying the truthiness lift
//! when a bare column stands in a predicate position.

use serde_json::Value;

use crate::error::{LoweringError, LoweringResult, ShapeError};
use crate::ir::{
    AggregateFunction, ArithmeticOp, ComparisonOp, Expression, LiteralValue, LogicalOp,
    StringMethod,
};
use crate::parser::{
    AstBinaryOp, AstComparisonOp, AstLogicalOp, AstUnaryOp, Node, NodeKind, TemplatePart,
};

use super::scope::{Binding, LoweringContext, Scope};

/// Lowers an expression in a value position.
pub fn lower_expression(
    node: &Node,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    match &node.kind {
        NodeKind::Identifier(name) => lower_identifier(name, node.offset, scope, ctx),

        NodeKind::Member { .. } => lower_member(node, scope, ctx),

        NodeKind::StringLiteral(s) => {
            Ok(auto_param(ctx, LiteralValue::String(s.clone()).to_json()))
        }
        NodeKind::NumberLiteral(n) => {
            Ok(auto_param(ctx, LiteralValue::from(*n).to_json()))
        }
        NodeKind::BooleanLiteral(b) => Ok(auto_param(ctx, LiteralValue::Boolean(*b).to_json())),
        NodeKind::NullLiteral => Ok(Expression::Null),

        NodeKind::Object { properties } => {
            let mut lowered = Vec::with_capacity(properties.len());
            for (name, value) in properties {
                lowered.push((name.clone(), lower_expression(value, scope, ctx)?));
            }
            Ok(Expression::Object { properties: lowered })
        }

        NodeKind::Array { elements } => {
            // An array literal becomes one parameter holding the whole array.
            let values = literal_array(elements).ok_or_else(|| LoweringError::UnsupportedSyntax {
                construct: "array literal with non-literal elements".to_string(),
                position: node.offset,
            })?;
            Ok(auto_param(ctx, Value::Array(values)))
        }

        NodeKind::Binary { op, left, right } => {
            let lowered_left = lower_expression(left, scope, ctx)?;
            let lowered_right = lower_expression(right, scope, ctx)?;
            if *op == AstBinaryOp::Add && (is_stringish(left) || is_stringish(right)) {
                return Ok(Expression::Concat {
                    left: Box::new(lowered_left),
                    right: Box::new(lowered_right),
                });
            }
            Ok(Expression::Arithmetic {
                op: map_binary_op(*op),
                left: Box::new(lowered_left),
                right: Box::new(lowered_right),
            })
        }

        NodeKind::Comparison { op, left, right } => {
            // Keep null on the right so generation can emit IS [NOT] NULL.
            let (left, right) =
                if matches!(left.kind, NodeKind::NullLiteral) && !matches!(right.kind, NodeKind::NullLiteral) {
                    (right, left)
                } else {
                    (left, right)
                };
            Ok(Expression::Comparison {
                op: map_comparison_op(*op),
                left: Box::new(lower_expression(left, scope, ctx)?),
                right: Box::new(lower_expression(right, scope, ctx)?),
            })
        }

        NodeKind::Logical { op, left, right } => match op {
            AstLogicalOp::Nullish => Ok(Expression::Coalesce {
                left: Box::new(lower_expression(left, scope, ctx)?),
                right: Box::new(lower_expression(right, scope, ctx)?),
            }),
            AstLogicalOp::And | AstLogicalOp::Or => {
                let lowered_left = ensure_boolean(lower_expression(left, scope, ctx)?);
                let lowered_right = ensure_boolean(lower_expression(right, scope, ctx)?);
                Ok(Expression::Logical {
                    op: if *op == AstLogicalOp::And {
                        LogicalOp::And
                    } else {
                        LogicalOp::Or
                    },
                    left: Box::new(lowered_left),
                    right: Some(Box::new(lowered_right)),
                })
            }
        },

        NodeKind::Unary { op, operand } => match op {
            AstUnaryOp::Not => {
                let lowered = ensure_boolean(lower_expression(operand, scope, ctx)?);
                Ok(Expression::Logical {
                    op: LogicalOp::Not,
                    left: Box::new(lowered),
                    right: None,
                })
            }
            AstUnaryOp::Negate => match &operand.kind {
                NodeKind::NumberLiteral(n) => {
                    let value = match LiteralValue::from(*n) {
                        LiteralValue::Int(v) => Value::from(-v),
                        LiteralValue::Float(v) => Value::from(-v),
                        _ => unreachable!(),
                    };
                    Ok(auto_param(ctx, value))
                }
                _ => Err(LoweringError::UnsupportedSyntax {
                    construct: "unary minus on a non-literal".to_string(),
                    position: node.offset,
                }),
            },
        },

        NodeKind::Conditional {
            test,
            consequent,
            alternate,
        } => Ok(Expression::Conditional {
            test: Box::new(ensure_boolean(lower_expression(test, scope, ctx)?)),
            consequent: Box::new(lower_expression(consequent, scope, ctx)?),
            alternate: Box::new(lower_expression(alternate, scope, ctx)?),
        }),

        NodeKind::Template { parts } => lower_template(parts, node.offset, scope, ctx),

        NodeKind::Call { callee, args } => lower_call(node, callee, args, scope, ctx),

        NodeKind::ArrowFunction { .. } => Err(LoweringError::UnsupportedSyntax {
            construct: "nested arrow function in an expression position".to_string(),
            position: node.offset,
        }),
    }
}

/// Lowers an expression in a predicate position, lifting bare columns.
pub fn lower_predicate(
    node: &Node,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    Ok(ensure_boolean(lower_expression(node, scope, ctx)?))
}

/// Lifts a non-boolean column reference into a boolean column.
pub fn ensure_boolean(expr: Expression) -> Expression {
    match expr {
        Expression::Column { path, source } => Expression::BooleanColumn { path, source },
        other => other,
    }
}

fn auto_param(ctx: &mut LoweringContext, value: Value) -> Expression {
    Expression::AutoParam {
        name: ctx.auto.coin(value),
    }
}

fn lower_identifier(
    name: &str,
    offset: usize,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    match scope.lookup(name, ctx) {
        Some(Binding::Row { side }) => Ok(Expression::AllColumns { source: side }),
        Some(Binding::Query) => {
            ctx.declared.insert(name.to_string());
            Ok(Expression::Param {
                name: name.to_string(),
                property: None,
            })
        }
        Some(Binding::Group) => Err(LoweringError::UnsupportedSyntax {
            construct: "bare grouping parameter outside 'key' or an aggregate".to_string(),
            position: offset,
        }),
        None => Err(LoweringError::UnknownIdentifier {
            name: name.to_string(),
            position: offset,
        }),
    }
}

/// Flattens a member chain down to its base identifier and dotted path.
fn member_path(node: &Node) -> Option<(String, Vec<String>)> {
    match &node.kind {
        NodeKind::Member { object, property } => {
            let (base, mut path) = member_path(object)?;
            path.push(property.clone());
            Some((base, path))
        }
        NodeKind::Identifier(name) => Some((name.clone(), Vec::new())),
        _ => None,
    }
}

fn lower_member(
    node: &Node,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    let (base, path) = member_path(node).ok_or_else(|| LoweringError::UnsupportedSyntax {
        construct: "member access on a computed value".to_string(),
        position: node.offset,
    })?;

    match scope.lookup(&base, ctx) {
        Some(Binding::Row { side }) => Ok(Expression::Column {
            path: path.join("."),
            source: side,
        }),
        Some(Binding::Query) => {
            if path.len() != 1 {
                return Err(LoweringError::UnsupportedSyntax {
                    construct: "nested parameter access".to_string(),
                    position: node.offset,
                });
            }
            ctx.declared.insert(path[0].clone());
            Ok(Expression::Param {
                name: base,
                property: Some(path[0].clone()),
            })
        }
        Some(Binding::Group) => lower_group_member(&path, node.offset, scope),
        None => Err(LoweringError::UnknownIdentifier {
            name: base,
            position: node.offset,
        }),
    }
}

/// Lowers `g.key` (and `g.key.prop` for composite keys) by substituting the
/// stored groupBy key expression.
fn lower_group_member(
    path: &[String],
    offset: usize,
    scope: &Scope,
) -> LoweringResult<Expression> {
    if path.first().map(String::as_str) != Some("key") {
        return Err(LoweringError::UnsupportedSyntax {
            construct: format!("grouping member '{}'", path.join(".")),
            position: offset,
        });
    }
    let key = scope
        .group_key()
        .ok_or(ShapeError::GroupKeyOutsideGroupBy)?
        .clone();

    match path.len() {
        1 => Ok(key),
        2 => match key {
            Expression::Object { properties } => properties
                .into_iter()
                .find(|(name, _)| name == &path[1])
                .map(|(_, expr)| expr)
                .ok_or_else(|| {
                    ShapeError::UnknownGroupKeyProperty {
                        property: path[1].clone(),
                    }
                    .into()
                }),
            _ => Err(ShapeError::UnknownGroupKeyProperty {
                property: path[1].clone(),
            }
            .into()),
        },
        _ => Err(LoweringError::UnsupportedSyntax {
            construct: format!("grouping member '{}'", path.join(".")),
            position: offset,
        }),
    }
}

fn lower_template(
    parts: &[TemplatePart],
    offset: usize,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    let mut result: Option<Expression> = None;
    for part in parts {
        let lowered = match part {
            TemplatePart::Chunk(text) => auto_param(ctx, Value::String(text.clone())),
            TemplatePart::Expr(node) => lower_expression(node, scope, ctx)?,
        };
        result = Some(match result {
            None => lowered,
            Some(prev) => Expression::Concat {
                left: Box::new(prev),
                right: Box::new(lowered),
            },
        });
    }
    result.ok_or(LoweringError::UnsupportedSyntax {
        construct: "empty template literal".to_string(),
        position: offset,
    })
}

fn lower_call(
    node: &Node,
    callee: &Node,
    args: &[Node],
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    let (object, method) = match &callee.kind {
        NodeKind::Member { object, property } => (object.as_ref(), property.as_str()),
        _ => {
            return Err(LoweringError::UnsupportedSyntax {
                construct: "free function call in an expression".to_string(),
                position: node.offset,
            })
        }
    };

    // Grouping aggregates: g.count(), g.sum(x => x.amount), ...
    if let NodeKind::Identifier(base) = &object.kind {
        if matches!(scope.lookup(base, ctx), Some(Binding::Group)) {
            return lower_group_aggregate(method, args, node.offset, ctx);
        }
    }

    match StringMethod::from_name(method) {
        Some(string_method) => {
            lower_string_method(string_method, object, args, node.offset, scope, ctx)
        }
        None => Err(LoweringError::UnknownMethod {
            method: method.to_string(),
            position: node.offset,
        }),
    }
}

fn lower_group_aggregate(
    method: &str,
    args: &[Node],
    offset: usize,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    let function = match method {
        "count" => AggregateFunction::Count,
        "sum" => AggregateFunction::Sum,
        "average" | "avg" => AggregateFunction::Avg,
        "min" => AggregateFunction::Min,
        "max" => AggregateFunction::Max,
        _ => {
            return Err(LoweringError::UnknownMethod {
                method: method.to_string(),
                position: offset,
            })
        }
    };

    let selector = match args.first() {
        None => None,
        Some(arg) => match &arg.kind {
            NodeKind::ArrowFunction { params, body } => {
                let inner_scope = Scope::rows(params);
                Some(Box::new(lower_expression(body, &inner_scope, ctx)?))
            }
            _ => {
                return Err(LoweringError::InvalidHelperArguments {
                    helper: method.to_string(),
                    position: offset,
                })
            }
        },
    };

    if function != AggregateFunction::Count && selector.is_none() {
        return Err(LoweringError::InvalidHelperArguments {
            helper: method.to_string(),
            position: offset,
        });
    }

    Ok(Expression::Aggregate { function, selector })
}

/// Lowers whitelisted helper calls. `includes` doubles as a membership test
/// when its receiver is an array literal or parameter reference; pattern
/// arguments that are literals get their `%` wildcards folded into the
/// coined parameter so the SQL stays literal-free.
fn lower_string_method(
    method: StringMethod,
    object: &Node,
    args: &[Node],
    offset: usize,
    scope: &Scope,
    ctx: &mut LoweringContext,
) -> LoweringResult<Expression> {
    match method {
        StringMethod::ToLowerCase | StringMethod::ToUpperCase | StringMethod::Trim => {
            if !args.is_empty() {
                return Err(LoweringError::InvalidHelperArguments {
                    helper: method_name(method).to_string(),
                    position: offset,
                });
            }
            Ok(Expression::StringMethod {
                method,
                object: Box::new(lower_expression(object, scope, ctx)?),
                args: Vec::new(),
            })
        }
        StringMethod::Includes if is_collection_receiver(object, scope, ctx) => {
            let member = args.first().ok_or(LoweringError::InvalidHelperArguments {
                helper: "includes".to_string(),
                position: offset,
            })?;
            Ok(Expression::Comparison {
                op: ComparisonOp::In,
                left: Box::new(lower_expression(member, scope, ctx)?),
                right: Box::new(lower_expression(object, scope, ctx)?),
            })
        }
        StringMethod::StartsWith | StringMethod::EndsWith | StringMethod::Includes => {
            let pattern = args.first().ok_or(LoweringError::InvalidHelperArguments {
                helper: method_name(method).to_string(),
                position: offset,
            })?;
            let lowered_object = lower_expression(object, scope, ctx)?;

            if let NodeKind::StringLiteral(text) = &pattern.kind {
                let folded = match method {
                    StringMethod::StartsWith => format!("{}%", like_escape(text)),
                    StringMethod::EndsWith => format!("%{}", like_escape(text)),
                    _ => format!("%{}%", like_escape(text)),
                };
                return Ok(Expression::Comparison {
                    op: ComparisonOp::Like,
                    left: Box::new(lowered_object),
                    right: Box::new(auto_param(ctx, Value::String(folded))),
                });
            }

            Ok(Expression::StringMethod {
                method,
                object: Box::new(lowered_object),
                args: vec![lower_expression(pattern, scope, ctx)?],
            })
        }
    }
}

fn method_name(method: StringMethod) -> &'static str {
    match method {
        StringMethod::StartsWith => "startsWith",
        StringMethod::EndsWith => "endsWith",
        StringMethod::Includes => "includes",
        StringMethod::ToLowerCase => "toLowerCase",
        StringMethod::ToUpperCase => "toUpperCase",
        StringMethod::Trim => "trim",
    }
}

/// `includes` receiver shapes that mean SQL membership rather than substring.
fn is_collection_receiver(object: &Node, scope: &Scope, ctx: &LoweringContext) -> bool {
    match &object.kind {
        NodeKind::Array { .. } => true,
        NodeKind::Member { .. } | NodeKind::Identifier(_) => {
            if let Some((base, _)) = member_path(object) {
                matches!(scope.lookup(&base, ctx), Some(Binding::Query))
            } else {
                false
            }
        }
        _ => false,
    }
}

fn like_escape(text: &str) -> String {
    text.replace('%', "\\%").replace('_', "\\_")
}

fn is_stringish(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::StringLiteral(_) | NodeKind::Template { .. }
    )
}

fn literal_array(elements: &[Node]) -> Option<Vec<Value>> {
    elements
        .iter()
        .map(|el| match &el.kind {
            NodeKind::StringLiteral(s) => Some(LiteralValue::String(s.clone()).to_json()),
            NodeKind::NumberLiteral(n) => Some(LiteralValue::from(*n).to_json()),
            NodeKind::BooleanLiteral(b) => Some(LiteralValue::Boolean(*b).to_json()),
            NodeKind::NullLiteral => Some(LiteralValue::Null.to_json()),
            _ => None,
        })
        .collect()
}

fn map_binary_op(op: AstBinaryOp) -> ArithmeticOp {
    match op {
        AstBinaryOp::Add => ArithmeticOp::Add,
        AstBinaryOp::Subtract => ArithmeticOp::Subtract,
        AstBinaryOp::Multiply => ArithmeticOp::Multiply,
        AstBinaryOp::Divide => ArithmeticOp::Divide,
        AstBinaryOp::Modulo => ArithmeticOp::Modulo,
    }
}

fn map_comparison_op(op: AstComparisonOp) -> ComparisonOp {
    match op {
        AstComparisonOp::Equal => ComparisonOp::Equal,
        AstComparisonOp::NotEqual => ComparisonOp::NotEqual,
        AstComparisonOp::LessThan => ComparisonOp::LessThan,
        AstComparisonOp::LessThanOrEqual => ComparisonOp::LessThanOrEqual,
        AstComparisonOp::GreaterThan => ComparisonOp::GreaterThan,
        AstComparisonOp::GreaterThanOrEqual => ComparisonOp::GreaterThanOrEqual,
    }
}

#[cfg(test)]
#[path = "tests/expression_tests.rs"]
mod tests;
