use super::*;
use crate::error::LoweringError;
use crate::ir::{AggregateFunction, ArithmeticOp, ComparisonOp, Expression, LogicalOp};
use crate::lowering::scope::{LoweringContext, Scope};
use crate::parser::{Node, Parser};
use serde_json::json;

fn parse_expr(source: &str) -> Node {
    Parser::parse_expression_source(source).unwrap()
}

fn row_scope() -> Scope {
    Scope::rows(&["x".to_string()])
}

fn ctx_with_params(params: &[&str]) -> LoweringContext {
    LoweringContext::new(params.iter().map(|s| s.to_string()).collect())
}

#[test]
fn test_row_member_lowers_to_column() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.age"), &row_scope(), &mut ctx).unwrap();
    assert_eq!(
        expr,
        Expression::Column {
            path: "age".to_string(),
            source: None
        }
    );
}

#[test]
fn test_query_param_member_lowers_to_param_and_declares() {
    let mut ctx = ctx_with_params(&["p"]);
    let expr = lower_expression(&parse_expr("p.minAge"), &row_scope(), &mut ctx).unwrap();
    assert_eq!(
        expr,
        Expression::Param {
            name: "p".to_string(),
            property: Some("minAge".to_string())
        }
    );
    assert!(ctx.declared.contains("minAge"));
}

#[test]
fn test_literal_coins_auto_param() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.age >= 18"), &row_scope(), &mut ctx).unwrap();
    match expr {
        Expression::Comparison { op, right, .. } => {
            assert_eq!(op, ComparisonOp::GreaterThanOrEqual);
            assert_eq!(
                *right,
                Expression::AutoParam {
                    name: "__p1".to_string()
                }
            );
        }
        other => panic!("expected comparison, got {:?}", other),
    }
    assert_eq!(ctx.auto.into_values()["__p1"], json!(18));
}

#[test]
fn test_null_literal_stays_inline() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.deletedAt == null"), &row_scope(), &mut ctx).unwrap();
    match expr {
        Expression::Comparison { op, right, .. } => {
            assert_eq!(op, ComparisonOp::Equal);
            assert_eq!(*right, Expression::Null);
        }
        other => panic!("expected comparison, got {:?}", other),
    }
}

#[test]
fn test_null_on_left_is_normalised_to_right() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("null != x.deletedAt"), &row_scope(), &mut ctx).unwrap();
    match expr {
        Expression::Comparison { left, right, .. } => {
            assert!(matches!(*left, Expression::Column { .. }));
            assert_eq!(*right, Expression::Null);
        }
        other => panic!("expected comparison, got {:?}", other),
    }
}

#[test]
fn test_truthiness_lift_in_predicate() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_predicate(&parse_expr("x.isActive"), &row_scope(), &mut ctx).unwrap();
    assert_eq!(
        expr,
        Expression::BooleanColumn {
            path: "isActive".to_string(),
            source: None
        }
    );
}

#[test]
fn test_logical_operands_are_lifted() {
    let mut ctx = ctx_with_params(&[]);
    let expr =
        lower_predicate(&parse_expr("x.isActive && x.age > 18"), &row_scope(), &mut ctx).unwrap();
    match expr {
        Expression::Logical { op, left, .. } => {
            assert_eq!(op, LogicalOp::And);
            assert!(matches!(*left, Expression::BooleanColumn { .. }));
        }
        other => panic!("expected logical, got {:?}", other),
    }
}

#[test]
fn test_nullish_lowers_to_coalesce() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.priority ?? 5"), &row_scope(), &mut ctx).unwrap();
    assert!(matches!(expr, Expression::Coalesce { .. }));
}

#[test]
fn test_ternary_lowers_to_conditional() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(
        &parse_expr("x.age >= 18 ? x.adultRate : x.minorRate"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    assert!(matches!(expr, Expression::Conditional { .. }));
}

#[test]
fn test_starts_with_literal_folds_wildcard_into_param() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(
        &parse_expr("x.name.startsWith(\"A\")"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    match expr {
        Expression::Comparison { op, right, .. } => {
            assert_eq!(op, ComparisonOp::Like);
            assert_eq!(
                *right,
                Expression::AutoParam {
                    name: "__p1".to_string()
                }
            );
        }
        other => panic!("expected LIKE comparison, got {:?}", other),
    }
    assert_eq!(ctx.auto.into_values()["__p1"], json!("A%"));
}

#[test]
fn test_includes_on_array_is_membership() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(
        &parse_expr("[1, 2, 3].includes(x.status)"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    match expr {
        Expression::Comparison { op, left, right } => {
            assert_eq!(op, ComparisonOp::In);
            assert!(matches!(*left, Expression::Column { .. }));
            assert!(matches!(*right, Expression::AutoParam { .. }));
        }
        other => panic!("expected IN comparison, got {:?}", other),
    }
    assert_eq!(ctx.auto.into_values()["__p1"], json!([1, 2, 3]));
}

#[test]
fn test_includes_on_param_is_membership() {
    let mut ctx = ctx_with_params(&["p"]);
    let expr = lower_expression(
        &parse_expr("p.ids.includes(x.id)"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    match expr {
        Expression::Comparison { op, right, .. } => {
            assert_eq!(op, ComparisonOp::In);
            assert!(matches!(*right, Expression::Param { .. }));
        }
        other => panic!("expected IN comparison, got {:?}", other),
    }
}

#[test]
fn test_includes_on_column_is_substring_like() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(
        &parse_expr("x.name.includes(\"son\")"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    match expr {
        Expression::Comparison { op, .. } => assert_eq!(op, ComparisonOp::Like),
        other => panic!("expected LIKE comparison, got {:?}", other),
    }
    assert_eq!(ctx.auto.into_values()["__p1"], json!("%son%"));
}

#[test]
fn test_template_literal_lowers_to_concat() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(
        &parse_expr("`${x.first} ${x.last}`"),
        &row_scope(),
        &mut ctx,
    )
    .unwrap();
    assert!(matches!(expr, Expression::Concat { .. }));
}

#[test]
fn test_string_plus_lowers_to_concat() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.name + \"!\""), &row_scope(), &mut ctx).unwrap();
    assert!(matches!(expr, Expression::Concat { .. }));
}

#[test]
fn test_numeric_plus_stays_arithmetic() {
    let mut ctx = ctx_with_params(&[]);
    let expr = lower_expression(&parse_expr("x.a + x.b"), &row_scope(), &mut ctx).unwrap();
    assert!(matches!(
        expr,
        Expression::Arithmetic {
            op: ArithmeticOp::Add,
            ..
        }
    ));
}

#[test]
fn test_free_identifier_is_rejected() {
    let mut ctx = ctx_with_params(&[]);
    let err = lower_expression(&parse_expr("captured.age"), &row_scope(), &mut ctx).unwrap_err();
    assert!(matches!(err, LoweringError::UnknownIdentifier { ref name, .. } if name == "captured"));
}

#[test]
fn test_unknown_method_is_rejected() {
    let mut ctx = ctx_with_params(&[]);
    let err =
        lower_expression(&parse_expr("x.name.reverse()"), &row_scope(), &mut ctx).unwrap_err();
    assert!(matches!(err, LoweringError::UnknownMethod { ref method, .. } if method == "reverse"));
}

#[test]
fn test_group_key_substitution() {
    let mut ctx = ctx_with_params(&[]);
    let key = Expression::column("category");
    let scope = Scope::group("g", key.clone());
    let expr = lower_expression(&parse_expr("g.key"), &scope, &mut ctx).unwrap();
    assert_eq!(expr, key);
}

#[test]
fn test_composite_group_key_property() {
    let mut ctx = ctx_with_params(&[]);
    let key = Expression::Object {
        properties: vec![
            ("a".to_string(), Expression::column("a")),
            ("b".to_string(), Expression::column("b")),
        ],
    };
    let scope = Scope::group("g", key);
    let expr = lower_expression(&parse_expr("g.key.b"), &scope, &mut ctx).unwrap();
    assert_eq!(expr, Expression::column("b"));
}

#[test]
fn test_group_count_lowers_to_aggregate() {
    let mut ctx = ctx_with_params(&[]);
    let scope = Scope::group("g", Expression::column("category"));
    let expr = lower_expression(&parse_expr("g.count()"), &scope, &mut ctx).unwrap();
    assert_eq!(
        expr,
        Expression::Aggregate {
            function: AggregateFunction::Count,
            selector: None
        }
    );
}

#[test]
fn test_group_sum_requires_selector() {
    let mut ctx = ctx_with_params(&[]);
    let scope = Scope::group("g", Expression::column("category"));
    let err = lower_expression(&parse_expr("g.sum()"), &scope, &mut ctx).unwrap_err();
    assert!(matches!(err, LoweringError::InvalidHelperArguments { .. }));
}
