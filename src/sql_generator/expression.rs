//! Expression IR rendering.
//!
//! Renders expression nodes to dialect SQL. Logical nodes parenthesise
//! themselves so round-tripping is stable; arithmetic gets parentheses only
//! around mixed-precedence children. Column paths resolve through the
//! context's symbol table; an unknown path is quoted verbatim with a warning
//! for compatibility with raw column usage.

use crate::error::{GenerationError, GenerationResult};
use crate::ir::{ArithmeticOp, ComparisonOp, Expression, LogicalOp, Resolution, StringMethod};

use super::{SqlContext, SqlGenerator};

impl SqlGenerator {
    /// Converts an expression IR node to SQL.
    pub(super) fn render_expression(
        &self,
        expr: &Expression,
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        match expr {
            // The only literal that reaches generation; everything else is
            // an auto-parameter.
            Expression::Null => Ok("NULL".to_string()),

            Expression::Column { path, source }
            | Expression::BooleanColumn { path, source } => {
                Ok(self.render_column(path, *source, ctx))
            }

            Expression::Param { name, property } => Ok(self
                .dialect
                .format_parameter(property.as_deref().unwrap_or(name))),

            Expression::AutoParam { name } => Ok(self.dialect.format_parameter(name)),

            Expression::Arithmetic { op, left, right } => {
                let precedence = arithmetic_precedence(*op);
                let left_sql = self.render_arithmetic_operand(left, precedence, false, ctx)?;
                let right_sql = self.render_arithmetic_operand(right, precedence, true, ctx)?;
                Ok(format!("{} {} {}", left_sql, arithmetic_symbol(*op), right_sql))
            }

            Expression::Concat { left, right } => {
                let left_sql = self.render_expression(left, ctx)?;
                let right_sql = self.render_expression(right, ctx)?;
                Ok(self.dialect.string_concat(&left_sql, &right_sql))
            }

            Expression::Comparison { op, left, right } => {
                self.render_comparison(*op, left, right, ctx)
            }

            Expression::Logical { op, left, right } => match op {
                LogicalOp::Not => {
                    let operand = self.render_expression(left, ctx)?;
                    Ok(format!("NOT ({})", operand))
                }
                LogicalOp::And | LogicalOp::Or => {
                    let left_sql = self.render_expression(left, ctx)?;
                    let right_sql = self.render_expression(
                        right.as_deref().expect("binary logical has a right operand"),
                        ctx,
                    )?;
                    let keyword = if *op == LogicalOp::And { "AND" } else { "OR" };
                    Ok(format!("({} {} {})", left_sql, keyword, right_sql))
                }
            },

            Expression::Coalesce { left, right } => Ok(format!(
                "COALESCE({}, {})",
                self.render_expression(left, ctx)?,
                self.render_expression(right, ctx)?
            )),

            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.render_expression(test, ctx)?,
                self.render_expression(consequent, ctx)?,
                self.render_expression(alternate, ctx)?
            )),

            Expression::StringMethod {
                method,
                object,
                args,
            } => self.render_string_method(*method, object, args, ctx),

            Expression::AllColumns { source } => Ok(self.wildcard_sql(*source, ctx)),

            Expression::Aggregate { function, selector } => match selector {
                None => Ok(format!("{}(*)", function.sql_name())),
                Some(selector) => Ok(format!(
                    "{}({})",
                    function.sql_name(),
                    self.render_expression(selector, ctx)?
                )),
            },

            Expression::Object { .. } => Err(GenerationError::UnsupportedOperation {
                operation: "object expression outside a projection".to_string(),
                dialect: self.dialect.dialect_name().to_string(),
            }),
        }
    }

    /// Resolves a column path to `(alias, column)` through the symbol table.
    pub(super) fn resolve_column(
        &self,
        path: &str,
        source: Option<usize>,
        ctx: &SqlContext,
    ) -> Option<(Option<String>, String)> {
        if source == Some(1) {
            if let Some(alias) = &ctx.inner_alias {
                return Some((Some(alias.clone()), path.to_string()));
            }
        }
        match ctx.symbols.resolve(path) {
            Resolution::Column { alias, column } => Some((alias, column)),
            _ => None,
        }
    }

    pub(super) fn render_column(&self, path: &str, source: Option<usize>, ctx: &SqlContext) -> String {
        if source == Some(1) {
            if let Some(alias) = &ctx.inner_alias {
                return format!("{}.{}", alias, self.dialect.quote_identifier(path));
            }
        }
        match ctx.symbols.resolve(path) {
            Resolution::Column { alias, column } => {
                self.column_sql(alias.as_deref(), &column, ctx)
            }
            Resolution::Computed { sql } => sql,
            Resolution::Unknown => {
                log::warn!("unknown column path '{}'; quoting verbatim", path);
                self.dialect.quote_identifier(path)
            }
        }
    }

    /// Quotes a column, alias-qualified only when the statement has joins.
    pub(super) fn column_sql(&self, alias: Option<&str>, column: &str, ctx: &SqlContext) -> String {
        match alias {
            Some(alias) if ctx.has_joins => {
                format!("{}.{}", alias, self.dialect.quote_identifier(column))
            }
            _ => self.dialect.quote_identifier(column),
        }
    }

    /// `alias.*` for a whole-row reference, `*` for an unaliased table.
    pub(super) fn wildcard_sql(&self, source: Option<usize>, ctx: &SqlContext) -> String {
        if source == Some(1) {
            if let Some(alias) = &ctx.inner_alias {
                return format!("{}.*", alias);
            }
        }
        match ctx.symbols.get("*") {
            Some(crate::ir::SymbolTarget::Wildcard { alias: Some(alias) }) => {
                format!("{}.*", alias)
            }
            _ => "*".to_string(),
        }
    }

    fn render_comparison(
        &self,
        op: ComparisonOp,
        left: &Expression,
        right: &Expression,
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        // Null comparisons emit IS NULL / IS NOT NULL.
        if matches!(right, Expression::Null) {
            let left_sql = self.render_expression(left, ctx)?;
            return Ok(match op {
                ComparisonOp::NotEqual => format!("{} IS NOT NULL", left_sql),
                _ => format!("{} IS NULL", left_sql),
            });
        }

        let left_sql = self.render_expression(left, ctx)?;
        let right_sql = self.render_expression(right, ctx)?;

        Ok(match op {
            ComparisonOp::In => self.dialect.membership_test(&left_sql, &right_sql),
            ComparisonOp::Like => format!("{} LIKE {}", left_sql, right_sql),
            ComparisonOp::Equal => format!("{} = {}", left_sql, right_sql),
            ComparisonOp::NotEqual => format!("{} <> {}", left_sql, right_sql),
            ComparisonOp::LessThan => format!("{} < {}", left_sql, right_sql),
            ComparisonOp::LessThanOrEqual => format!("{} <= {}", left_sql, right_sql),
            ComparisonOp::GreaterThan => format!("{} > {}", left_sql, right_sql),
            ComparisonOp::GreaterThanOrEqual => format!("{} >= {}", left_sql, right_sql),
        })
    }

    fn render_string_method(
        &self,
        method: StringMethod,
        object: &Expression,
        args: &[Expression],
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        let object_sql = self.render_expression(object, ctx)?;
        match method {
            StringMethod::ToLowerCase => Ok(format!("LOWER({})", object_sql)),
            StringMethod::ToUpperCase => Ok(format!("UPPER({})", object_sql)),
            StringMethod::Trim => Ok(format!("TRIM({})", object_sql)),
            // Pattern arguments here are parameter references; literal
            // patterns were folded into auto-params during lowering.
            StringMethod::StartsWith | StringMethod::EndsWith | StringMethod::Includes => {
                let arg_sql = self.render_expression(
                    args.first().expect("pattern helper has one argument"),
                    ctx,
                )?;
                let pattern = match method {
                    StringMethod::StartsWith => self.dialect.string_concat(&arg_sql, "'%'"),
                    StringMethod::EndsWith => self.dialect.string_concat("'%'", &arg_sql),
                    _ => self
                        .dialect
                        .string_concat("'%'", &self.dialect.string_concat(&arg_sql, "'%'")),
                };
                Ok(format!("{} LIKE {}", object_sql, pattern))
            }
        }
    }

    fn render_arithmetic_operand(
        &self,
        operand: &Expression,
        parent_precedence: u8,
        is_right: bool,
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        let sql = self.render_expression(operand, ctx)?;
        if let Expression::Arithmetic { op, .. } = operand {
            let precedence = arithmetic_precedence(*op);
            if precedence < parent_precedence || (is_right && precedence == parent_precedence) {
                return Ok(format!("({})", sql));
            }
        }
        Ok(sql)
    }
}

fn arithmetic_precedence(op: ArithmeticOp) -> u8 {
    match op {
        ArithmeticOp::Add | ArithmeticOp::Subtract => 1,
        ArithmeticOp::Multiply | ArithmeticOp::Divide | ArithmeticOp::Modulo => 2,
    }
}

fn arithmetic_symbol(op: ArithmeticOp) -> &'static str {
    match op {
        ArithmeticOp::Add => "+",
        ArithmeticOp::Subtract => "-",
        ArithmeticOp::Multiply => "*",
        ArithmeticOp::Divide => "/",
        ArithmeticOp::Modulo => "%",
    }
}
