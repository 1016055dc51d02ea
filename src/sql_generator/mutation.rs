// Mutation statement emission (INSERT / UPDATE / DELETE).

use crate::error::{GenerationError, GenerationResult, ShapeError};
use crate::ir::Expression;

use super::{SqlContext, SqlGenerator};

impl SqlGenerator {
    pub(super) fn generate_insert(
        &self,
        table: &str,
        schema: Option<&str>,
        values: &[(String, Expression)],
        returning: Option<&Expression>,
    ) -> GenerationResult<String> {
        if values.is_empty() {
            return Err(ShapeError::EmptyInsert.into());
        }

        let ctx = SqlContext::for_mutation();
        let columns: Vec<String> = values
            .iter()
            .map(|(name, _)| self.dialect.quote_identifier(name))
            .collect();
        let rendered: GenerationResult<Vec<String>> = values
            .iter()
            .map(|(_, expr)| self.render_expression(expr, &ctx))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_table(schema, table),
            columns.join(", "),
            rendered?.join(", ")
        );

        if let Some(returning) = returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.render_returning(returning, &ctx)?);
        }

        Ok(sql)
    }

    pub(super) fn generate_update(
        &self,
        table: &str,
        schema: Option<&str>,
        assignments: &[(String, Expression)],
        predicate: Option<&Expression>,
        allow_full_table: bool,
    ) -> GenerationResult<String> {
        if assignments.is_empty() {
            return Err(ShapeError::EmptyUpdate.into());
        }
        if predicate.is_none() && !allow_full_table {
            return Err(GenerationError::UnsafeStatement {
                statement: "update".to_string(),
            });
        }

        let ctx = SqlContext::for_mutation();
        let sets: GenerationResult<Vec<String>> = assignments
            .iter()
            .map(|(name, expr)| {
                Ok(format!(
                    "{} = {}",
                    self.dialect.quote_identifier(name),
                    self.render_expression(expr, &ctx)?
                ))
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.qualified_table(schema, table),
            sets?.join(", ")
        );

        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_expression(predicate, &ctx)?);
        }

        Ok(sql)
    }

    pub(super) fn generate_delete(
        &self,
        table: &str,
        schema: Option<&str>,
        predicate: Option<&Expression>,
        allow_full_table: bool,
    ) -> GenerationResult<String> {
        if predicate.is_none() && !allow_full_table {
            return Err(GenerationError::UnsafeStatement {
                statement: "delete".to_string(),
            });
        }

        let ctx = SqlContext::for_mutation();
        let mut sql = format!("DELETE FROM {}", self.qualified_table(schema, table));

        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_expression(predicate, &ctx)?);
        }

        Ok(sql)
    }

    /// Renders a RETURNING projection; the identity selector yields `*`.
    fn render_returning(
        &self,
        returning: &Expression,
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        if !self.dialect.supports_returning() {
            return Err(GenerationError::UnsupportedOperation {
                operation: "returning".to_string(),
                dialect: self.dialect.dialect_name().to_string(),
            });
        }

        match returning {
            Expression::AllColumns { .. } => Ok("*".to_string()),
            Expression::Object { properties } => {
                let items: GenerationResult<Vec<String>> = properties
                    .iter()
                    .map(|(name, expr)| {
                        Ok(format!(
                            "{} AS {}",
                            self.render_expression(expr, ctx)?,
                            self.dialect.quote_identifier(name)
                        ))
                    })
                    .collect();
                Ok(items?.join(", "))
            }
            other => self.render_expression(other, ctx),
        }
    }
}
