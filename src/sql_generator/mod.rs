//! SQL generator module
//!
//! Walks a lowered Query Operation Tree and emits dialect-specific SQL. The
//! walk starts at the deepest `from`, accumulating clauses into `SelectParts`
//! while a `SqlContext` tracks table aliases and the projected shape; the
//! terminal (if any) reshapes the final statement.

use serde_json::Value;

use crate::error::{GenerationError, GenerationResult, QueryResult, ShapeError};
use crate::ir::{CountOperand, Expression, QueryOperation, SymbolTable, SymbolTarget};
use crate::plan::{QueryPlan, SqlStatement, StatementOptions};

pub mod assemble;
pub mod dialect;
pub mod expression;
pub mod mutation;

use assemble::{SelectParts, Wrapper};

pub use dialect::{PostgreSqlDialect, SqlDialect, SqliteDialect};

/// Per-statement generation state: alias numbering and the current shape.
#[derive(Debug)]
pub struct SqlContext {
    alias_counter: usize,
    pub symbols: SymbolTable,
    pub has_joins: bool,
    /// Alias of the joined table while a join's keys and result selector are
    /// being rendered (resolves `source == Some(1)` references).
    pub inner_alias: Option<String>,
}

impl SqlContext {
    fn new() -> Self {
        Self {
            alias_counter: 0,
            symbols: SymbolTable::new(),
            has_joins: false,
            inner_alias: None,
        }
    }

    /// A context for mutation statements: one unaliased table.
    fn for_mutation() -> Self {
        let mut ctx = Self::new();
        ctx.symbols = SymbolTable::wildcard(None);
        ctx
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.alias_counter);
        self.alias_counter += 1;
        alias
    }
}

/// SQL generator struct
pub struct SqlGenerator {
    dialect: Box<dyn SqlDialect>,
}

impl SqlGenerator {
    /// Creates a new SQL generator instance.
    ///
    /// # Arguments
    ///
    /// * `dialect` - The SQL dialect to use
    pub fn new(dialect: Box<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Binds runtime parameters and generates the SQL statement.
    pub fn generate(&self, plan: &QueryPlan, user_params: &Value) -> QueryResult<SqlStatement> {
        self.generate_with_options(plan, user_params, &StatementOptions::default())
    }

    /// Like [`generate`](Self::generate), invoking `options.on_sql` with the
    /// finished statement before returning it.
    pub fn generate_with_options(
        &self,
        plan: &QueryPlan,
        user_params: &Value,
        options: &StatementOptions,
    ) -> QueryResult<SqlStatement> {
        let finalized = plan.finalize(user_params)?;
        let sql = self.generate_operation(finalized.operation)?;
        let statement = SqlStatement {
            sql,
            params: finalized.params,
        };
        if let Some(on_sql) = &options.on_sql {
            on_sql(&statement);
        }
        Ok(statement)
    }

    /// Generates SQL for a lowered operation tree.
    pub(crate) fn generate_operation(&self, root: &QueryOperation) -> GenerationResult<String> {
        match root {
            QueryOperation::Insert {
                table,
                schema,
                values,
                returning,
            } => self.generate_insert(table, schema.as_deref(), values, returning.as_ref()),
            QueryOperation::Update {
                table,
                schema,
                assignments,
                predicate,
                allow_full_table,
            } => self.generate_update(
                table,
                schema.as_deref(),
                assignments,
                predicate.as_ref(),
                *allow_full_table,
            ),
            QueryOperation::Delete {
                table,
                schema,
                predicate,
                allow_full_table,
            } => {
                self.generate_delete(table, schema.as_deref(), predicate.as_ref(), *allow_full_table)
            }
            _ => self.generate_select(root),
        }
    }

    /// Generates a complete SELECT statement for a query chain.
    fn generate_select(&self, root: &QueryOperation) -> GenerationResult<String> {
        let ops = collect_chain(root);
        let mut ctx = SqlContext::new();
        ctx.has_joins = ops
            .iter()
            .any(|op| matches!(op, QueryOperation::Join { .. }));

        let mut parts = SelectParts::new();
        for op in &ops {
            self.process_operation(op, &mut parts, &mut ctx)?;
        }

        if parts.select_list.is_none() && parts.compound.is_none() && ctx.has_joins {
            parts.select_list = Some(self.shape_select_list(&ctx));
        }

        self.assemble_select(&parts)
    }

    /// Processes one operation on the way up from the `from`.
    fn process_operation(
        &self,
        operation: &QueryOperation,
        parts: &mut SelectParts,
        ctx: &mut SqlContext,
    ) -> GenerationResult<()> {
        // Once a set operation has folded the statement into a compound
        // select, only ordering, pagination, and further set operations can
        // still apply to it.
        if parts.compound.is_some()
            && !matches!(
                operation,
                QueryOperation::SetOp { .. }
                    | QueryOperation::OrderBy { .. }
                    | QueryOperation::ThenBy { .. }
                    | QueryOperation::Reverse { .. }
                    | QueryOperation::Take { .. }
                    | QueryOperation::Skip { .. }
                    | QueryOperation::ToArray { .. }
            )
        {
            return Err(GenerationError::UnsupportedOperation {
                operation: format!("{} after a set operation", operation.operation_name()),
                dialect: self.dialect.dialect_name().to_string(),
            });
        }

        match operation {
            QueryOperation::From { table, schema } => {
                let table_sql = self.qualified_table(schema.as_deref(), table);
                if ctx.has_joins {
                    let alias = ctx.next_alias();
                    parts.from_clause = format!("{} AS {}", table_sql, alias);
                    ctx.symbols = SymbolTable::wildcard(Some(&alias));
                } else {
                    parts.from_clause = table_sql;
                    ctx.symbols = SymbolTable::wildcard(None);
                }
            }

            QueryOperation::Where { predicate, .. } => {
                let sql = self.render_expression(predicate, ctx)?;
                // Predicates over a grouped shape are HAVING conditions.
                if parts.group_by.is_some() {
                    parts.havings.push(sql);
                } else {
                    parts.wheres.push(sql);
                }
            }

            QueryOperation::Select { selector, .. } => {
                self.process_select(selector, parts, ctx)?;
            }

            QueryOperation::Distinct { .. } => parts.distinct = true,

            QueryOperation::OrderBy {
                key, descending, ..
            } => {
                let sql = self.render_expression(key, ctx)?;
                parts.order_by = vec![(sql, *descending)];
            }

            QueryOperation::ThenBy {
                key, descending, ..
            } => {
                let sql = self.render_expression(key, ctx)?;
                parts.order_by.push((sql, *descending));
            }

            QueryOperation::Reverse { .. } => {
                if parts.order_by.is_empty() {
                    return Err(GenerationError::ReverseWithoutOrderBy);
                }
                for (_, descending) in parts.order_by.iter_mut() {
                    *descending = !*descending;
                }
            }

            QueryOperation::Take { count, .. } => {
                parts.limit = Some(self.render_count_operand(count));
            }

            QueryOperation::Skip { count, .. } => {
                parts.offset = Some(self.render_count_operand(count));
            }

            QueryOperation::GroupBy { key, .. } => {
                let rendered = match key {
                    Expression::Object { properties } => {
                        let keys: GenerationResult<Vec<String>> = properties
                            .iter()
                            .map(|(_, expr)| self.render_expression(expr, ctx))
                            .collect();
                        keys?.join(", ")
                    }
                    other => self.render_expression(other, ctx)?,
                };
                parts.group_by = Some(rendered);
            }

            QueryOperation::Join {
                inner,
                outer_key,
                inner_key,
                result_selector,
                kind,
                ..
            } => {
                self.process_join(inner, outer_key, inner_key, result_selector, *kind, parts, ctx)?;
            }

            QueryOperation::SetOp { kind, second, .. } => {
                if parts.select_list.is_none() && parts.compound.is_none() && ctx.has_joins {
                    parts.select_list = Some(self.shape_select_list(ctx));
                }
                let left = self.assemble_select(parts)?;
                let right = self.generate_select(second)?;
                let combined = self.dialect.compound_select(&left, *kind, &right);
                *parts = SelectParts::into_compound(combined);
                // Later clauses address the compound's output columns by name.
                ctx.symbols = SymbolTable::wildcard(None);
            }

            QueryOperation::Count { predicate, .. } => {
                if let Some(predicate) = predicate {
                    let sql = self.render_expression(predicate, ctx)?;
                    if parts.group_by.is_some() {
                        parts.havings.push(sql);
                    } else {
                        parts.wheres.push(sql);
                    }
                }
                parts.select_list = Some("COUNT(*)".to_string());
            }

            QueryOperation::Aggregate {
                function, selector, ..
            } => {
                let operand = match selector {
                    Some(expr) => self.render_expression(expr, ctx)?,
                    None => self.scalar_sql(ctx).ok_or_else(|| {
                        GenerationError::AggregateNeedsScalar {
                            function: operation.operation_name().to_string(),
                        }
                    })?,
                };
                parts.select_list = Some(format!("{}({})", function.sql_name(), operand));
            }

            QueryOperation::Element {
                kind, predicate, ..
            } => {
                if let Some(predicate) = predicate {
                    let sql = self.render_expression(predicate, ctx)?;
                    parts.wheres.push(sql);
                }
                if kind.reverses_ordering() {
                    if parts.order_by.is_empty() {
                        return Err(ShapeError::LastWithoutOrderBy {
                            operation: kind.method_name().to_string(),
                        }
                        .into());
                    }
                    for (_, descending) in parts.order_by.iter_mut() {
                        *descending = !*descending;
                    }
                }
                parts.limit = Some(kind.row_limit().to_string());
            }

            QueryOperation::Any { predicate, .. } => {
                if let Some(predicate) = predicate {
                    let sql = self.render_expression(predicate, ctx)?;
                    parts.wheres.push(sql);
                }
                parts.select_list = Some("1".to_string());
                parts.wrapper = Wrapper::Exists;
            }

            QueryOperation::All { predicate, .. } => {
                let sql = self.render_expression(predicate, ctx)?;
                parts.wheres.push(format!("NOT ({})", sql));
                parts.select_list = Some("1".to_string());
                parts.wrapper = Wrapper::NotExists;
            }

            QueryOperation::Contains { value, .. } => {
                let member = self
                    .scalar_sql(ctx)
                    .ok_or(GenerationError::ContainsNeedsScalar)?;
                let value_sql = self.render_expression(value, ctx)?;
                parts.wheres.push(format!("{} = {}", member, value_sql));
                parts.select_list = Some("1".to_string());
                parts.wrapper = Wrapper::Exists;
            }

            QueryOperation::ToArray { .. } => {}

            QueryOperation::Insert { .. }
            | QueryOperation::Update { .. }
            | QueryOperation::Delete { .. } => {
                // Mutations are dispatched in generate_operation and never
                // appear inside a query chain.
                unreachable!("mutation inside a query chain");
            }
        }

        Ok(())
    }

    /// Handles a select projection: renders the list against the current
    /// shape, then replaces the shape with the projected one.
    fn process_select(
        &self,
        selector: &Expression,
        parts: &mut SelectParts,
        ctx: &mut SqlContext,
    ) -> GenerationResult<()> {
        match selector {
            // Identity selector: the shape is unchanged.
            Expression::AllColumns { source: None } => Ok(()),

            Expression::Object { properties } => {
                let mut list = Vec::with_capacity(properties.len());
                let mut projected = SymbolTable::new();

                for (name, expr) in properties {
                    match expr {
                        Expression::AllColumns { source } => {
                            list.push(self.wildcard_sql(*source, ctx));
                            for (path, target) in ctx.symbols.prefixed(name) {
                                projected.insert(path, target);
                            }
                        }
                        _ => {
                            let sql = self.render_expression(expr, ctx)?;
                            list.push(format!(
                                "{} AS {}",
                                sql,
                                self.dialect.quote_identifier(name)
                            ));
                            projected.insert(name.clone(), self.projection_target(expr, &sql, ctx));
                        }
                    }
                }

                parts.select_list = Some(list.join(", "));
                ctx.symbols = projected;
                Ok(())
            }

            // Scalar projection: remember the single column for aggregate
            // and contains terminals.
            _ => {
                let sql = self.render_expression(selector, ctx)?;
                let target = self.projection_target(selector, &sql, ctx);

                let mut projected = SymbolTable::new();
                if let Expression::Column { path, .. } | Expression::BooleanColumn { path, .. } =
                    selector
                {
                    let short = path.rsplit('.').next().unwrap_or(path);
                    projected.insert(short, target.clone());
                }
                projected.set_scalar(target);

                parts.select_list = Some(sql);
                ctx.symbols = projected;
                Ok(())
            }
        }
    }

    /// The symbol-table target a projected expression maps back to.
    fn projection_target(
        &self,
        expr: &Expression,
        rendered: &str,
        ctx: &SqlContext,
    ) -> SymbolTarget {
        match expr {
            Expression::Column { path, source } | Expression::BooleanColumn { path, source } => {
                match self.resolve_column(path, *source, ctx) {
                    Some((alias, column)) => SymbolTarget::Column { alias, column },
                    None => SymbolTarget::Computed {
                        sql: rendered.to_string(),
                    },
                }
            }
            _ => SymbolTarget::Computed {
                sql: rendered.to_string(),
            },
        }
    }

    fn process_join(
        &self,
        inner: &QueryOperation,
        outer_key: &Expression,
        inner_key: &Expression,
        result_selector: &Expression,
        kind: crate::ir::JoinKind,
        parts: &mut SelectParts,
        ctx: &mut SqlContext,
    ) -> GenerationResult<()> {
        let (join_target, inner_alias) = match inner {
            QueryOperation::From { table, schema } => {
                let alias = ctx.next_alias();
                (
                    format!("{} AS {}", self.qualified_table(schema.as_deref(), table), alias),
                    alias,
                )
            }
            // Anything richer than a bare table joins as a derived table.
            _ => {
                let sub_sql = self.generate_select(inner)?;
                let alias = ctx.next_alias();
                (format!("({}) AS {}", sub_sql, alias), alias)
            }
        };

        let on_clause = self.join_on_clause(outer_key, inner_key, &inner_alias, ctx)?;
        parts
            .joins
            .push(format!("{} {} ON {}", kind.sql_keyword(), join_target, on_clause));

        // The result selector dictates the downstream shape.
        ctx.inner_alias = Some(inner_alias.clone());
        let projected = self.join_result_shape(result_selector, &inner_alias, ctx)?;
        ctx.inner_alias = None;
        ctx.symbols = projected;

        Ok(())
    }

    /// Renders `ON outer = inner`, pairing object keys property-wise.
    fn join_on_clause(
        &self,
        outer_key: &Expression,
        inner_key: &Expression,
        inner_alias: &str,
        ctx: &SqlContext,
    ) -> GenerationResult<String> {
        let mut inner_ctx = SqlContext::new();
        inner_ctx.symbols = SymbolTable::wildcard(Some(inner_alias));
        inner_ctx.has_joins = true;

        match (outer_key, inner_key) {
            (
                Expression::Object { properties: outer },
                Expression::Object { properties: inner },
            ) => {
                let mut pairs = Vec::with_capacity(outer.len());
                for (name, outer_expr) in outer {
                    let inner_expr = inner
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, e)| e)
                        .ok_or_else(|| GenerationError::UnsupportedOperation {
                            operation: format!("join key '{}' missing on the inner side", name),
                            dialect: self.dialect.dialect_name().to_string(),
                        })?;
                    pairs.push(format!(
                        "{} = {}",
                        self.render_expression(outer_expr, ctx)?,
                        self.render_expression(inner_expr, &inner_ctx)?
                    ));
                }
                Ok(pairs.join(" AND "))
            }
            _ => Ok(format!(
                "{} = {}",
                self.render_expression(outer_key, ctx)?,
                self.render_expression(inner_key, &inner_ctx)?
            )),
        }
    }

    /// Builds the post-join symbol table from the result selector.
    fn join_result_shape(
        &self,
        result_selector: &Expression,
        inner_alias: &str,
        ctx: &SqlContext,
    ) -> GenerationResult<SymbolTable> {
        let mut projected = SymbolTable::new();

        match result_selector {
            Expression::Object { properties } => {
                for (name, expr) in properties {
                    match expr {
                        Expression::AllColumns { source: Some(1) } => {
                            projected.insert(
                                name.clone(),
                                SymbolTarget::Wildcard {
                                    alias: Some(inner_alias.to_string()),
                                },
                            );
                        }
                        Expression::AllColumns { .. } => {
                            for (path, target) in ctx.symbols.prefixed(name) {
                                projected.insert(path, target);
                            }
                        }
                        _ => {
                            let sql = self.render_expression(expr, ctx)?;
                            projected.insert(name.clone(), self.projection_target(expr, &sql, ctx));
                        }
                    }
                }
            }
            Expression::AllColumns { source: Some(1) } => {
                projected = SymbolTable::wildcard(Some(inner_alias));
            }
            Expression::AllColumns { .. } => {
                projected = ctx.symbols.clone();
            }
            _ => {
                let sql = self.render_expression(result_selector, ctx)?;
                projected.set_scalar(SymbolTarget::Computed { sql });
            }
        }

        Ok(projected)
    }

    /// Default projection for a joined shape with no explicit select.
    fn shape_select_list(&self, ctx: &SqlContext) -> String {
        let mut list = Vec::new();
        for (path, target) in ctx.symbols.entries() {
            // Dotted entries are reachable through their row wildcard.
            if path.contains('.') {
                continue;
            }
            match target {
                SymbolTarget::Wildcard { alias: Some(alias) } => list.push(format!("{}.*", alias)),
                SymbolTarget::Wildcard { alias: None } => list.push("*".to_string()),
                SymbolTarget::Column { alias, column } => list.push(format!(
                    "{} AS {}",
                    self.column_sql(alias.as_deref(), column, ctx),
                    self.dialect.quote_identifier(path)
                )),
                SymbolTarget::Computed { sql } => list.push(format!(
                    "{} AS {}",
                    sql,
                    self.dialect.quote_identifier(path)
                )),
            }
        }
        if list.is_empty() {
            "*".to_string()
        } else {
            list.join(", ")
        }
    }

    /// The SQL for "the" scalar column of the current shape, when one exists.
    fn scalar_sql(&self, ctx: &SqlContext) -> Option<String> {
        match ctx.symbols.scalar()? {
            SymbolTarget::Column { alias, column } => {
                Some(self.column_sql(alias.as_deref(), column, ctx))
            }
            SymbolTarget::Computed { sql } => Some(sql.clone()),
            SymbolTarget::Wildcard { .. } => None,
        }
    }

    fn render_count_operand(&self, operand: &CountOperand) -> String {
        match operand {
            CountOperand::Auto { name } => self.dialect.format_parameter(name),
            CountOperand::Param { name, property } => self
                .dialect
                .format_parameter(property.as_deref().unwrap_or(name)),
        }
    }

    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.dialect.quote_identifier(schema),
                self.dialect.quote_identifier(table)
            ),
            None => self.dialect.quote_identifier(table),
        }
    }
}

/// Flattens the linked operation list into from-first order.
fn collect_chain(root: &QueryOperation) -> Vec<&QueryOperation> {
    let mut ops = Vec::new();
    let mut current = Some(root);
    while let Some(op) = current {
        ops.push(op);
        current = op.source();
    }
    ops.reverse();
    ops
}

#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;
