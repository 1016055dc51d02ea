// SQL assembly helpers.

use crate::error::GenerationResult;

use super::SqlGenerator;

/// Terminal wrappers around the assembled SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) enum Wrapper {
    #[default]
    None,
    Exists,
    NotExists,
}

/// Struct to store SQL query components while walking the operation tree.
#[derive(Debug, Default)]
pub(super) struct SelectParts {
    pub(super) select_list: Option<String>,
    pub(super) distinct: bool,
    pub(super) from_clause: String,
    pub(super) joins: Vec<String>,
    pub(super) wheres: Vec<String>,
    pub(super) group_by: Option<String>,
    pub(super) havings: Vec<String>,
    /// Rendered key plus descending flag, in emission order.
    pub(super) order_by: Vec<(String, bool)>,
    pub(super) limit: Option<String>,
    pub(super) offset: Option<String>,
    pub(super) wrapper: Wrapper,
    /// Set once a set operation folded the statement into a compound select;
    /// later clauses append to it textually.
    pub(super) compound: Option<String>,
}

impl SelectParts {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Restarts the parts around an already-combined compound select.
    pub(super) fn into_compound(combined: String) -> Self {
        Self {
            compound: Some(combined),
            ..Self::default()
        }
    }
}

impl SqlGenerator {
    /// Assembles the final SELECT statement from collected parts.
    pub(super) fn assemble_select(&self, parts: &SelectParts) -> GenerationResult<String> {
        let mut sql = match &parts.compound {
            Some(combined) => combined.clone(),
            None => {
                let mut sql = String::from("SELECT ");
                if parts.distinct {
                    sql.push_str("DISTINCT ");
                }
                sql.push_str(parts.select_list.as_deref().unwrap_or("*"));
                sql.push_str(" FROM ");
                sql.push_str(&parts.from_clause);

                for join in &parts.joins {
                    sql.push(' ');
                    sql.push_str(join);
                }

                if !parts.wheres.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&parts.wheres.join(" AND "));
                }

                if let Some(group_by) = &parts.group_by {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(group_by);
                }

                if !parts.havings.is_empty() {
                    sql.push_str(" HAVING ");
                    sql.push_str(&parts.havings.join(" AND "));
                }

                sql
            }
        };

        if !parts.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let rendered: Vec<String> = parts
                .order_by
                .iter()
                .map(|(key, descending)| {
                    format!("{} {}", key, if *descending { "DESC" } else { "ASC" })
                })
                .collect();
            sql.push_str(&rendered.join(", "));
        }

        if let Some(pagination) = self
            .dialect
            .pagination_clause(parts.limit.as_deref(), parts.offset.as_deref())
        {
            sql.push(' ');
            sql.push_str(&pagination);
        }

        Ok(match parts.wrapper {
            Wrapper::None => sql,
            Wrapper::Exists => format!("SELECT EXISTS ({sql})"),
            Wrapper::NotExists => format!("SELECT NOT EXISTS ({sql})"),
        })
    }
}
