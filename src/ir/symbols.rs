//! Symbol table for projected shapes.
//!
//! Maps projected property paths (`"userName"`, `"u.name"`) to their source:
//! a concrete table column, a wildcard over a table alias, or a computed SQL
//! fragment. Entries keep source (insertion) order so default projections are
//! deterministic. Projections replace the shape wholesale, so one flat table
//! is enough; there is no scope stack.

/// Where a projected path points.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolTarget {
    /// A concrete column; `alias` is `None` for single-table statements.
    Column {
        alias: Option<String>,
        column: String,
    },
    /// A whole row: every path under this entry is a column of `alias`
    /// (`alias` is `None` when the statement has a single unaliased table).
    Wildcard { alias: Option<String> },
    /// An already-rendered SQL fragment for a computed projection.
    Computed { sql: String },
}

/// Resolution result for a dotted path lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Column {
        alias: Option<String>,
        column: String,
    },
    Computed {
        sql: String,
    },
    /// No entry matched; callers quote the path verbatim.
    Unknown,
}

/// Insertion-ordered symbol table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    entries: Vec<(String, SymbolTarget)>,
    /// Set by a scalar projection (`select(x => x.category)`), used by
    /// aggregate/contains terminals that need "the" column.
    scalar: Option<SymbolTarget>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh shape over one table: every path resolves into the alias.
    pub fn wildcard(alias: Option<&str>) -> Self {
        let mut table = Self::new();
        table.insert(
            "*",
            SymbolTarget::Wildcard {
                alias: alias.map(str::to_string),
            },
        );
        table
    }

    pub fn insert(&mut self, path: impl Into<String>, target: SymbolTarget) {
        let path = path.into();
        if let Some(existing) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            existing.1 = target;
        } else {
            self.entries.push((path, target));
        }
    }

    pub fn set_scalar(&mut self, target: SymbolTarget) {
        self.scalar = Some(target);
    }

    pub fn scalar(&self) -> Option<&SymbolTarget> {
        self.scalar.as_ref()
    }

    pub fn get(&self, path: &str) -> Option<&SymbolTarget> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, t)| t)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &SymbolTarget)> {
        self.entries.iter().map(|(p, t)| (p.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a dotted path: exact entry first, then a wildcard prefix
    /// (`"u.name"` through the `"u"` wildcard), then the whole-shape
    /// wildcard (`"*"`).
    pub fn resolve(&self, path: &str) -> Resolution {
        if let Some(target) = self.get(path) {
            return match target {
                SymbolTarget::Column { alias, column } => Resolution::Column {
                    alias: alias.clone(),
                    column: column.clone(),
                },
                SymbolTarget::Wildcard { .. } => Resolution::Unknown,
                SymbolTarget::Computed { sql } => Resolution::Computed { sql: sql.clone() },
            };
        }

        if let Some((head, rest)) = path.split_once('.') {
            if let Some(SymbolTarget::Wildcard { alias }) = self.get(head) {
                return Resolution::Column {
                    alias: alias.clone(),
                    column: rest.to_string(),
                };
            }
        }

        if let Some(SymbolTarget::Wildcard { alias }) = self.get("*") {
            return Resolution::Column {
                alias: alias.clone(),
                column: path.to_string(),
            };
        }

        Resolution::Unknown
    }

    /// Re-roots every entry of `self` under `prefix`, for result selectors
    /// that embed a whole shape as one property.
    pub fn prefixed(&self, prefix: &str) -> Vec<(String, SymbolTarget)> {
        self.entries
            .iter()
            .map(|(path, target)| {
                let new_path = if path == "*" {
                    prefix.to_string()
                } else {
                    format!("{}.{}", prefix, path)
                };
                (new_path, target.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaliased_wildcard_resolution() {
        let table = SymbolTable::wildcard(None);
        assert_eq!(
            table.resolve("age"),
            Resolution::Column {
                alias: None,
                column: "age".to_string()
            }
        );
    }

    #[test]
    fn test_aliased_wildcard_resolution() {
        let table = SymbolTable::wildcard(Some("t0"));
        assert_eq!(
            table.resolve("age"),
            Resolution::Column {
                alias: Some("t0".to_string()),
                column: "age".to_string()
            }
        );
    }

    #[test]
    fn test_exact_entry_wins_over_wildcard() {
        let mut table = SymbolTable::wildcard(Some("t0"));
        table.insert(
            "userName",
            SymbolTarget::Column {
                alias: Some("t0".to_string()),
                column: "name".to_string(),
            },
        );
        assert_eq!(
            table.resolve("userName"),
            Resolution::Column {
                alias: Some("t0".to_string()),
                column: "name".to_string()
            }
        );
    }

    #[test]
    fn test_dotted_path_through_row_wildcard() {
        let mut table = SymbolTable::new();
        table.insert(
            "u",
            SymbolTarget::Wildcard {
                alias: Some("t0".to_string()),
            },
        );
        table.insert(
            "o",
            SymbolTarget::Wildcard {
                alias: Some("t1".to_string()),
            },
        );
        assert_eq!(
            table.resolve("o.total"),
            Resolution::Column {
                alias: Some("t1".to_string()),
                column: "total".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_path() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve("mystery"), Resolution::Unknown);
    }

    #[test]
    fn test_prefixed_reroots_wildcard_and_entries() {
        let mut table = SymbolTable::wildcard(Some("t0"));
        table.insert(
            "name",
            SymbolTarget::Column {
                alias: Some("t0".to_string()),
                column: "name".to_string(),
            },
        );
        let rerooted = table.prefixed("u");
        assert_eq!(rerooted[0].0, "u");
        assert_eq!(rerooted[1].0, "u.name");
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut table = SymbolTable::new();
        table.insert("b", SymbolTarget::Computed { sql: "1".into() });
        table.insert("a", SymbolTarget::Computed { sql: "2".into() });
        let order: Vec<&str> = table.entries().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
