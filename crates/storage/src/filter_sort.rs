//! Turns query criteria into SQL fragments without touching the database.
//!
//! [`shape`] validates the criteria against an entity's column metadata and
//! returns a [`QueryShape`], which appends its `WHERE`, `ORDER BY` and
//! `LIMIT/OFFSET` clauses to any [`QueryBuilder`] it is given.

use shared::query::{ColumnFilter, PageRequest, QueryCriteria};
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use crate::entity::{fold_case, folded_column, Column, ColumnKind, Entity, ID_COLUMN};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("unknown sort field '{0}'")]
    UnknownSortField(String),
    #[error("unknown filter column '{0}'")]
    UnknownFilterColumn(String),
    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
}

impl CriteriaError {
    /// Field the failure should be reported against.
    pub fn field(&self) -> &str {
        match self {
            CriteriaError::UnknownSortField(_) => "sort_field",
            CriteriaError::UnknownFilterColumn(column) | CriteriaError::NotNumeric(column) => {
                column
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Search {
        columns: &'static [&'static str],
        pattern: String,
    },
    Equals {
        column: &'static str,
        value: String,
    },
    AtLeast {
        column: &'static str,
        value: i64,
    },
    AtMost {
        column: &'static str,
        value: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    predicates: Vec<Predicate>,
    order_by: String,
    window: Option<PageRequest>,
}

pub fn shape<E: Entity>(criteria: &QueryCriteria) -> Result<QueryShape, CriteriaError> {
    let mut predicates = Vec::new();

    if let Some(text) = criteria.effective_filter() {
        predicates.push(Predicate::Search {
            columns: E::SEARCH_COLUMNS,
            pattern: format!("%{}%", escape_like(&fold_case(text))),
        });
    }

    for filter in &criteria.column_filters {
        let column = E::column(filter.column())
            .ok_or_else(|| CriteriaError::UnknownFilterColumn(filter.column().to_string()))?;
        predicates.push(match filter {
            ColumnFilter::Equals { value, .. } => Predicate::Equals {
                column: column.name,
                value: value.clone(),
            },
            ColumnFilter::AtLeast { value, .. } => Predicate::AtLeast {
                column: numeric(column)?.name,
                value: *value,
            },
            ColumnFilter::AtMost { value, .. } => Predicate::AtMost {
                column: numeric(column)?.name,
                value: *value,
            },
        });
    }

    let order_by = match criteria.effective_sort_field() {
        Some(field) => {
            let column = sort_column::<E>(field)?;
            order_clause(column, criteria.descending)
        }
        None => format!("{} ASC", ID_COLUMN.name),
    };

    Ok(QueryShape {
        predicates,
        order_by,
        window: criteria.page.filter(|page| page.size > 0),
    })
}

/// Resolves a sortable column by name.
pub fn sort_column<E: Entity>(field: &str) -> Result<Column, CriteriaError> {
    E::column(field).ok_or_else(|| CriteriaError::UnknownSortField(field.to_string()))
}

fn numeric(column: Column) -> Result<Column, CriteriaError> {
    match column.kind {
        ColumnKind::Integer => Ok(column),
        ColumnKind::Text => Err(CriteriaError::NotNumeric(column.name.to_string())),
    }
}

fn order_clause(column: Column, descending: bool) -> String {
    let direction = if descending { "DESC" } else { "ASC" };
    let key = match column.kind {
        ColumnKind::Text => format!("LOWER({})", column.name),
        ColumnKind::Integer => column.name.to_string(),
    };
    // Equal keys keep store order in both directions.
    if column.name == ID_COLUMN.name {
        format!("{key} {direction}")
    } else {
        format!("{key} {direction}, {} ASC", ID_COLUMN.name)
    }
}

/// Escapes `LIKE` wildcards so user text matches literally under `ESCAPE '\'`.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl QueryShape {
    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn window(&self) -> Option<PageRequest> {
        self.window
    }

    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (index, predicate) in self.predicates.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            match predicate {
                Predicate::Search { columns, pattern } => {
                    builder.push("(");
                    for (position, column) in columns.iter().enumerate() {
                        if position > 0 {
                            builder.push(" OR ");
                        }
                        builder.push(format!("{} LIKE ", folded_column(column)));
                        builder.push_bind(pattern.clone());
                        builder.push(" ESCAPE '\\'");
                    }
                    builder.push(")");
                }
                Predicate::Equals { column, value } => {
                    builder.push(format!("{column} = "));
                    builder.push_bind(value.clone());
                }
                Predicate::AtLeast { column, value } => {
                    builder.push(format!("{column} >= "));
                    builder.push_bind(*value);
                }
                Predicate::AtMost { column, value } => {
                    builder.push(format!("{column} <= "));
                    builder.push_bind(*value);
                }
            }
        }
    }

    pub fn push_order(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" ORDER BY ");
        builder.push(&self.order_by);
    }

    pub fn push_window(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        let Some(page) = self.window else {
            return;
        };
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(page.size));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
    }

    pub fn apply(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        self.push_where(builder);
        self.push_order(builder);
        self.push_window(builder);
    }
}

#[cfg(test)]
#[path = "tests/filter_sort_tests.rs"]
mod tests;
