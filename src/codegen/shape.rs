//! Query shape resolution
//!
//! Decides, independently of the target language, what a query's generated
//! function returns and whether its rows can reuse an existing table type.

use std::collections::HashSet;

use tracing::trace;

use crate::schema::{Query, QueryResultShape, Table};

/// What the generated function hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// A single row plus a failure indicator
    One,
    /// A sequence of rows plus a failure indicator
    Many,
    /// Only a failure indicator
    ErrorOnly,
    /// Affected row count plus a failure indicator
    AffectedRows,
}

/// Row type used by a row-returning query
#[derive(Debug, Clone, Copy)]
pub enum RowBinding<'a> {
    /// Rows decode into an existing table type
    Table(&'a Table),
    /// A dedicated row type is generated for this query
    Synthesized,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryPlan<'a> {
    pub query: &'a Query,
    pub returns: ReturnShape,
    /// `None` for Exec and ExecRows
    pub row: Option<RowBinding<'a>>,
}

impl QueryPlan<'_> {
    pub fn synthesizes_row(&self) -> bool {
        matches!(self.row, Some(RowBinding::Synthesized))
    }
}

/// Resolve the function shape and row binding of a query
pub fn plan_query<'a>(query: &'a Query, tables: &'a [Table]) -> QueryPlan<'a> {
    let returns = match query.shape {
        QueryResultShape::Row => ReturnShape::One,
        QueryResultShape::Rows => ReturnShape::Many,
        QueryResultShape::Exec => ReturnShape::ErrorOnly,
        QueryResultShape::ExecRows => ReturnShape::AffectedRows,
    };

    let row = match returns {
        ReturnShape::One | ReturnShape::Many => Some(
            reusable_table(query, tables)
                .map(RowBinding::Table)
                .unwrap_or(RowBinding::Synthesized),
        ),
        ReturnShape::ErrorOnly | ReturnShape::AffectedRows => None,
    };

    let row_type = match row {
        Some(RowBinding::Table(table)) => table.name.as_str(),
        Some(RowBinding::Synthesized) => "<synthesized>",
        None => "<none>",
    };
    trace!(query = ?query.name, returns = ?returns, row = row_type, "Planned query");

    QueryPlan {
        query,
        returns,
        row,
    }
}

/// First table whose column-name set equals the query's, if any
///
/// Queries with a JSON aggregate column never reuse a table type.
pub fn reusable_table<'a>(query: &Query, tables: &'a [Table]) -> Option<&'a Table> {
    if query.columns.iter().any(|c| c.is_json_aggregate) {
        return None;
    }

    let names: HashSet<&str> = query.columns.iter().map(|c| c.name.as_str()).collect();
    if names.is_empty() {
        return None;
    }

    tables.iter().find(|table| table.column_names() == names)
}
