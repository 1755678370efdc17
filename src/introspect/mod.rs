//! Database introspection
//!
//! This module provides functionality for extracting schema information
//! from databases. Each supported database has its own feature-gated submodule.

use crate::prelude::{GraftError, Schema};

/// Filters to apply to the table list before code generation
#[derive(Debug, Default, Clone)]
pub struct TableFilter {
    /// Only include these tables (if Some)
    pub include: Option<Vec<String>>,
    /// Exclude these tables
    pub exclude: Option<Vec<String>>,
    /// Migration bookkeeping table, never generated
    pub bookkeeping_table: Option<String>,
}

impl TableFilter {
    pub fn with_bookkeeping_table(mut self, name: impl Into<String>) -> Self {
        self.bookkeeping_table = Some(name.into());
        self
    }

    /// Check if a table should be included
    pub fn should_include(&self, table_name: &str) -> bool {
        if self.bookkeeping_table.as_deref() == Some(table_name) {
            return false;
        }

        // Check include list
        if let Some(include) = &self.include {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        // Check exclude list
        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        true
    }
}

/// Trait for database introspection implementations
pub trait Introspector {
    /// Introspect tables, enums and composite types of a database schema
    fn introspect(&mut self, schema_name: &str, filter: &TableFilter)
        -> Result<Schema, GraftError>;
}

// Feature-gated database implementations
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresIntrospector;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_include_default() {
        assert!(TableFilter::default().should_include("users"));
    }

    #[test]
    fn test_should_include_lists() {
        let filter = TableFilter {
            include: Some(vec!["users".into(), "posts".into()]),
            exclude: Some(vec!["posts".into()]),
            bookkeeping_table: None,
        };
        assert!(filter.should_include("users"));
        assert!(!filter.should_include("posts"));
        assert!(!filter.should_include("comments"));
    }

    #[test]
    fn test_bookkeeping_table_always_excluded() {
        let filter = TableFilter {
            include: Some(vec!["schema_migrations".into()]),
            ..Default::default()
        }
        .with_bookkeeping_table("schema_migrations");
        assert!(!filter.should_include("schema_migrations"));
    }
}
