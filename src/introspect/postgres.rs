use postgres::Client;
use tracing::{debug, error, info, trace};

use super::{Introspector, TableFilter};
use crate::prelude::GraftError;
use crate::schema::{Column, CompositeType, DataType, EnumType, Schema, Table, TypeDescriptor};

/// PostgreSQL introspector
pub struct PostgresIntrospector<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresIntrospector<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }
}

impl Introspector for PostgresIntrospector<'_> {
    fn introspect(
        &mut self,
        schema_name: &str,
        filter: &TableFilter,
    ) -> Result<Schema, GraftError> {
        info!(schema = ?schema_name, "Starting schema introspection");

        let enums = query_enums(self.client, schema_name)?;
        debug!(count = ?enums.len(), "Found enum types");

        let composites = query_composites(self.client, schema_name)?;
        debug!(count = ?composites.len(), "Found composite types");

        let all_table_names = query_relations(self.client, schema_name, 'r')?;
        debug!(count = ?all_table_names.len(), "Found all tables");

        let table_names: Vec<String> = all_table_names
            .into_iter()
            .filter(|name| filter.should_include(name))
            .collect();
        debug!(count = ?table_names.len(), "Tables after filtering");

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            debug!(table = ?table_name, "Introspecting table");

            let columns = query_columns(self.client, schema_name, &table_name)?;
            trace!(table = ?table_name, columns = ?columns.len(), "Found columns");

            tables.push(Table {
                name: table_name,
                columns,
            });
        }

        info!(
            schema = ?schema_name,
            tables = ?tables.len(),
            enums = ?enums.len(),
            composites = ?composites.len(),
            "Schema introspection complete"
        );

        Ok(Schema {
            name: schema_name.to_string(),
            tables,
            enums,
            composites,
            queries: Vec::new(),
        })
    }
}

/// Query relation names of one kind ('r' tables, 'c' composite types)
fn query_relations(
    client: &mut Client,
    schema_name: &str,
    relkind: char,
) -> Result<Vec<String>, GraftError> {
    trace!(schema = ?schema_name, relkind = ?relkind, "Querying relations");

    let sql = r#"
        SELECT c.relname AS relation_name
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind::text = $2
            AND n.nspname = $1
        ORDER BY c.relname
    "#;

    let kind = relkind.to_string();
    let rows = client
        .query(sql, &[&schema_name, &kind])
        .map_err(|e| GraftError::Introspection {
            schema: schema_name.to_string(),
            message: format!("Failed to query relations: {}", e),
        })?;

    let relations: Vec<String> = rows.iter().map(|row| row.get("relation_name")).collect();
    trace!(relations = ?relations, "Relations found");
    Ok(relations)
}

/// Query all columns (attributes) of a table or composite type
fn query_columns(
    client: &mut Client,
    schema_name: &str,
    relation_name: &str,
) -> Result<Vec<Column>, GraftError> {
    trace!(schema = ?schema_name, relation = ?relation_name, "Querying columns");

    let sql = r#"
        SELECT
            a.attname AS column_name,
            format_type(a.atttypid, a.atttypmod) AS data_type,
            NOT a.attnotnull AS is_nullable
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relname = $1
            AND n.nspname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let rows = client
        .query(sql, &[&relation_name, &schema_name])
        .map_err(|e| {
            error!(
                schema = ?schema_name,
                relation = ?relation_name,
                error = ?e,
                "Failed to query columns"
            );
            GraftError::Introspection {
                schema: schema_name.to_string(),
                message: format!("Failed to query columns for '{}': {}", relation_name, e),
            }
        })?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let column_name: String = row.get("column_name");
        let data_type_str: String = row.get("data_type");
        let is_nullable: bool = row.get("is_nullable");

        let (parsed, is_array) = DataType::parse(&data_type_str);
        trace!(
            column = ?column_name,
            data_type = ?data_type_str,
            parsed_type = ?parsed,
            is_array = ?is_array,
            is_nullable = ?is_nullable,
            "Parsed column"
        );

        columns.push(Column {
            name: column_name,
            data_type: TypeDescriptor {
                name: data_type_str,
                is_array,
                is_nullable,
            },
        });
    }

    Ok(columns)
}

/// Query all composite types in a schema
fn query_composites(
    client: &mut Client,
    schema_name: &str,
) -> Result<Vec<CompositeType>, GraftError> {
    trace!(schema = ?schema_name, "Querying composite types");

    let names = query_relations(client, schema_name, 'c')?;
    let mut composites = Vec::with_capacity(names.len());
    for name in names {
        // Composite attributes carry no NOT NULL constraint
        let columns = query_columns(client, schema_name, &name)?;
        trace!(composite = ?name, columns = ?columns.len(), "Composite type");
        composites.push(CompositeType { name, columns });
    }

    Ok(composites)
}

/// Query all enum types in a schema
fn query_enums(client: &mut Client, schema_name: &str) -> Result<Vec<EnumType>, GraftError> {
    trace!(schema = ?schema_name, "Querying enum types");

    let sql = r#"
        SELECT
            t.typname AS enum_name,
            e.enumlabel AS enum_value
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = $1
        ORDER BY t.typname, e.enumsortorder
    "#;

    let rows = client.query(sql, &[&schema_name]).map_err(|e| {
        error!(schema = ?schema_name, error = ?e, "Failed to query enum types");
        GraftError::Introspection {
            schema: schema_name.to_string(),
            message: format!("Failed to query enums: {}", e),
        }
    })?;

    // Group enum values by enum name
    let mut enums: Vec<EnumType> = Vec::new();
    for row in rows {
        let enum_name: String = row.get("enum_name");
        let enum_value: String = row.get("enum_value");

        if let Some(existing) = enums.iter_mut().find(|e| e.name == enum_name) {
            existing.values.push(enum_value);
        } else {
            trace!(enum_name = ?enum_name, "Found new enum type");
            enums.push(EnumType {
                name: enum_name,
                values: vec![enum_value],
            });
        }
    }

    for e in &enums {
        trace!(name = ?e.name, values = ?e.values, "Enum type");
    }

    Ok(enums)
}
