//! Schema data structures
//!
//! These types form the intermediate representation (IR) handed to code
//! generation: tables, enums and composite types, plus the parameterized
//! queries written against them. They are produced by an external parser
//! (as JSON) or by database introspection, and are read-only afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use heck::{ToPascalCase, ToSnakeCase};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::GraftError;
use crate::introspect::TableFilter;

/// A complete schema plus the queries written against it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default = "default_schema_name")]
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
    #[serde(default)]
    pub composites: Vec<CompositeType>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

fn default_schema_name() -> String {
    "public".to_string()
}

impl Schema {
    /// Load a schema from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, GraftError> {
        let schema: Schema =
            serde_json::from_str(json).map_err(|e| GraftError::Schema(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema from a JSON file on disk
    pub fn from_json_file(path: &Path) -> Result<Self, GraftError> {
        debug!(path = ?path, "Loading schema document");
        let json = fs::read_to_string(path).map_err(|e| GraftError::io(path, e))?;
        Self::from_json_str(&json)
    }

    /// Drop tables rejected by the filter (including the bookkeeping table)
    pub fn apply_filter(&mut self, filter: &TableFilter) {
        let before = self.tables.len();
        self.tables.retain(|table| filter.should_include(&table.name));
        trace!(before = before, after = self.tables.len(), "Applied table filter");
    }

    /// Find a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Structural checks the generators rely on
    fn validate(&self) -> Result<(), GraftError> {
        for query in &self.queries {
            for column in &query.columns {
                if column.is_json_aggregate && column.json_element_table.is_none() {
                    return Err(GraftError::Schema(format!(
                        "query '{}': JSON aggregate column '{}' has no element table",
                        query.name, column.name
                    )));
                }
            }

            let mut seen = HashSet::new();
            for param in &query.parameters {
                if param.position == 0 || !seen.insert(param.position) {
                    return Err(GraftError::Schema(format!(
                        "query '{}': parameter '{}' has invalid position {}",
                        query.name, param.name, param.position
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Portable type reference as written in the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_nullable: bool,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_array: false,
            is_nullable: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }
}

/// Database table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    /// Returns the PascalCase type name
    pub fn type_name(&self) -> String {
        to_pascal_case(&self.name)
    }

    /// Name of the companion type holding hand-written fields
    pub fn extension_name(&self) -> String {
        format!("{}Extension", self.type_name())
    }

    /// Column names as a set, for order-independent comparison
    pub fn column_names(&self) -> HashSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A table or composite type column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: TypeDescriptor,
}

/// A custom enum type defined in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A composite (row) type defined in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeType {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// Result cardinality of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResultShape {
    /// Exactly one row
    Row,
    /// Any number of rows
    Rows,
    /// No result, success or failure only
    Exec,
    /// Affected row count
    ExecRows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: TypeDescriptor,
    /// 1-based, matches the positional placeholder
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: TypeDescriptor,
    #[serde(default)]
    pub is_json_aggregate: bool,
    /// Table whose rows are aggregated, only set for JSON aggregates
    #[serde(default)]
    pub json_element_table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
    pub shape: QueryResultShape,
    #[serde(default)]
    pub columns: Vec<QueryColumn>,
    pub sql: String,
}

impl Query {
    /// Parameters in placeholder order
    pub fn ordered_parameters(&self) -> Vec<&QueryParameter> {
        let mut params: Vec<&QueryParameter> = self.parameters.iter().collect();
        params.sort_by_key(|p| p.position);
        params
    }
}

/// Canonical database type, independent of any target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Boolean,
    Text,
    Binary,
    Uuid,
    Json,
    JsonBinary,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Numeric,
    Money,
    /// inet, cidr, macaddr
    Network,
    /// bit, bit varying
    BitString,
    Xml,
    /// point, line, polygon, ...
    Geometric,
    /// tsvector, tsquery
    FullText,
    Oid,
    /// Anything outside the catalog, stores the type name as written
    Custom(String),
}

impl DataType {
    /// Normalize a raw type name and report whether it carried array markers
    pub fn parse(raw: &str) -> (DataType, bool) {
        let (base, mut is_array) = strip_array_markers(raw.trim());
        let lower = base.to_lowercase();
        let normalized = strip_modifiers(lower.trim_start_matches("pg_catalog."));

        if let Some(builtin) = builtin_type(&normalized) {
            return (builtin, is_array);
        }

        // Internal array names such as _int4
        if let Some(element) = normalized.strip_prefix('_') {
            if let Some(builtin) = builtin_type(element) {
                is_array = true;
                return (builtin, is_array);
            }
        }

        (DataType::Custom(custom_type_name(base)), is_array)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, DataType::Custom(_))
    }
}

fn strip_array_markers(raw: &str) -> (&str, bool) {
    let mut name = raw;
    let mut is_array = false;
    loop {
        if let Some(stripped) = name.strip_suffix("[]") {
            name = stripped.trim_end();
            is_array = true;
        } else if let Some(element) = strip_suffix_ignore_case(name, " array") {
            name = element.trim_end();
            is_array = true;
        } else {
            return (name, is_array);
        }
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

/// Remove precision/scale modifiers and collapse whitespace
fn strip_modifiers(type_str: &str) -> String {
    let mut out = String::with_capacity(type_str.len());
    let mut depth = 0usize;
    for ch in type_str.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn builtin_type(name: &str) -> Option<DataType> {
    // Timestamps before times: "timestamp" also starts with "time"
    if name.starts_with("timestamp") {
        if name == "timestamptz" || name.contains("with time zone") {
            return Some(DataType::TimestampTz);
        }
        return Some(DataType::Timestamp);
    }
    if name == "time" || name == "timetz" || name.starts_with("time ") {
        if name == "timetz" || name.contains("with time zone") {
            return Some(DataType::TimeTz);
        }
        return Some(DataType::Time);
    }
    if name == "character" || name.starts_with("character ") || name == "char" {
        return Some(DataType::Text);
    }
    if name == "varchar" || name == "nvarchar" || name == "nchar" {
        return Some(DataType::Text);
    }
    if name == "numeric" || name == "decimal" {
        return Some(DataType::Numeric);
    }

    let data_type = match name {
        "smallint" | "int2" | "smallserial" | "serial2" => DataType::SmallInt,
        "integer" | "int" | "int4" | "serial" | "serial4" => DataType::Integer,
        "bigint" | "int8" | "bigserial" | "serial8" => DataType::BigInt,
        "real" | "float4" => DataType::Real,
        "double precision" | "float8" | "float" => DataType::DoublePrecision,
        "boolean" | "bool" => DataType::Boolean,
        "text" | "citext" | "name" | "bpchar" => DataType::Text,
        "bytea" => DataType::Binary,
        "uuid" => DataType::Uuid,
        "json" => DataType::Json,
        "jsonb" => DataType::JsonBinary,
        "date" => DataType::Date,
        "interval" => DataType::Interval,
        "money" => DataType::Money,
        "inet" | "cidr" | "macaddr" | "macaddr8" => DataType::Network,
        "bit" | "bit varying" | "varbit" => DataType::BitString,
        "xml" => DataType::Xml,
        "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle" => {
            DataType::Geometric
        }
        "tsvector" | "tsquery" => DataType::FullText,
        "oid" => DataType::Oid,
        _ => return None,
    };
    Some(data_type)
}

/// User-defined type name without schema qualifier or identifier quotes
fn custom_type_name(raw: &str) -> String {
    let unqualified = raw.rsplit('.').next().unwrap_or(raw);
    unqualified.trim().trim_matches('"').to_string()
}

/// Convert an identifier to PascalCase
///
/// This is a shared utility used by code generators for all target languages.
pub fn to_pascal_case(s: &str) -> String {
    s.to_pascal_case()
}

/// Convert an identifier to snake_case, used for artifact file names
pub fn to_snake_case(s: &str) -> String {
    s.to_snake_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> DataType {
        DataType::parse(raw).0
    }

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(parse("integer"), DataType::Integer);
        assert_eq!(parse("int"), DataType::Integer);
        assert_eq!(parse("bigint"), DataType::BigInt);
        assert_eq!(parse("boolean"), DataType::Boolean);
        assert_eq!(parse("text"), DataType::Text);
        assert_eq!(parse("uuid"), DataType::Uuid);
        assert_eq!(parse("jsonb"), DataType::JsonBinary);
        assert_eq!(parse("  INTEGER "), DataType::Integer);
        assert_eq!(parse("pg_catalog.int8"), DataType::BigInt);
    }

    #[test]
    fn test_parse_families_collapse() {
        assert_eq!(parse("varchar(255)"), DataType::Text);
        assert_eq!(parse("character varying(100)"), DataType::Text);
        assert_eq!(parse("character varying"), DataType::Text);
        assert_eq!(parse("char(2)"), DataType::Text);
        assert_eq!(parse("numeric(10,2)"), DataType::Numeric);
        assert_eq!(parse("decimal"), DataType::Numeric);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse("timestamp"), DataType::Timestamp);
        assert_eq!(parse("timestamp without time zone"), DataType::Timestamp);
        assert_eq!(parse("timestamp with time zone"), DataType::TimestampTz);
        assert_eq!(parse("timestamp(3) with time zone"), DataType::TimestampTz);
        assert_eq!(parse("timestamptz"), DataType::TimestampTz);
        assert_eq!(parse("time"), DataType::Time);
        assert_eq!(parse("time with time zone"), DataType::TimeTz);
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(DataType::parse("integer[]"), (DataType::Integer, true));
        assert_eq!(DataType::parse("text[][]"), (DataType::Text, true));
        assert_eq!(
            DataType::parse("character varying(255)[]"),
            (DataType::Text, true)
        );
        assert_eq!(DataType::parse("_int4"), (DataType::Integer, true));
        assert_eq!(DataType::parse("integer ARRAY"), (DataType::Integer, true));
        assert_eq!(DataType::parse("text"), (DataType::Text, false));
    }

    #[test]
    fn test_parse_custom_type() {
        assert_eq!(parse("order_status"), DataType::Custom("order_status".into()));
        assert_eq!(
            parse("public.\"order_status\""),
            DataType::Custom("order_status".into())
        );
        assert_eq!(
            DataType::parse("mood[]"),
            (DataType::Custom("mood".into()), true)
        );
        // Underscore names that are not internal array names stay custom
        assert_eq!(parse("_audit"), DataType::Custom("_audit".into()));
    }

    #[test]
    fn test_type_name_and_extension() {
        let table = Table {
            name: "user_accounts".to_string(),
            columns: vec![],
        };
        assert_eq!(table.type_name(), "UserAccounts");
        assert_eq!(table.extension_name(), "UserAccountsExtension");
    }

    #[test]
    fn test_naming_helpers() {
        assert_eq!(to_pascal_case("order_line_items"), "OrderLineItems");
        assert_eq!(to_pascal_case("foo"), "Foo");
        assert_eq!(to_snake_case("OrderLineItems"), "order_line_items");
        assert_eq!(to_snake_case("GetUserByEmail"), "get_user_by_email");
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "tables": [{"name": "users", "columns": [
                {"name": "id", "type": {"name": "integer"}},
                {"name": "bio", "type": {"name": "text", "is_nullable": true}}
            ]}],
            "enums": [{"name": "status", "values": ["active", "inactive"]}],
            "queries": [{
                "name": "GetUser",
                "shape": "row",
                "parameters": [{"name": "id", "type": {"name": "integer"}, "position": 1}],
                "columns": [{"name": "id", "type": {"name": "integer"}}],
                "sql": "SELECT id FROM users WHERE id = $1"
            }]
        }"#;

        let schema = Schema::from_json_str(json).unwrap();

        assert_eq!(schema.name, "public");
        assert_eq!(schema.tables[0].columns.len(), 2);
        assert!(schema.tables[0].columns[1].data_type.is_nullable);
        assert_eq!(schema.queries[0].shape, QueryResultShape::Row);
        assert!(schema.composites.is_empty());
    }

    #[test]
    fn test_from_json_rejects_aggregate_without_table() {
        let json = r#"{"queries": [{
            "name": "ListAuthors", "shape": "rows", "sql": "SELECT 1",
            "columns": [{"name": "books", "type": {"name": "json"}, "is_json_aggregate": true}]
        }]}"#;

        let err = Schema::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("books"));
    }

    #[test]
    fn test_apply_filter_drops_bookkeeping_table() {
        let mut schema = Schema {
            tables: vec![
                Table {
                    name: "users".into(),
                    columns: vec![],
                },
                Table {
                    name: "schema_migrations".into(),
                    columns: vec![],
                },
            ],
            ..Default::default()
        };

        schema.apply_filter(&TableFilter::default().with_bookkeeping_table("schema_migrations"));

        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.tables[0].name, "users");
    }

    #[test]
    fn test_ordered_parameters() {
        let query = Query {
            name: "q".into(),
            parameters: vec![
                QueryParameter {
                    name: "b".into(),
                    data_type: TypeDescriptor::new("text"),
                    position: 2,
                },
                QueryParameter {
                    name: "a".into(),
                    data_type: TypeDescriptor::new("text"),
                    position: 1,
                },
            ],
            shape: QueryResultShape::Exec,
            columns: vec![],
            sql: String::new(),
        };
        let names: Vec<_> = query.ordered_parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
