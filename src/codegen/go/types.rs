//! Go type mapping
//!
//! Renders canonical database types as Go types. The catalog is fixed;
//! anything outside it is treated as a reference to a user-defined type
//! (an enum or composite declared in the models package).

use heck::ToLowerCamelCase;

use crate::schema::{to_pascal_case, DataType, TypeDescriptor};

pub const TIME_IMPORT: &str = "time";
pub const JSON_IMPORT: &str = "encoding/json";

/// Imports whose presence the merge engine owns
pub const MANAGED_IMPORTS: [&str; 2] = [JSON_IMPORT, TIME_IMPORT];

/// A resolved Go type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoType {
    base: String,
    slice: bool,
    pointer: bool,
    user_defined: bool,
    import: Option<&'static str>,
}

impl GoType {
    fn builtin(base: &str, import: Option<&'static str>) -> Self {
        Self {
            base: base.to_string(),
            slice: false,
            pointer: false,
            user_defined: false,
            import,
        }
    }

    /// A type declared in the models package
    pub fn user_defined(name: &str) -> Self {
        Self {
            base: to_pascal_case(name),
            slice: false,
            pointer: false,
            user_defined: true,
            import: None,
        }
    }

    pub fn into_slice(mut self) -> Self {
        self.slice = true;
        self
    }

    /// Import required by this type, if any
    pub fn import(&self) -> Option<&'static str> {
        self.import
    }

    pub fn is_user_defined(&self) -> bool {
        self.user_defined
    }

    /// Type as written inside the models package
    pub fn render(&self) -> String {
        self.render_with(None)
    }

    /// Type as written from another package that imports the models package
    pub fn qualified(&self, models_package: &str) -> String {
        self.render_with(Some(models_package))
    }

    fn render_with(&self, qualifier: Option<&str>) -> String {
        let mut out = String::new();
        if self.pointer {
            out.push('*');
        }
        if self.slice {
            out.push_str("[]");
        }
        if let Some(package) = qualifier.filter(|_| self.user_defined) {
            out.push_str(package);
            out.push('.');
        }
        out.push_str(&self.base);
        out
    }
}

/// Map a raw database type to a Go type
///
/// Array markers folded into `raw` (`integer[]`, `_int4`) count as
/// `is_array`. Nullable types become pointers, except byte slices, JSON
/// messages and slices, which already have a usable absent value.
pub fn map_type(raw: &str, is_array: bool, is_nullable: bool) -> GoType {
    let (data_type, folded_array) = DataType::parse(raw);
    let mut go_type = base_type(&data_type);

    if is_array || folded_array {
        go_type.slice = true;
    }

    let nil_safe = go_type.slice || go_type.base == "[]byte" || go_type.base == "json.RawMessage";
    if is_nullable && !nil_safe {
        go_type.pointer = true;
    }

    go_type
}

pub fn map_descriptor(descriptor: &TypeDescriptor) -> GoType {
    map_type(&descriptor.name, descriptor.is_array, descriptor.is_nullable)
}

fn base_type(data_type: &DataType) -> GoType {
    match data_type {
        DataType::SmallInt => GoType::builtin("int16", None),
        DataType::Integer => GoType::builtin("int32", None),
        DataType::BigInt => GoType::builtin("int64", None),
        DataType::Real => GoType::builtin("float32", None),
        DataType::DoublePrecision => GoType::builtin("float64", None),
        DataType::Boolean => GoType::builtin("bool", None),
        DataType::Binary => GoType::builtin("[]byte", None),
        DataType::Json | DataType::JsonBinary => {
            GoType::builtin("json.RawMessage", Some(JSON_IMPORT))
        }
        DataType::Date
        | DataType::Time
        | DataType::TimeTz
        | DataType::Timestamp
        | DataType::TimestampTz => GoType::builtin("time.Time", Some(TIME_IMPORT)),
        DataType::Oid => GoType::builtin("uint32", None),
        // Precision is not modeled: numeric, money and interval travel as text
        DataType::Text
        | DataType::Uuid
        | DataType::Interval
        | DataType::Numeric
        | DataType::Money
        | DataType::Network
        | DataType::BitString
        | DataType::Xml
        | DataType::Geometric
        | DataType::FullText => GoType::builtin("string", None),
        DataType::Custom(name) => GoType::user_defined(name),
    }
}

/// Exported Go field name for a column
pub fn field_name(column: &str) -> String {
    let name = to_pascal_case(column);
    match name.chars().next() {
        Some(first) if first.is_ascii_digit() => format!("X{name}"),
        Some(_) => name,
        None => "X".to_string(),
    }
}

const GO_KEYWORDS: [&str; 25] = [
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Identifiers used by the generated function bodies, plus the packages
/// they import
const RESERVED_LOCALS: [&str; 11] = [
    "context", "ctx", "db", "err", "i", "items", "json", "result", "row", "rows", "time",
];

/// Go argument name for a query parameter
pub fn param_name(parameter: &str) -> String {
    let name = parameter.to_lower_camel_case();
    if name.is_empty() {
        return "arg".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit())
        || GO_KEYWORDS.contains(&name.as_str())
        || RESERVED_LOCALS.contains(&name.as_str())
    {
        return format!("{name}Arg");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(raw: &str, is_array: bool, is_nullable: bool) -> (String, Option<&'static str>) {
        let t = map_type(raw, is_array, is_nullable);
        (t.render(), t.import())
    }

    #[test]
    fn test_integer_plain_and_nullable() {
        assert_eq!(mapped("integer", false, false), ("int32".into(), None));
        assert_eq!(mapped("integer", false, true), ("*int32".into(), None));
    }

    #[test]
    fn test_json_is_not_pointer_wrapped() {
        assert_eq!(
            mapped("jsonb", false, true),
            ("json.RawMessage".into(), Some(JSON_IMPORT))
        );
    }

    #[test]
    fn test_temporal_types_need_time_import() {
        assert_eq!(
            mapped("timestamp with time zone", false, false),
            ("time.Time".into(), Some(TIME_IMPORT))
        );
        assert_eq!(
            mapped("date", false, true),
            ("*time.Time".into(), Some(TIME_IMPORT))
        );
    }

    #[test]
    fn test_arrays() {
        assert_eq!(mapped("text", true, false), ("[]string".into(), None));
        assert_eq!(mapped("text[]", false, false), ("[]string".into(), None));
        assert_eq!(mapped("text", true, true), ("[]string".into(), None));
        assert_eq!(mapped("bytea", true, true), ("[][]byte".into(), None));
        assert_eq!(mapped("bytea", false, true), ("[]byte".into(), None));
    }

    #[test]
    fn test_text_like_catalog() {
        for raw in [
            "uuid",
            "numeric(10,2)",
            "money",
            "interval",
            "inet",
            "bit varying(8)",
            "xml",
            "point",
            "tsvector",
            "character varying(64)",
        ] {
            assert_eq!(mapped(raw, false, false), ("string".into(), None), "{raw}");
        }
        assert_eq!(mapped("oid", false, false), ("uint32".into(), None));
        assert_eq!(mapped("smallint", false, false), ("int16".into(), None));
        assert_eq!(mapped("bigserial", false, false), ("int64".into(), None));
        assert_eq!(mapped("real", false, false), ("float32".into(), None));
        assert_eq!(mapped("double precision", false, false), ("float64".into(), None));
        assert_eq!(mapped("bool", false, false), ("bool".into(), None));
    }

    #[test]
    fn test_unknown_type_is_user_defined() {
        let t = map_type("order_status", false, true);
        assert!(t.is_user_defined());
        assert_eq!(t.render(), "*OrderStatus");
        assert_eq!(t.qualified("models"), "*models.OrderStatus");
        assert_eq!(t.import(), None);

        let builtin = map_type("text", false, false);
        assert_eq!(builtin.qualified("models"), "string");
    }

    #[test]
    fn test_user_defined_slice() {
        let t = GoType::user_defined("authors").into_slice();
        assert_eq!(t.qualified("models"), "[]models.Authors");
    }

    #[test]
    fn test_field_and_param_names() {
        assert_eq!(field_name("foo"), "Foo");
        assert_eq!(field_name("created_at"), "CreatedAt");
        assert_eq!(field_name("2fa"), "X2fa");
        assert_eq!(param_name("user_id"), "userId");
        assert_eq!(param_name("type"), "typeArg");
        assert_eq!(param_name("ctx"), "ctxArg");
        assert_eq!(param_name("json"), "jsonArg");
    }
}
