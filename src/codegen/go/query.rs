//! Query artifacts
//!
//! Each query gets its own file in the queries package holding the optional
//! row type, the statement constant and the function that runs it. These
//! files carry no hand-written region and are fully regenerated.

use std::collections::BTreeSet;

use heck::ToLowerCamelCase;
use minijinja::{context, Environment};
use serde::Serialize;
use tracing::trace;

use super::syntax::{go_string_literal, render_struct, Field};
use super::types::{field_name, map_descriptor, param_name, GoType, JSON_IMPORT};
use crate::codegen::shape::{QueryPlan, ReturnShape, RowBinding};
use crate::codegen::CodeGenConfig;
use crate::error::GraftError;
use crate::schema::{to_pascal_case, Query, QueryColumn};

/// Column scanned into raw bytes and decoded after the scan
#[derive(Debug, Serialize)]
struct JsonDecode {
    raw: String,
    field: String,
}

/// Imports a query file needs
#[derive(Debug, Default)]
struct QueryImports {
    std: BTreeSet<&'static str>,
    models: bool,
}

impl QueryImports {
    fn note(&mut self, go_type: &GoType) {
        self.std.extend(go_type.import());
        if go_type.is_user_defined() {
            self.models = true;
        }
    }
}

/// Everything the row side of the function needs
#[derive(Debug, Default)]
struct RowParts {
    item_type: String,
    row_type: Option<String>,
    scan_targets: Vec<String>,
    json_decodes: Vec<JsonDecode>,
}

pub fn render_query(
    env: &Environment<'_>,
    plan: &QueryPlan<'_>,
    config: &CodeGenConfig,
) -> Result<String, GraftError> {
    let query = plan.query;
    let models = config.models_package.as_str();
    let func_name = to_pascal_case(&query.name);
    // Suffixed so no argument name can shadow it
    let const_name = format!("{}SQL", query.name.to_lower_camel_case());

    let mut imports = QueryImports::default();
    imports.std.insert("context");

    let mut signature = vec!["ctx context.Context".to_string(), "db Querier".to_string()];
    let mut call_args = String::new();
    for parameter in query.ordered_parameters() {
        let go_type = map_descriptor(&parameter.data_type);
        imports.note(&go_type);
        let name = param_name(&parameter.name);
        signature.push(format!("{name} {}", go_type.qualified(models)));
        call_args.push_str(", ");
        call_args.push_str(&name);
    }

    let row = match plan.row {
        Some(RowBinding::Table(table)) => {
            imports.models = true;
            RowParts {
                item_type: format!("{models}.{}", table.type_name()),
                scan_targets: query
                    .columns
                    .iter()
                    .map(|c| format!("&i.{}", field_name(&c.name)))
                    .collect(),
                ..Default::default()
            }
        }
        Some(RowBinding::Synthesized) => synthesized_row(query, &func_name, models, &mut imports)?,
        None => RowParts::default(),
    };

    let (returns, result_type) = match plan.returns {
        ReturnShape::One => ("one", format!("({}, error)", row.item_type)),
        ReturnShape::Many => ("many", format!("([]{}, error)", row.item_type)),
        ReturnShape::ErrorOnly => ("exec", "error".to_string()),
        ReturnShape::AffectedRows => ("exec_rows", "(int64, error)".to_string()),
    };

    let module_imports: Vec<String> = if imports.models {
        vec![config.resolved_models_import()]
    } else {
        Vec::new()
    };

    trace!(
        query = ?query.name,
        returns,
        std_imports = ?imports.std,
        models = imports.models,
        "Rendering query"
    );

    let unit = format!("query {}", query.name);
    let template = env
        .get_template("query")
        .map_err(|e| template_error(&unit, e))?;

    template
        .render(context! {
            package => &config.queries_package,
            std_imports => &imports.std,
            module_imports => module_imports,
            row_type => row.row_type,
            const_name => const_name,
            sql_literal => sql_literal(&query.sql),
            func_name => func_name,
            signature => signature.join(", "),
            call_args => call_args,
            result_type => result_type,
            returns => returns,
            item_type => row.item_type,
            scan_targets => row.scan_targets.join(", "),
            json_decodes => row.json_decodes,
        })
        .map_err(|e| template_error(&unit, e))
}

fn synthesized_row(
    query: &Query,
    func_name: &str,
    models: &str,
    imports: &mut QueryImports,
) -> Result<RowParts, GraftError> {
    let row_name = format!("{func_name}Row");
    let mut fields = Vec::with_capacity(query.columns.len());
    let mut seen = BTreeSet::new();
    let mut parts = RowParts {
        item_type: row_name.clone(),
        ..Default::default()
    };

    for column in &query.columns {
        let name = field_name(&column.name);
        if !seen.insert(name.clone()) {
            return Err(GraftError::Schema(format!(
                "query '{}': result column '{}' maps to field '{name}' more than once; alias it",
                query.name, column.name
            )));
        }
        match aggregate_element(column) {
            Some(element) => {
                let go_type = GoType::user_defined(element).into_slice();
                imports.note(&go_type);
                imports.std.insert(JSON_IMPORT);
                fields.push(Field::named(name.clone(), go_type.qualified(models)));

                let raw = param_name(&format!("{}_raw", column.name));
                parts.scan_targets.push(format!("&{raw}"));
                parts.json_decodes.push(JsonDecode { raw, field: name });
            }
            None => {
                let go_type = map_descriptor(&column.data_type);
                imports.note(&go_type);
                fields.push(Field::named(name.clone(), go_type.qualified(models)));
                parts.scan_targets.push(format!("&i.{name}"));
            }
        }
    }

    parts.row_type = Some(render_struct(&row_name, &fields));
    Ok(parts)
}

fn aggregate_element(column: &QueryColumn) -> Option<&str> {
    if column.is_json_aggregate {
        column.json_element_table.as_deref()
    } else {
        None
    }
}

/// Raw string literal unless the statement itself contains a backtick
fn sql_literal(sql: &str) -> String {
    let sql = sql.trim();
    if sql.contains('`') {
        go_string_literal(sql)
    } else {
        format!("`{sql}`")
    }
}

pub fn render_querier(env: &Environment<'_>, config: &CodeGenConfig) -> Result<String, GraftError> {
    let template = env
        .get_template("querier")
        .map_err(|e| template_error("querier", e))?;
    template
        .render(context! { package => &config.queries_package })
        .map_err(|e| template_error("querier", e))
}

fn template_error(unit: &str, error: minijinja::Error) -> GraftError {
    GraftError::Template {
        unit: unit.to_string(),
        message: error.to_string(),
    }
}
