//! Go code generator
//!
//! Model declarations (tables, enums, composites) are merged into existing
//! files in the models package; query functions and the shared querier are
//! rendered from templates into the queries package.

use std::fs;
use std::path::Path;

use minijinja::Environment;
use tracing::{debug, info, warn};

use crate::codegen::shape::plan_query;
use crate::codegen::{
    sync_artifact, CodeGenConfig, CodeGenerator, GenerationReport, ReportSummary, WriteMode,
};
use crate::error::GraftError;
use crate::schema::{to_snake_case, Schema};

pub mod merge;
pub mod query;
pub mod syntax;
pub mod types;

const QUERIER_FILE: &str = "querier";

/// Go code generator
pub struct GoGenerator {
    env: Environment<'static>,
}

impl GoGenerator {
    pub fn new() -> Self {
        Self { env: templates() }
    }
}

impl Default for GoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn templates() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);

    env.add_template("query", include_str!("templates/query.go.jinja"))
        .expect("Failed to load Go query template");
    env.add_template("querier", include_str!("templates/querier.go.jinja"))
        .expect("Failed to load Go querier template");

    env
}

impl CodeGenerator for GoGenerator {
    fn language(&self) -> &'static str {
        "go"
    }

    fn generate(
        &self,
        schema: &Schema,
        config: &CodeGenConfig,
    ) -> Result<GenerationReport, GraftError> {
        info!(
            output = ?config.output_path,
            mode = ?config.write_mode,
            tables = schema.tables.len(),
            enums = schema.enums.len(),
            composites = schema.composites.len(),
            queries = schema.queries.len(),
            "Generating Go code"
        );

        let has_models =
            !(schema.tables.is_empty() && schema.enums.is_empty() && schema.composites.is_empty());
        if config.write_mode == WriteMode::Write {
            if has_models {
                ensure_dir(&config.models_dir())?;
            }
            if !schema.queries.is_empty() {
                ensure_dir(&config.queries_dir())?;
            }
        }

        let mut report = GenerationReport::default();
        self.generate_models(schema, config, &mut report);
        if !schema.queries.is_empty() {
            self.generate_queries(schema, config, &mut report);
        }

        let ReportSummary {
            created,
            updated,
            unchanged,
            stale,
            failed,
        } = report.summary();
        info!(created, updated, unchanged, stale, failed, "Go code generation complete");

        Ok(report)
    }
}

impl GoGenerator {
    fn generate_models(&self, schema: &Schema, config: &CodeGenConfig, report: &mut GenerationReport) {
        let dir = config.models_dir();
        let package = config.models_package.as_str();

        for table in &schema.tables {
            let path = dir.join(format!("{}.go", to_snake_case(&table.name)));
            let result = sync_artifact(&path, config.write_mode, |existing| {
                merge::merge_table(existing, table, package).map_err(|e| e.into_graft(&path))
            });
            log_outcome("table", &table.name, &result);
            report.record(format!("table {}", table.name), path, result);
        }

        for enum_type in &schema.enums {
            let path = dir.join(format!("{}.go", to_snake_case(&enum_type.name)));
            let result = sync_artifact(&path, config.write_mode, |existing| {
                merge::merge_enum(existing, enum_type, package).map_err(|e| e.into_graft(&path))
            });
            log_outcome("enum", &enum_type.name, &result);
            report.record(format!("enum {}", enum_type.name), path, result);
        }

        for composite in &schema.composites {
            let path = dir.join(format!("{}.go", to_snake_case(&composite.name)));
            let result = sync_artifact(&path, config.write_mode, |existing| {
                merge::merge_composite(existing, composite, package)
                    .map_err(|e| e.into_graft(&path))
            });
            log_outcome("composite", &composite.name, &result);
            report.record(format!("composite {}", composite.name), path, result);
        }
    }

    fn generate_queries(&self, schema: &Schema, config: &CodeGenConfig, report: &mut GenerationReport) {
        let dir = config.queries_dir();

        let path = dir.join(format!("{QUERIER_FILE}.go"));
        let result = sync_artifact(&path, config.write_mode, |_| {
            query::render_querier(&self.env, config)
        });
        log_outcome("querier", QUERIER_FILE, &result);
        report.record("querier", path, result);

        for q in &schema.queries {
            let file = to_snake_case(&q.name);
            let path = dir.join(format!("{file}.go"));
            let result = if file == QUERIER_FILE {
                Err(GraftError::NameCollision {
                    path: path.clone(),
                    name: q.name.clone(),
                    found: "the shared querier",
                })
            } else {
                let plan = plan_query(q, &schema.tables);
                sync_artifact(&path, config.write_mode, |_| {
                    query::render_query(&self.env, &plan, config)
                })
            };
            log_outcome("query", &q.name, &result);
            report.record(format!("query {}", q.name), path, result);
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), GraftError> {
    fs::create_dir_all(dir).map_err(|e| GraftError::io(dir, e))?;
    debug!(path = ?dir, "Ensured output directory");
    Ok(())
}

fn log_outcome<T: std::fmt::Display>(kind: &str, name: &str, result: &Result<T, GraftError>) {
    match result {
        Ok(status) => debug!(kind, name, status = %status, "Generated unit"),
        Err(e) => warn!(kind, name, error = %e, "Unit failed"),
    }
}
