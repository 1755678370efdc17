use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sqlgraft::codegen::{CodeGenConfig, GenerationReport, GeneratorRegistry, WriteMode};
use sqlgraft::error::GraftError;
use sqlgraft::introspect::TableFilter;
use sqlgraft::schema::Schema;

#[derive(Parser, Debug)]
#[command(name = "sqlgraft")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Schema IR document (JSON) with tables, enums, composites and queries
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Read tables, enums and composites from a live PostgreSQL database
    #[arg(long)]
    introspect: bool,

    /// Database schema to introspect
    #[arg(long, default_value = "public")]
    db_schema: String,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Output directory; models and queries go into subdirectories
    #[arg(short, long, default_value = "./db")]
    output: PathBuf,

    /// Comma-separated target languages
    #[arg(long, value_delimiter = ',', default_value = "go")]
    lang: Vec<String>,

    /// Package name of the model declarations
    #[arg(long, default_value = "models")]
    models_package: String,

    /// Package name of the query functions
    #[arg(long, default_value = "queries")]
    queries_package: String,

    /// Import path of the models package (default: derived from --output)
    #[arg(long)]
    models_import: Option<String>,

    /// Migration bookkeeping table, never generated
    #[arg(long, default_value = "schema_migrations")]
    migrations_table: String,

    /// Comma-separated list of tables to include (default: all)
    #[arg(long, value_delimiter = ',')]
    tables: Option<Vec<String>>,

    /// Comma-separated list of tables to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Report stale artifacts without writing anything
    #[arg(long)]
    check: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = ?e, "Fatal error");
            std::process::exit(1);
        }
    }
}

/// Returns whether every unit succeeded
fn run() -> Result<bool> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("sqlgraft v{}", env!("CARGO_PKG_VERSION"));
    info!(
        schema = ?cli.schema,
        introspect = cli.introspect,
        output = ?cli.output,
        languages = ?cli.lang,
        check = cli.check,
        "Starting code generation"
    );

    // Build table filter
    let filter = TableFilter {
        include: cli.tables.clone(),
        exclude: cli.exclude.clone(),
        bookkeeping_table: None,
    }
    .with_bookkeeping_table(&cli.migrations_table);
    debug!(filter = ?filter, "Table filter configured");

    let mut schema = load_schema(&cli, &filter)?;
    schema.apply_filter(&filter);

    if schema.tables.is_empty() && schema.enums.is_empty() && schema.queries.is_empty() {
        warn!("Nothing to generate after filtering");
    }

    info!(
        tables = schema.tables.len(),
        enums = schema.enums.len(),
        composites = schema.composites.len(),
        queries = schema.queries.len(),
        "Schema ready for code generation"
    );

    let mut codegen_config = CodeGenConfig::new(cli.output.clone())
        .with_models_package(&cli.models_package)
        .with_queries_package(&cli.queries_package)
        .with_write_mode(if cli.check {
            WriteMode::Check
        } else {
            WriteMode::Write
        });
    if let Some(import) = &cli.models_import {
        codegen_config = codegen_config.with_models_import(import);
    }
    debug!(codegen_config = ?codegen_config, "Code generation config");

    let registry = GeneratorRegistry::with_builtin();
    let mut success = true;
    for language in &cli.lang {
        let generator = registry
            .lookup(language)
            .ok_or_else(|| GraftError::UnknownLanguage(language.clone()))
            .with_context(|| {
                format!("Available languages: {}", registry.languages().join(", "))
            })?;

        let report = generator
            .generate(&schema, &codegen_config)
            .with_context(|| format!("Failed to generate {language} code"))?;
        print_report(language, &report);
        success &= !report.is_failure();
    }

    Ok(success)
}

fn init_tracing(verbose: u8) {
    let builder = FmtSubscriber::builder().with_target(false);

    // RUST_LOG wins over -v
    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => {
            let level = match verbose {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            };
            tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
        }
    };
    result.expect("Failed to set tracing subscriber");
}

fn load_schema(cli: &Cli, filter: &TableFilter) -> Result<Schema> {
    let from_file = |path: &PathBuf| {
        Schema::from_json_file(path)
            .with_context(|| format!("Failed to load schema from {}", path.display()))
    };

    match (&cli.schema, cli.introspect) {
        (None, false) => bail!("No schema source: pass --schema, --introspect, or both"),
        (Some(path), false) => from_file(path),
        (path, true) => {
            let mut schema = introspect_postgres(cli, filter)?;
            // Queries only come from the IR document
            if let Some(path) = path {
                schema.queries = from_file(path)?.queries;
            }
            Ok(schema)
        }
    }
}

#[cfg(feature = "postgres")]
fn introspect_postgres(cli: &Cli, filter: &TableFilter) -> Result<Schema> {
    use postgres::NoTls;
    use sqlgraft::config::DbConfig;
    use sqlgraft::introspect::Introspector;
    use sqlgraft::PostgresIntrospector;

    let config =
        DbConfig::load(&cli.env_file).context("Failed to load database configuration")?;
    info!(connection = ?config.redacted_connection_string(), "Connecting to PostgreSQL");

    let mut client = postgres::Client::connect(&config.postgres_connection_string(), NoTls)
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {}",
                config.redacted_connection_string()
            )
        })?;

    info!("Connected to database");

    let mut introspector = PostgresIntrospector::new(&mut client);
    let schema = introspector
        .introspect(&cli.db_schema, filter)
        .context("Failed to introspect schema")?;

    Ok(schema)
}

#[cfg(not(feature = "postgres"))]
fn introspect_postgres(_cli: &Cli, _filter: &TableFilter) -> Result<Schema> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}

fn print_report(language: &str, report: &GenerationReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(status) => println!(
                "{:<10} {:<32} {}",
                status.to_string(),
                outcome.unit,
                outcome.path.display()
            ),
            Err(e) => eprintln!("{:<10} {:<32} {e}", "failed", outcome.unit),
        }
    }

    let summary = report.summary();
    println!(
        "{language}: {} created, {} updated, {} unchanged, {} stale, {} failed",
        summary.created, summary.updated, summary.unchanged, summary.stale, summary.failed
    );
}
