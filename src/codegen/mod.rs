//! Code generation
//!
//! This module provides the language-independent side of code generation:
//! output configuration, the [`CodeGenerator`] trait, the registry that maps
//! language keys to generators, and the per-unit run report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::prelude::{GraftError, Schema};

pub mod artifact;
pub mod go;
pub mod shape;

pub use artifact::{sync_artifact, ArtifactStatus};
pub use go::GoGenerator;

/// Whether generated artifacts are written or only compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Write every artifact whose content changed
    #[default]
    Write,
    /// Compute artifacts and report stale ones without writing
    Check,
}

/// Configuration for code generation
#[derive(Debug, Clone)]
pub struct CodeGenConfig {
    /// Output directory; models and queries live in subdirectories
    pub output_path: PathBuf,
    /// Package (and subdirectory) name for model declarations
    pub models_package: String,
    /// Package (and subdirectory) name for query functions
    pub queries_package: String,
    /// Import path of the models package as seen from the queries package
    pub models_import: Option<String>,
    /// Write mode
    pub write_mode: WriteMode,
}

impl CodeGenConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            output_path,
            models_package: "models".to_string(),
            queries_package: "queries".to_string(),
            models_import: None,
            write_mode: WriteMode::default(),
        }
    }

    pub fn with_models_package(mut self, package: impl Into<String>) -> Self {
        self.models_package = package.into();
        self
    }

    pub fn with_queries_package(mut self, package: impl Into<String>) -> Self {
        self.queries_package = package.into();
        self
    }

    pub fn with_models_import(mut self, import: impl Into<String>) -> Self {
        self.models_import = Some(import.into());
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn models_dir(&self) -> PathBuf {
        self.output_path.join(&self.models_package)
    }

    pub fn queries_dir(&self) -> PathBuf {
        self.output_path.join(&self.queries_package)
    }

    /// Configured models import path, or the models directory with forward slashes
    pub fn resolved_models_import(&self) -> String {
        match &self.models_import {
            Some(import) => import.clone(),
            None => path_to_import(&self.models_dir()),
        }
    }
}

fn path_to_import(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Trait for language-specific code generators
pub trait CodeGenerator {
    /// Registry key, e.g. "go"
    fn language(&self) -> &'static str;

    /// Generate all artifacts for the schema
    ///
    /// Per-artifact failures are collected in the report; an `Err` means the
    /// run could not start at all (e.g. the output directory is unusable).
    fn generate(&self, schema: &Schema, config: &CodeGenConfig)
        -> Result<GenerationReport, GraftError>;
}

/// Generators available to a run, keyed by language
///
/// Built once at startup and passed by reference to whoever needs it.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<&'static str, Box<dyn CodeGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in generator
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(GoGenerator::new());
        registry
    }

    /// Add a generator, replacing any previous one for the same language
    pub fn register(&mut self, generator: impl CodeGenerator + 'static) {
        self.generators
            .insert(generator.language(), Box::new(generator));
    }

    pub fn lookup(&self, language: &str) -> Option<&dyn CodeGenerator> {
        self.generators.get(language).map(|g| g.as_ref())
    }

    /// Registered language keys, sorted
    pub fn languages(&self) -> Vec<&'static str> {
        self.generators.keys().copied().collect()
    }
}

/// Outcome of one artifact unit
#[derive(Debug)]
pub struct UnitOutcome {
    /// Human-readable unit label, e.g. "table users"
    pub unit: String,
    pub path: PathBuf,
    pub result: Result<ArtifactStatus, GraftError>,
}

/// All unit outcomes of one generator run
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub outcomes: Vec<UnitOutcome>,
}

/// Counts per outcome kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub failed: usize,
}

impl GenerationReport {
    pub fn record(
        &mut self,
        unit: impl Into<String>,
        path: PathBuf,
        result: Result<ArtifactStatus, GraftError>,
    ) {
        self.outcomes.push(UnitOutcome {
            unit: unit.into(),
            path,
            result,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = (&UnitOutcome, &GraftError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(ArtifactStatus::Created) => summary.created += 1,
                Ok(ArtifactStatus::Updated) => summary.updated += 1,
                Ok(ArtifactStatus::Unchanged) => summary.unchanged += 1,
                Ok(ArtifactStatus::Stale) => summary.stale += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// True when the run should exit non-zero
    pub fn is_failure(&self) -> bool {
        let summary = self.summary();
        summary.failed > 0 || summary.stale > 0
    }
}
