use std::path::PathBuf;

use thiserror::Error;

/// sqlgraft errors
#[derive(Error, Debug)]
pub enum GraftError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to introspect schema '{schema}': {message}")]
    Introspection { schema: String, message: String },

    #[error("Failed to load schema: {0}")]
    Schema(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse existing artifact '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("'{name}' in '{}' is already declared as {found}", path.display())]
    NameCollision {
        path: PathBuf,
        name: String,
        found: &'static str,
    },

    #[error("Template rendering failed for '{unit}': {message}")]
    Template { unit: String, message: String },

    #[error("No generator registered for language '{0}'")]
    UnknownLanguage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraftError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
