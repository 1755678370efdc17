//! # sqlgraft
//!
//! Generate typed Go models and query functions from a database schema
//!
//! Regeneration is a merge, not an overwrite: generated declarations in
//! existing model files are patched in place and everything a developer
//! added around them (extension fields, methods, other declarations) is kept.

pub mod codegen;
pub mod config;
pub mod error;
pub mod introspect;
pub mod schema;

pub mod prelude {
    pub use crate::codegen::{
        ArtifactStatus, CodeGenConfig, CodeGenerator, GenerationReport, GeneratorRegistry,
        WriteMode,
    };
    pub use crate::config::DbConfig;
    pub use crate::error::GraftError;
    pub use crate::introspect::{Introspector, TableFilter};
    pub use crate::schema::{
        Column, CompositeType, DataType, EnumType, Query, QueryColumn, QueryParameter,
        QueryResultShape, Schema, Table, TypeDescriptor,
    };
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresIntrospector;
