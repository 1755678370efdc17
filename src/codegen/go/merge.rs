//! Merge engine
//!
//! Patches previously generated model files instead of overwriting them.
//! Each function takes the current file content (`None` when the file does
//! not exist yet) and returns the complete replacement content. Only the
//! generator-owned declarations are rewritten: the table's main struct, an
//! enum's type and constant block, a composite's struct, and the two
//! managed imports. Everything else is carried over verbatim.
//!
//! A fresh file is produced by merging into an empty tree, so the output of
//! any merge is itself a fixed point.

use std::collections::BTreeSet;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace};

use super::syntax::{
    render_const_block, render_struct, struct_shape, ConstSpec, Decl, DeclShape, Field, GoFile,
    SyntaxError,
};
use super::types::{field_name, map_descriptor, MANAGED_IMPORTS};
use crate::error::GraftError;
use crate::schema::{to_pascal_case, Column, CompositeType, EnumType, Table};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("'{name}' is already declared as {found}")]
    NameCollision { name: String, found: &'static str },
}

impl MergeError {
    /// Attach the artifact path
    pub fn into_graft(self, path: &Path) -> GraftError {
        match self {
            Self::Syntax(e) => GraftError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            Self::NameCollision { name, found } => GraftError::NameCollision {
                path: path.to_path_buf(),
                name,
                found,
            },
        }
    }
}

fn load(existing: Option<&str>, package: &str) -> Result<GoFile, MergeError> {
    match existing {
        Some(source) => Ok(GoFile::parse(source)?),
        None => Ok(GoFile::new(package)),
    }
}

/// Regenerate a table's model file
pub fn merge_table(existing: Option<&str>, table: &Table, package: &str) -> Result<String, MergeError> {
    let mut file = load(existing, package)?;
    let type_name = table.type_name();
    let extension_name = table.extension_name();

    let extension_index = match locate_struct(&file, &extension_name)? {
        Some(index) => index,
        None => {
            debug!(table = ?table.name, "Creating extension container");
            let mut container = Decl::generated(
                render_struct(&extension_name, &[]),
                struct_shape(&extension_name, &[]),
            );
            // The container belongs to the developer once it exists
            container.managed = false;
            let anchor = file.anchor();
            file.insert(anchor, container)
        }
    };

    let extension = extension_fields(&file, extension_index);
    trace!(table = ?table.name, extension = ?extension, "Read extension fields");

    let (fields, imports) = main_fields(table, &extension)?;
    let body = render_struct(&type_name, &fields);
    let shape = struct_shape(&type_name, &fields);

    match locate_struct(&file, &type_name)? {
        Some(index) => file.replace(index, body, shape),
        None => {
            // Recompute: the container may sit after where we looked before
            let after = locate_struct(&file, &extension_name)?.map_or(file.anchor(), |i| i + 1);
            file.insert(after, Decl::generated(body, shape));
        }
    }

    sync_imports(&mut file, &imports);
    Ok(file.print())
}

/// Phase 1: field names the developer declared in the extension container
pub fn extension_fields(file: &GoFile, extension_index: usize) -> BTreeSet<String> {
    match &file.decls[extension_index].shape {
        DeclShape::Struct { fields, .. } => fields.iter().cloned().collect(),
        _ => BTreeSet::new(),
    }
}

/// Phase 2: the main struct's fields and the imports they need
///
/// Columns already declared in the extension container are skipped; the
/// container itself is embedded last.
pub fn main_fields(
    table: &Table,
    extension: &BTreeSet<String>,
) -> Result<(Vec<Field>, BTreeSet<&'static str>), MergeError> {
    let (mut fields, imports) = column_fields(
        table
            .columns
            .iter()
            .filter(|column| !extension.contains(&field_name(&column.name))),
    )?;
    fields.push(Field::embedded(table.extension_name()));
    Ok((fields, imports))
}

/// Columns whose names differ only in casing or separators map to the same
/// field and are rejected
fn column_fields<'a>(
    columns: impl Iterator<Item = &'a Column>,
) -> Result<(Vec<Field>, BTreeSet<&'static str>), MergeError> {
    let mut imports = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut fields = Vec::new();
    for column in columns {
        let name = field_name(&column.name);
        if !seen.insert(name.clone()) {
            return Err(MergeError::NameCollision {
                name,
                found: "the field of another column",
            });
        }
        let go_type = map_descriptor(&column.data_type);
        imports.extend(go_type.import());
        fields.push(Field::named(name, go_type.render()));
    }
    Ok((fields, imports))
}

/// Regenerate a composite type's model file
pub fn merge_composite(
    existing: Option<&str>,
    composite: &CompositeType,
    package: &str,
) -> Result<String, MergeError> {
    let mut file = load(existing, package)?;
    let type_name = to_pascal_case(&composite.name);

    let (fields, imports) = column_fields(composite.columns.iter())?;
    let body = render_struct(&type_name, &fields);
    let shape = struct_shape(&type_name, &fields);

    match locate_struct(&file, &type_name)? {
        Some(index) => file.replace(index, body, shape),
        None => {
            let anchor = file.anchor();
            file.insert(anchor, Decl::generated(body, shape));
        }
    }

    sync_imports(&mut file, &imports);
    Ok(file.print())
}

/// Regenerate an enum's model file
pub fn merge_enum(existing: Option<&str>, enum_type: &EnumType, package: &str) -> Result<String, MergeError> {
    let mut file = load(existing, package)?;
    let type_name = to_pascal_case(&enum_type.name);
    let members = enum_members(&type_name, &enum_type.values)?;

    let type_index = locate_enum_type(&file, &type_name)?;
    let const_index = locate_enum_consts(&file, &type_name);
    check_member_collisions(&file, &members, const_index)?;

    let type_decl = || {
        Decl::generated(
            format!("type {type_name} string"),
            DeclShape::NamedType {
                name: type_name.clone(),
                underlying: "string".to_string(),
            },
        )
    };

    let type_index = match (type_index, const_index) {
        (Some(index), _) => index,
        (None, Some(const_index)) => file.insert(const_index, type_decl()),
        (None, None) => {
            let anchor = file.anchor();
            file.insert(anchor, type_decl())
        }
    };
    // The type declaration is owned even when left as found
    file.decls[type_index].managed = true;

    if members.is_empty() {
        if let Some(index) = locate_enum_consts(&file, &type_name) {
            debug!(enum_type = ?enum_type.name, "Dropping constant block of empty enum");
            file.decls.remove(index);
        }
    } else {
        let body = render_const_block(&type_name, &members);
        let shape = DeclShape::Const {
            specs: members
                .iter()
                .map(|(name, _)| ConstSpec {
                    names: vec![name.clone()],
                    ty: Some(type_name.clone()),
                })
                .collect(),
        };
        match locate_enum_consts(&file, &type_name) {
            Some(index) => file.replace(index, body, shape),
            None => {
                file.insert(type_index + 1, Decl::generated(body, shape));
            }
        }
    }

    sync_imports(&mut file, &BTreeSet::new());
    Ok(file.print())
}

/// `(member name, literal value)` pairs in declaration order
///
/// Values that PascalCase to the same member name are a collision.
pub fn enum_members(type_name: &str, values: &[String]) -> Result<Vec<(String, String)>, MergeError> {
    let mut seen = BTreeSet::new();
    let mut members = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let suffix = to_pascal_case(value);
        let suffix = if suffix.is_empty() {
            format!("Value{index}")
        } else {
            suffix
        };
        let name = format!("{type_name}{suffix}");
        if !seen.insert(name.clone()) {
            return Err(MergeError::NameCollision {
                name,
                found: "another enum member",
            });
        }
        members.push((name, value.clone()));
    }
    Ok(members)
}

fn locate_struct(file: &GoFile, name: &str) -> Result<Option<usize>, MergeError> {
    match file.find(name) {
        None => Ok(None),
        Some((index, decl)) => match &decl.shape {
            DeclShape::Struct { .. } => Ok(Some(index)),
            other => Err(collision(name, other)),
        },
    }
}

fn locate_enum_type(file: &GoFile, name: &str) -> Result<Option<usize>, MergeError> {
    match file.find(name) {
        None => Ok(None),
        Some((index, decl)) => match &decl.shape {
            DeclShape::NamedType { underlying, .. } if underlying == "string" => Ok(Some(index)),
            other => Err(collision(name, other)),
        },
    }
}

/// The const block whose members all carry the enum's name as a prefix and
/// whose first entry is typed as the enum
fn locate_enum_consts(file: &GoFile, type_name: &str) -> Option<usize> {
    file.decls.iter().position(|decl| match &decl.shape {
        DeclShape::Const { specs } => {
            specs.first().and_then(|s| s.ty.as_deref()) == Some(type_name)
                && specs
                    .iter()
                    .flat_map(|s| &s.names)
                    .all(|n| n.starts_with(type_name))
        }
        _ => false,
    })
}

fn check_member_collisions(
    file: &GoFile,
    members: &[(String, String)],
    const_index: Option<usize>,
) -> Result<(), MergeError> {
    for (name, _) in members {
        if let Some((index, decl)) = file.find(name) {
            if Some(index) != const_index {
                return Err(collision(name, &decl.shape));
            }
        }
    }
    Ok(())
}

fn collision(name: &str, shape: &DeclShape) -> MergeError {
    MergeError::NameCollision {
        name: name.to_string(),
        found: shape.description(),
    }
}

/// Add or drop the managed imports; other imports are left as found
///
/// A managed import stays while preserved code still references it.
fn sync_imports(file: &mut GoFile, needed: &BTreeSet<&'static str>) {
    let preserved = file.preserved_qualifiers();
    let keep: Vec<(&str, bool)> = MANAGED_IMPORTS
        .iter()
        .map(|&path| {
            let referenced = file
                .imports
                .iter()
                .filter(|spec| spec.path == path)
                .any(|spec| preserved.contains(spec.local_name()));
            (path, needed.contains(path) || referenced)
        })
        .collect();

    for (path, keep) in keep {
        if keep {
            file.add_import(path);
        } else if file.has_import(path) {
            trace!(import = path, "Dropping unused managed import");
            file.remove_import(path);
        }
    }
}
