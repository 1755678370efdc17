//! Declaration-level Go syntax tree
//!
//! A Go source file is parsed with tree-sitter into a flat list of top-level
//! declarations. Each declaration keeps its exact source text (plus any
//! comments attached to it) so preserved code is re-emitted byte for byte;
//! only declarations the generator owns are ever re-rendered.
//!
//! Printing is canonical: package clause, one sorted import block, then the
//! declarations separated by the blank lines they had when parsed. Printing a
//! freshly parsed printer output yields the same bytes.

use std::collections::BTreeSet;

use thiserror::Error;
use tree_sitter::{Node, Parser};

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("Go grammar could not be loaded: {0}")]
    Language(String),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column}")]
    Invalid { line: usize, column: usize },

    #[error("missing package clause")]
    NoPackage,
}

/// One `import` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Comment lines directly above the entry
    pub leading: Vec<String>,
    /// Entry text as written, including a same-line comment
    pub text: String,
    pub alias: Option<String>,
    pub path: String,
}

impl ImportSpec {
    pub fn plain(path: &str) -> Self {
        Self {
            leading: Vec::new(),
            text: format!("\"{path}\""),
            alias: None,
            path: path.to_string(),
        }
    }

    /// Identifier the import is referenced by inside the file
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstSpec {
    pub names: Vec<String>,
    pub ty: Option<String>,
}

/// What a top-level declaration declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclShape {
    /// `type X struct { ... }`
    Struct { name: String, fields: Vec<String> },
    /// `type X Y` for any non-struct Y
    NamedType { name: String, underlying: String },
    /// `const ...`, single or grouped
    Const { specs: Vec<ConstSpec> },
    /// Everything else: functions, methods, vars, grouped types
    Other {
        description: &'static str,
        names: Vec<String>,
    },
}

impl DeclShape {
    pub fn declares(&self, name: &str) -> bool {
        match self {
            Self::Struct { name: n, .. } | Self::NamedType { name: n, .. } => n == name,
            Self::Const { specs } => specs.iter().any(|s| s.names.iter().any(|n| n == name)),
            Self::Other { names, .. } => names.iter().any(|n| n == name),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Struct { .. } => "a struct type",
            Self::NamedType { .. } => "a named type",
            Self::Const { .. } => "a constant",
            Self::Other { description, .. } => *description,
        }
    }
}

/// One top-level declaration
#[derive(Debug, Clone)]
pub struct Decl {
    /// Comments above the declaration, verbatim up to its first byte
    pub leading: String,
    /// Declaration text, including a same-line trailing comment
    pub body: String,
    /// Separated from the previous item by at least one blank line
    pub blank_before: bool,
    pub shape: DeclShape,
    /// Package names referenced inside the declaration (`time` in `time.Time`)
    pub qualifiers: BTreeSet<String>,
    /// Owned by the generator in the current run
    pub managed: bool,
}

impl Decl {
    pub fn generated(body: String, shape: DeclShape) -> Self {
        Self {
            leading: String::new(),
            body,
            blank_before: true,
            shape,
            qualifiers: BTreeSet::new(),
            managed: true,
        }
    }
}

/// A parsed Go source file
#[derive(Debug, Clone, Default)]
pub struct GoFile {
    /// Everything before the package clause (build tags, package docs)
    pub header: String,
    pub package: String,
    pub package_line: String,
    /// Comments between the package clause and the imports
    pub import_leading: String,
    pub imports: Vec<ImportSpec>,
    /// Comments at the end of an import block
    pub import_tail: Vec<String>,
    pub decls: Vec<Decl>,
    /// Comments after the last declaration
    pub trailer: String,
}

enum LastItem {
    None,
    Package(usize),
    Import,
    Decl(usize),
}

impl GoFile {
    /// An empty file in the given package
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            package_line: format!("package {package}"),
            ..Default::default()
        }
    }

    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| SyntaxError::Language(e.to_string()))?;
        let tree = parser.parse(source, None).ok_or(SyntaxError::NoTree)?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error(root)
                .map(|n| n.start_position())
                .unwrap_or_else(|| root.start_position());
            return Err(SyntaxError::Invalid {
                line: position.row + 1,
                column: position.column + 1,
            });
        }

        let mut cursor = root.walk();
        let children: Vec<Node> = root.named_children(&mut cursor).collect();

        let mut file = GoFile::default();
        let mut seen_package = false;
        let mut pending: Option<usize> = None;
        let mut last_end = 0usize;
        let mut last_row: Option<usize> = None;
        let mut last_item = LastItem::None;

        for node in children {
            let text = &source[node.byte_range()];

            if node.kind() == "comment" {
                let same_line = pending.is_none() && last_row == Some(node.start_position().row);
                if !same_line {
                    pending.get_or_insert(node.start_byte());
                    continue;
                }
                match last_item {
                    LastItem::Package(start) => {
                        file.package_line = source[start..node.end_byte()].to_string();
                    }
                    LastItem::Import => {
                        if let Some(spec) = file.imports.last_mut() {
                            spec.text.push(' ');
                            spec.text.push_str(text);
                        }
                    }
                    LastItem::Decl(start) => {
                        if let Some(decl) = file.decls.last_mut() {
                            decl.body = source[start..node.end_byte()].to_string();
                        }
                    }
                    LastItem::None => {
                        pending = Some(node.start_byte());
                    }
                }
                last_end = node.end_byte();
                last_row = Some(node.end_position().row);
                continue;
            }

            match node.kind() {
                "package_clause" => {
                    seen_package = true;
                    pending = None;
                    file.header = source[..node.start_byte()].trim_start().to_string();
                    file.package_line = text.to_string();
                    file.package = text.trim_start_matches("package").trim().to_string();
                    last_item = LastItem::Package(node.start_byte());
                }
                "import_declaration" => {
                    let leading = pending
                        .take()
                        .map(|start| source[start..node.start_byte()].trim_end().to_string());
                    parse_import_declaration(node, source, &mut file, leading);
                    last_item = LastItem::Import;
                }
                _ => {
                    let leading_start = pending.take().unwrap_or(node.start_byte());
                    let gap = &source[last_end.min(leading_start)..leading_start];
                    file.decls.push(Decl {
                        leading: source[leading_start..node.start_byte()].to_string(),
                        body: text.to_string(),
                        blank_before: gap.matches('\n').count() >= 2,
                        shape: shape_of(node, source),
                        qualifiers: qualifiers_of(node, source),
                        managed: false,
                    });
                    last_item = LastItem::Decl(node.start_byte());
                }
            }
            last_end = node.end_byte();
            last_row = Some(node.end_position().row);
        }

        if !seen_package {
            return Err(SyntaxError::NoPackage);
        }
        if let Some(start) = pending {
            file.trailer = source[start..].trim_end().to_string();
        }

        Ok(file)
    }

    /// First declaration that declares `name`
    pub fn find(&self, name: &str) -> Option<(usize, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .find(|(_, decl)| decl.shape.declares(name))
    }

    /// Where new declarations go: right after the imports, or at the end
    /// of a file without imports
    pub fn anchor(&self) -> usize {
        if self.imports.is_empty() {
            self.decls.len()
        } else {
            0
        }
    }

    pub fn insert(&mut self, index: usize, decl: Decl) -> usize {
        let index = index.min(self.decls.len());
        self.decls.insert(index, decl);
        index
    }

    /// Swap in a regenerated body, keeping the comments above it
    pub fn replace(&mut self, index: usize, body: String, shape: DeclShape) {
        let decl = &mut self.decls[index];
        decl.body = body;
        decl.shape = shape;
        decl.managed = true;
    }

    pub fn has_import(&self, path: &str) -> bool {
        self.imports.iter().any(|spec| spec.path == path)
    }

    pub fn add_import(&mut self, path: &str) {
        if !self.has_import(path) {
            self.imports.push(ImportSpec::plain(path));
        }
    }

    pub fn remove_import(&mut self, path: &str) {
        self.imports.retain(|spec| spec.path != path);
        // Block comments go with the block
        if self.imports.is_empty() && self.import_tail.is_empty() {
            self.import_leading.clear();
        }
    }

    /// Package qualifiers used by declarations the generator does not own
    pub fn preserved_qualifiers(&self) -> BTreeSet<&str> {
        self.decls
            .iter()
            .filter(|decl| !decl.managed)
            .flat_map(|decl| decl.qualifiers.iter().map(String::as_str))
            .collect()
    }

    /// Render the file canonically
    pub fn print(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header);
        out.push_str(&self.package_line);

        let imports = self.render_imports();
        if !self.import_leading.is_empty() || !imports.is_empty() {
            out.push_str("\n\n");
            if !self.import_leading.is_empty() {
                out.push_str(&self.import_leading);
                out.push('\n');
            }
            out.push_str(&imports);
        }

        for (index, decl) in self.decls.iter().enumerate() {
            out.push_str(if index == 0 || decl.blank_before {
                "\n\n"
            } else {
                "\n"
            });
            out.push_str(&decl.leading);
            out.push_str(&decl.body);
        }

        if !self.trailer.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.trailer);
        }
        out.push('\n');
        out
    }

    fn render_imports(&self) -> String {
        let mut specs: Vec<&ImportSpec> = self.imports.iter().collect();
        specs.sort_by(|a, b| (&a.path, &a.alias).cmp(&(&b.path, &b.alias)));
        specs.dedup_by(|a, b| a.path == b.path && a.alias == b.alias);

        match specs.as_slice() {
            [] if self.import_tail.is_empty() => String::new(),
            [only] if only.leading.is_empty() && self.import_tail.is_empty() => {
                format!("import {}", only.text)
            }
            _ => {
                let mut out = String::from("import (\n");
                for spec in specs {
                    for comment in &spec.leading {
                        out.push('\t');
                        out.push_str(comment);
                        out.push('\n');
                    }
                    out.push('\t');
                    out.push_str(&spec.text);
                    out.push('\n');
                }
                for comment in &self.import_tail {
                    out.push('\t');
                    out.push_str(comment);
                    out.push('\n');
                }
                out.push(')');
                out
            }
        }
    }
}

/// A struct field; `name: None` is an embedded type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Option<String>,
    pub ty: String,
}

impl Field {
    pub fn named(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ty: ty.into(),
        }
    }

    pub fn embedded(ty: impl Into<String>) -> Self {
        Self {
            name: None,
            ty: ty.into(),
        }
    }
}

/// `type Name struct { ... }` with gofmt-style column alignment
pub fn render_struct(name: &str, fields: &[Field]) -> String {
    let width = fields
        .iter()
        .filter_map(|f| f.name.as_deref())
        .map(str::len)
        .max()
        .unwrap_or(0);

    let mut out = format!("type {name} struct {{\n");
    for field in fields {
        match &field.name {
            Some(field_name) => {
                out.push_str(&format!("\t{field_name:<width$} {}\n", field.ty));
            }
            None => {
                out.push('\t');
                out.push_str(&field.ty);
                out.push('\n');
            }
        }
    }
    out.push('}');
    out
}

pub fn struct_shape(name: &str, fields: &[Field]) -> DeclShape {
    DeclShape::Struct {
        name: name.to_string(),
        fields: fields
            .iter()
            .map(|f| f.name.clone().unwrap_or_else(|| embedded_name(&f.ty)))
            .collect(),
    }
}

/// `const ( Name Type = "value" ... )`
pub fn render_const_block(ty: &str, members: &[(String, String)]) -> String {
    let width = members.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut out = String::from("const (\n");
    for (name, value) in members {
        out.push_str(&format!("\t{name:<width$} {ty} = {}\n", go_string_literal(value)));
    }
    out.push(')');
    out
}

/// Quote a string as a Go interpreted string literal
pub fn go_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Name an embedded field is addressed by: `*pkg.Type` -> `Type`
fn embedded_name(ty: &str) -> String {
    let ty = ty.trim_start_matches('*');
    ty.rsplit('.').next().unwrap_or(ty).to_string()
}

fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn field_text(node: Node, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
}

fn first_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            // Reverse so the earliest child is inspected first
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// `leading` is the comment text directly above the declaration: it belongs
/// to the entry of a single import and to the block of a grouped one
fn parse_import_declaration(node: Node, source: &str, file: &mut GoFile, mut leading: Option<String>) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        match child.kind() {
            "import_spec" => {
                let lines = leading
                    .take()
                    .map(|text| {
                        text.lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                file.imports.push(import_spec(child, source, lines));
            }
            "import_spec_list" => {
                if let Some(text) = leading.take() {
                    if !file.import_leading.is_empty() {
                        file.import_leading.push('\n');
                    }
                    file.import_leading.push_str(&text);
                }
                parse_import_list(child, source, file);
            }
            _ => {}
        }
    }
}

fn parse_import_list(list: Node, source: &str, file: &mut GoFile) {
    let mut cursor = list.walk();
    let children: Vec<Node> = list.named_children(&mut cursor).collect();

    let mut leading: Vec<String> = Vec::new();
    let mut last_row: Option<usize> = None;
    for child in children {
        match child.kind() {
            "comment" => {
                let text = node_text(child, source);
                if leading.is_empty() && last_row == Some(child.start_position().row) {
                    if let Some(spec) = file.imports.last_mut() {
                        spec.text.push(' ');
                        spec.text.push_str(text);
                    }
                } else {
                    leading.push(text.to_string());
                }
            }
            "import_spec" => {
                file.imports
                    .push(import_spec(child, source, std::mem::take(&mut leading)));
                last_row = Some(child.end_position().row);
            }
            _ => {}
        }
    }
    file.import_tail.extend(leading);
}

fn import_spec(node: Node, source: &str, leading: Vec<String>) -> ImportSpec {
    let path = field_text(node, "path", source).unwrap_or_default();
    ImportSpec {
        leading,
        text: node_text(node, source).to_string(),
        alias: field_text(node, "name", source),
        path: path.trim_matches(|c| c == '"' || c == '`').to_string(),
    }
}

fn shape_of(node: Node, source: &str) -> DeclShape {
    match node.kind() {
        "type_declaration" => type_shape(node, source),
        "const_declaration" => {
            let specs = named_children_of_kind(node, "const_spec")
                .into_iter()
                .map(|spec| ConstSpec {
                    names: field_texts(spec, "name", source),
                    ty: field_text(spec, "type", source),
                })
                .collect();
            DeclShape::Const { specs }
        }
        "var_declaration" => {
            let mut specs = named_children_of_kind(node, "var_spec");
            for list in named_children_of_kind(node, "var_spec_list") {
                specs.extend(named_children_of_kind(list, "var_spec"));
            }
            DeclShape::Other {
                description: "a variable",
                names: specs
                    .into_iter()
                    .flat_map(|spec| field_texts(spec, "name", source))
                    .collect(),
            }
        }
        "function_declaration" => DeclShape::Other {
            description: "a function",
            names: field_text(node, "name", source).into_iter().collect(),
        },
        "method_declaration" => DeclShape::Other {
            description: "a method",
            names: Vec::new(),
        },
        _ => DeclShape::Other {
            description: "a statement",
            names: Vec::new(),
        },
    }
}

fn type_shape(node: Node, source: &str) -> DeclShape {
    let mut cursor = node.walk();
    let specs: Vec<Node> = node
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    if let [spec] = specs.as_slice() {
        let is_plain = spec.kind() == "type_spec"
            && spec.child_by_field_name("type_parameters").is_none();
        if let (true, Some(name), Some(ty)) = (
            is_plain,
            field_text(*spec, "name", source),
            spec.child_by_field_name("type"),
        ) {
            if ty.kind() == "struct_type" {
                return DeclShape::Struct {
                    name,
                    fields: struct_field_names(ty, source),
                };
            }
            return DeclShape::NamedType {
                name,
                underlying: node_text(ty, source).to_string(),
            };
        }
    }

    DeclShape::Other {
        description: "a type declaration",
        names: specs
            .iter()
            .filter_map(|spec| field_text(*spec, "name", source))
            .collect(),
    }
}

fn struct_field_names(struct_type: Node, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for list in named_children_of_kind(struct_type, "field_declaration_list") {
        for field in named_children_of_kind(list, "field_declaration") {
            let declared = field_texts(field, "name", source);
            if declared.is_empty() {
                if let Some(ty) = field_text(field, "type", source) {
                    names.push(embedded_name(&ty));
                }
            } else {
                names.extend(declared);
            }
        }
    }
    names
}

fn named_children_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() == kind)
        .collect()
}

fn field_texts(node: Node, field: &str, source: &str) -> Vec<String> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor)
        .map(|n| node_text(n, source).to_string())
        .collect()
}

fn qualifiers_of(node: Node, source: &str) -> BTreeSet<String> {
    let mut qualifiers = BTreeSet::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "qualified_type" => {
                if let Some(package) = current.child_by_field_name("package") {
                    qualifiers.insert(node_text(package, source).to_string());
                }
            }
            "selector_expression" => {
                if let Some(operand) = current.child_by_field_name("operand") {
                    if operand.kind() == "identifier" {
                        qualifiers.insert(node_text(operand, source).to_string());
                    }
                }
            }
            _ => {}
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
    qualifiers
}
