//! Static inspection of candidate source with tree-sitter.
//!
//! Nothing here executes candidate code. The parse tree is used to reject
//! syntax errors up front, inventory top-level statements, and resolve the
//! target function by convention.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::core::fault::LoadFailure;

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language version mismatch surfaces as a parse failure below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Parse Python source, mapping grammar errors to [`LoadFailure::SyntaxError`].
pub fn parse(source: &str) -> Result<Tree, LoadFailure> {
    let tree = PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(source, None))
        .ok_or_else(|| LoadFailure::SyntaxError("python grammar unavailable".to_string()))?;
    let root = tree.root_node();
    if root.has_error() {
        let detail = first_error(root, source)
            .unwrap_or_else(|| "source does not parse".to_string());
        return Err(LoadFailure::SyntaxError(detail));
    }
    Ok(tree)
}

fn first_error(node: Node<'_>, source: &str) -> Option<String> {
    if node.is_missing() {
        let pos = node.start_position();
        return Some(format!(
            "line {}, column {}: missing {}",
            pos.row + 1,
            pos.column + 1,
            node.kind()
        ));
    }
    if node.is_error() {
        let pos = node.start_position();
        let snippet: String = node_text(node, source)
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(40)
            .collect();
        return Some(format!(
            "line {}, column {}: unexpected `{}`",
            pos.row + 1,
            pos.column + 1,
            snippet.trim()
        ));
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| first_error(child, source))
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or_default()
}

/// A top-level function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    pub params: Vec<String>,
}

impl FunctionDef {
    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// Classified top-level statements of a candidate module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Source text of each import statement.
    pub imports: Vec<String>,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<String>,
    /// Top-level executable statements unrelated to the solution.
    pub suspicious: Vec<String>,
}

/// Walk the module's direct children and classify them.
pub fn inventory(tree: &Tree, source: &str) -> Inventory {
    let mut inv = Inventory::default();
    let root = tree.root_node();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                inv.imports.push(node_text(node, source).to_string());
            }
            "function_definition" => inv.functions.push(function_def(node, source)),
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(def) if def.kind() == "function_definition" => {
                    inv.functions.push(function_def(def, source));
                }
                Some(def) if def.kind() == "class_definition" => {
                    inv.classes.push(definition_name(def, source));
                }
                _ => inv.suspicious.push(summarize(node, source)),
            },
            "class_definition" => inv.classes.push(definition_name(node, source)),
            "comment" => {}
            "expression_statement" if is_docstring(node) => {}
            _ => inv.suspicious.push(summarize(node, source)),
        }
    }
    inv
}

fn function_def(node: Node<'_>, source: &str) -> FunctionDef {
    let mut params = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            if let Some(name) = parameter_name(param, source) {
                params.push(name);
            }
        }
    }
    FunctionDef {
        name: definition_name(node, source),
        line: node.start_position().row + 1,
        params,
    }
}

fn parameter_name(param: Node<'_>, source: &str) -> Option<String> {
    match param.kind() {
        "identifier" => Some(node_text(param, source).to_string()),
        "default_parameter" | "typed_default_parameter" => param
            .child_by_field_name("name")
            .map(|name| node_text(name, source).to_string()),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            let mut cursor = param.walk();
            let found = param
                .named_children(&mut cursor)
                .find(|child| child.kind() == "identifier")
                .map(|name| node_text(name, source).to_string());
            found
        }
        _ => None,
    }
}

fn definition_name(node: Node<'_>, source: &str) -> String {
    node.child_by_field_name("name")
        .map(|name| node_text(name, source).to_string())
        .unwrap_or_default()
}

fn is_docstring(node: Node<'_>) -> bool {
    node.named_child_count() == 1 && node.named_child(0).is_some_and(|c| c.kind() == "string")
}

fn summarize(node: Node<'_>, source: &str) -> String {
    let first_line = node_text(node, source).lines().next().unwrap_or_default();
    format!("line {}: {}", node.start_position().row + 1, first_line.trim())
}

/// Resolve the function under test.
///
/// An explicit name must match a top-level definition. Without one, exactly
/// one public (non-underscore) top-level function must exist; zero or several
/// is [`LoadFailure::FunctionNotFound`], never a guess.
pub fn resolve_target<'a>(
    inv: &'a Inventory,
    explicit: Option<&str>,
) -> Result<&'a FunctionDef, LoadFailure> {
    if let Some(name) = explicit {
        // A later redefinition shadows an earlier one at runtime.
        return inv
            .functions
            .iter()
            .rev()
            .find(|def| def.name == name)
            .ok_or_else(|| {
                LoadFailure::FunctionNotFound(format!("no top-level function named `{name}`"))
            });
    }
    let mut public: Vec<&FunctionDef> = Vec::new();
    for def in inv.functions.iter().filter(|def| !def.is_private()) {
        match public.iter().position(|seen| seen.name == def.name) {
            Some(idx) => public[idx] = def,
            None => public.push(def),
        }
    }
    match public.as_slice() {
        [] => Err(LoadFailure::FunctionNotFound(
            "no public top-level function definition".to_string(),
        )),
        [single] => Ok(*single),
        many => {
            let names = many
                .iter()
                .map(|def| format!("`{}`", def.name))
                .collect::<Vec<_>>()
                .join(", ");
            Err(LoadFailure::FunctionNotFound(format!(
                "ambiguous target: {names} are all public top-level functions"
            )))
        }
    }
}
