//! Import completion for candidates that use standard facilities without
//! importing them.
//!
//! The synthesized imports run before the candidate in the same namespace;
//! the candidate source itself is never edited, so line numbers in errors
//! stay those of the candidate.
//!
//! Usage is detected on the parse tree, not the raw text, so a dotted name
//! inside a string or comment never pulls in an import. This is a
//! completeness aid, not a security boundary.

use std::collections::BTreeSet;

use tree_sitter::{Node, Tree};

use crate::sandbox::source::node_text;

/// Modules synthesized when referenced as `module.attr`.
const MODULES: &[&str] = &[
    "bisect",
    "collections",
    "datetime",
    "functools",
    "heapq",
    "itertools",
    "json",
    "math",
    "os",
    "random",
    "re",
    "string",
    "sys",
    "typing",
];

/// Bare names synthesized as `from <module> import <name>`.
const NAMES: &[(&str, &str)] = &[
    ("Counter", "collections"),
    ("OrderedDict", "collections"),
    ("defaultdict", "collections"),
    ("deque", "collections"),
    ("Any", "typing"),
    ("Callable", "typing"),
    ("Dict", "typing"),
    ("List", "typing"),
    ("Optional", "typing"),
    ("Set", "typing"),
    ("Tuple", "typing"),
];

/// Import statements needed by `source` that it does not provide itself,
/// in a stable order (module imports, then name imports).
pub fn missing_imports(tree: &Tree, source: &str) -> Vec<String> {
    let mut usage = Usage::default();
    collect(tree.root_node(), source, &mut usage);

    let mut lines = Vec::new();
    for module in MODULES {
        if usage.modules.contains(*module) && !usage.bound.contains(*module) {
            lines.push(format!("import {module}"));
        }
    }
    for (name, module) in NAMES {
        if usage.names.contains(*name) && !usage.bound.contains(*name) {
            lines.push(format!("from {module} import {name}"));
        }
    }
    lines
}

#[derive(Default)]
struct Usage {
    /// Identifiers used as the object of an attribute access.
    modules: BTreeSet<String>,
    /// Identifiers referenced as plain names.
    names: BTreeSet<String>,
    /// Names the source binds itself.
    bound: BTreeSet<String>,
}

fn collect(node: Node<'_>, source: &str, usage: &mut Usage) {
    match node.kind() {
        "import_statement" | "import_from_statement" | "future_import_statement" => {
            record_import_bindings(node, source, usage);
            return;
        }
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                usage.bound.insert(node_text(name, source).to_string());
            }
        }
        "parameters" | "lambda_parameters" => record_parameters(node, source, usage),
        "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => {
            if let Some(left) = node.child_by_field_name("left") {
                record_targets(left, source, usage);
            }
        }
        "attribute" => {
            if let Some(object) = node.child_by_field_name("object") {
                if object.kind() == "identifier" {
                    usage.modules.insert(node_text(object, source).to_string());
                }
            }
        }
        "identifier" if is_reference(node) => {
            usage.names.insert(node_text(node, source).to_string());
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect(child, source, usage);
    }
}

/// False for identifiers that name an attribute or a keyword argument.
fn is_reference(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    let field_is = |field: &str| {
        parent
            .child_by_field_name(field)
            .is_some_and(|child| child.id() == node.id())
    };
    match parent.kind() {
        "attribute" => !field_is("attribute"),
        "keyword_argument" => !field_is("name"),
        _ => true,
    }
}

fn record_import_bindings(node: Node<'_>, source: &str, usage: &mut Usage) {
    let module = node.child_by_field_name("module_name");
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if module.is_some_and(|m| m.id() == child.id()) {
            continue;
        }
        match child.kind() {
            // `import a.b` binds `a`; `from m import a` binds `a`.
            "dotted_name" => {
                let text = node_text(child, source);
                let head = text.split('.').next().unwrap_or(text).trim();
                usage.bound.insert(head.to_string());
            }
            "aliased_import" => {
                if let Some(alias) = child.child_by_field_name("alias") {
                    usage.bound.insert(node_text(alias, source).to_string());
                }
            }
            _ => {}
        }
    }
}

fn record_parameters(node: Node<'_>, source: &str, usage: &mut Usage) {
    let mut cursor = node.walk();
    for param in node.named_children(&mut cursor) {
        let name = match param.kind() {
            "identifier" => Some(param),
            _ => param.child_by_field_name("name").or_else(|| {
                let mut inner = param.walk();
                let found = param
                    .named_children(&mut inner)
                    .find(|child| child.kind() == "identifier");
                found
            }),
        };
        if let Some(name) = name {
            usage.bound.insert(node_text(name, source).to_string());
        }
    }
}

fn record_targets(node: Node<'_>, source: &str, usage: &mut Usage) {
    match node.kind() {
        "identifier" => {
            usage.bound.insert(node_text(node, source).to_string());
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                record_targets(child, source, usage);
            }
        }
        _ => {}
    }
}
