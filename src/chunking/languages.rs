//! Grammar dispatch for structural chunking.
//!
//! Each supported language maps a file extension to a tree-sitter grammar and
//! knows which syntax nodes are functions, classes and methods. Everything
//! else in a file is left to the module-level fallback.

use tree_sitter::Node;
use tree_sitter_language::LanguageFn;

/// Languages with a structural parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
    Java,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefinitionKind {
    Function,
    Class,
    Method,
}

/// A definition found in the syntax tree.
///
/// `node` is the declaration itself; `outer` is the node whose span becomes
/// the unit (an `export` or decorator wrapper when present).
#[derive(Debug, Clone)]
pub(crate) struct Definition<'t> {
    pub kind: DefinitionKind,
    pub node: Node<'t>,
    pub outer: Node<'t>,
    pub name: Option<String>,
}

impl Language {
    pub fn for_path(path: &str) -> Option<Self> {
        let extension = std::path::Path::new(path).extension()?.to_str()?;

        match extension.to_ascii_lowercase().as_str() {
            "py" | "pyw" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    pub fn grammar(self) -> LanguageFn {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE,
            Self::JavaScript => tree_sitter_javascript::LANGUAGE,
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX,
            Self::Rust => tree_sitter_rust::LANGUAGE,
            Self::Go => tree_sitter_go::LANGUAGE,
            Self::Java => tree_sitter_java::LANGUAGE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
        }
    }

    /// Sibling node kinds that attach to the following definition.
    pub(crate) fn decorator_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["attribute_item"],
            Self::JavaScript | Self::TypeScript | Self::Tsx => &["decorator"],
            // Python decorators live inside decorated_definition,
            // Java annotations inside the declaration's modifiers.
            Self::Python | Self::Go | Self::Java => &[],
        }
    }

    /// Classify a top-level node.
    pub(crate) fn classify<'t>(self, node: Node<'t>, source: &str) -> Option<Definition<'t>> {
        match self {
            Self::Python => classify_python(node, source),
            Self::JavaScript | Self::TypeScript | Self::Tsx => classify_script(node, source),
            Self::Rust => classify_rust(node, source),
            Self::Go => classify_go(node, source),
            Self::Java => classify_java(node, source),
        }
    }

    /// Methods declared directly in a class-like definition's body.
    pub(crate) fn methods<'t>(self, class: Node<'t>, source: &str) -> Vec<Definition<'t>> {
        let Some(body) = class.child_by_field_name("body") else {
            return Vec::new();
        };

        let mut methods = Vec::new();
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match self {
                Self::Python => {
                    if let Some(def) = classify_python(child, source) {
                        if def.kind == DefinitionKind::Function {
                            methods.push(as_method(def));
                        }
                    }
                }
                Self::JavaScript | Self::TypeScript | Self::Tsx => {
                    if child.kind() == "method_definition" {
                        methods.push(named(DefinitionKind::Method, child, child, source));
                    }
                }
                Self::Rust => {
                    if child.kind() == "function_item" {
                        methods.push(named(DefinitionKind::Method, child, child, source));
                    }
                }
                Self::Java => collect_java_methods(child, source, &mut methods),
                Self::Go => {}
            }
        }
        methods
    }
}

fn node_text(node: Node<'_>, source: &str) -> Option<String> {
    source.get(node.byte_range()).map(|s| s.to_string())
}

fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| node_text(n, source))
}

fn named<'t>(kind: DefinitionKind, node: Node<'t>, outer: Node<'t>, source: &str) -> Definition<'t> {
    Definition {
        kind,
        node,
        outer,
        name: field_text(node, "name", source),
    }
}

fn as_method(def: Definition<'_>) -> Definition<'_> {
    Definition {
        kind: DefinitionKind::Method,
        ..def
    }
}

fn classify_python<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_definition" => Some(named(DefinitionKind::Function, node, node, source)),
        "class_definition" => Some(named(DefinitionKind::Class, node, node, source)),
        "decorated_definition" => {
            let inner = node.child_by_field_name("definition")?;
            let def = classify_python(inner, source)?;
            Some(Definition { outer: node, ..def })
        }
        _ => None,
    }
}

fn classify_script<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            Some(named(DefinitionKind::Function, node, node, source))
        }
        "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
            Some(named(DefinitionKind::Class, node, node, source))
        }
        "export_statement" => {
            let inner = node.child_by_field_name("declaration")?;
            let def = classify_script(inner, source)?;
            Some(Definition { outer: node, ..def })
        }
        "lexical_declaration" | "variable_declaration" => {
            // `const handler = () => {}` with a single binding
            let mut cursor = node.walk();
            let mut declarators = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator");
            let declarator = declarators.next()?;
            if declarators.next().is_some() {
                return None;
            }
            let value = declarator.child_by_field_name("value")?;
            match value.kind() {
                "arrow_function" | "function_expression" | "function" | "generator_function" => {
                    Some(Definition {
                        kind: DefinitionKind::Function,
                        node: value,
                        outer: node,
                        name: field_text(declarator, "name", source),
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn classify_rust<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_item" => Some(named(DefinitionKind::Function, node, node, source)),
        "impl_item" => Some(Definition {
            kind: DefinitionKind::Class,
            node,
            outer: node,
            name: field_text(node, "type", source),
        }),
        "trait_item" | "struct_item" | "enum_item" => {
            Some(named(DefinitionKind::Class, node, node, source))
        }
        _ => None,
    }
}

fn classify_go<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "function_declaration" => Some(named(DefinitionKind::Function, node, node, source)),
        "method_declaration" => Some(named(DefinitionKind::Method, node, node, source)),
        "type_declaration" => {
            let mut cursor = node.walk();
            let name = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "type_spec" | "type_alias"))
                .and_then(|spec| field_text(spec, "name", source));
            Some(Definition {
                kind: DefinitionKind::Class,
                node,
                outer: node,
                name,
            })
        }
        _ => None,
    }
}

fn classify_java<'t>(node: Node<'t>, source: &str) -> Option<Definition<'t>> {
    match node.kind() {
        "class_declaration"
        | "interface_declaration"
        | "enum_declaration"
        | "record_declaration" => Some(named(DefinitionKind::Class, node, node, source)),
        _ => None,
    }
}

fn collect_java_methods<'t>(node: Node<'t>, source: &str, out: &mut Vec<Definition<'t>>) {
    match node.kind() {
        "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
            out.push(named(DefinitionKind::Method, node, node, source));
        }
        "enum_body_declarations" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_java_methods(child, source, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_path() {
        assert_eq!(Language::for_path("src/app.py"), Some(Language::Python));
        assert_eq!(Language::for_path("web/App.jsx"), Some(Language::JavaScript));
        assert_eq!(Language::for_path("web/app.ts"), Some(Language::TypeScript));
        assert_eq!(Language::for_path("web/App.tsx"), Some(Language::Tsx));
        assert_eq!(Language::for_path("src/lib.rs"), Some(Language::Rust));
        assert_eq!(Language::for_path("cmd/main.go"), Some(Language::Go));
        assert_eq!(Language::for_path("src/Main.java"), Some(Language::Java));
        assert_eq!(Language::for_path("README.md"), None);
        assert_eq!(Language::for_path("Makefile"), None);
    }

    #[test]
    fn test_grammars_load() {
        for lang in [
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Tsx,
            Language::Rust,
            Language::Go,
            Language::Java,
        ] {
            let mut parser = tree_sitter::Parser::new();
            assert!(
                parser.set_language(&lang.grammar().into()).is_ok(),
                "grammar failed to load for {}",
                lang.name()
            );
        }
    }
}
