//! Code chunking
//!
//! Splits file contents into code units for indexing. Recognized source files
//! are chunked along syntax boundaries (functions, classes, methods) using
//! tree-sitter; everything else, including source that fails to parse, is
//! split with a fixed-size sliding window.

mod languages;

pub use languages::Language;

use crate::config::ChunkingConfig;
use languages::{Definition, DefinitionKind};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use tracing::{debug, warn};
use tree_sitter::Parser;

/// Kind of a code unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Function,
    Class,
    Method,
    /// Top-level code not captured by a structural unit
    Module,
    /// Fixed-window segment of unparsed text
    Block,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Module => "module",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently retrievable span of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    /// Path relative to the project root, `/`-separated
    pub file_path: String,
    pub content: String,
    /// 1-indexed, inclusive
    pub start_line: usize,
    /// 1-indexed, inclusive
    pub end_line: usize,
    pub kind: UnitKind,
    pub name: Option<String>,
}

impl CodeUnit {
    /// Stable identity used to merge results from different rankers
    pub fn id(&self) -> String {
        format!("{}:{}", self.file_path, self.start_line)
    }

    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// Splits one file version into code units.
pub trait Chunker: Send + Sync {
    /// Never fails: unparseable input degrades to fixed-size blocks.
    fn chunk(&self, file_path: &str, content: &str) -> Vec<CodeUnit>;
}

/// Syntax-aware chunker with a fixed-window fallback
pub struct CodeChunker {
    config: ChunkingConfig,
}

impl CodeChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn chunk_by_syntax(
        &self,
        language: Language,
        file_path: &str,
        content: &str,
        lines: &[&str],
    ) -> Option<Vec<CodeUnit>> {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&language.grammar().into()) {
            warn!(language = language.name(), error = %e, "Failed to load grammar");
            return None;
        }

        let Some(tree) = parser.parse(content, None) else {
            debug!(path = %file_path, "Parser returned no tree, using fixed windows");
            return None;
        };
        let root = tree.root_node();
        if root.has_error() {
            debug!(path = %file_path, language = language.name(), "Syntax errors, using fixed windows");
            return None;
        }

        let min_lines = self.config.min_lines.max(1);
        let mut occupied = vec![false; lines.len()];
        let mut units = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let Some(def) = language.classify(node, content) else {
                continue;
            };
            let (start, end) = unit_span(language, &def, lines.len());
            let len = end + 1 - start;

            match def.kind {
                DefinitionKind::Function | DefinitionKind::Method => {
                    if len >= min_lines {
                        let kind = if def.kind == DefinitionKind::Method {
                            UnitKind::Method
                        } else {
                            UnitKind::Function
                        };
                        units.push(make_unit(file_path, lines, start, end, kind, def.name));
                        occupied[start..=end].fill(true);
                    }
                }
                DefinitionKind::Class => {
                    let methods = language.methods(def.node, content);
                    if len > self.config.max_class_lines {
                        // Oversized: represented by its methods alone
                        for method in methods {
                            let (ms, me) = unit_span(language, &method, lines.len());
                            if me + 1 - ms >= min_lines {
                                units.push(make_unit(
                                    file_path,
                                    lines,
                                    ms,
                                    me,
                                    UnitKind::Method,
                                    method.name,
                                ));
                                occupied[ms..=me].fill(true);
                            }
                        }
                    } else if len >= min_lines {
                        units.push(make_unit(file_path, lines, start, end, UnitKind::Class, def.name));
                        occupied[start..=end].fill(true);
                        for method in methods {
                            let (ms, me) = unit_span(language, &method, lines.len());
                            if me + 1 - ms >= min_lines {
                                units.push(make_unit(
                                    file_path,
                                    lines,
                                    ms,
                                    me,
                                    UnitKind::Method,
                                    method.name,
                                ));
                            }
                        }
                    }
                }
            }
        }

        units.extend(module_units(file_path, lines, &occupied));
        units.sort_by_key(|u| (u.start_line, Reverse(u.end_line)));

        debug!(
            path = %file_path,
            language = language.name(),
            units = units.len(),
            "Chunked by syntax"
        );
        Some(units)
    }

    fn chunk_by_window(&self, file_path: &str, lines: &[&str]) -> Vec<CodeUnit> {
        let total = lines.len();
        let size = self.config.block_size.max(1);
        let step = size.saturating_sub(self.config.block_overlap).max(1);

        let mut units = Vec::new();
        let mut start = 0;
        while start < total {
            let end = (start + size).min(total);
            let window = &lines[start..end];
            if window.iter().any(|l| !l.trim().is_empty()) {
                units.push(make_unit(file_path, lines, start, end - 1, UnitKind::Block, None));
            }
            if end == total {
                break;
            }
            start += step;
        }
        units
    }
}

impl Chunker for CodeChunker {
    fn chunk(&self, file_path: &str, content: &str) -> Vec<CodeUnit> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let lines: Vec<&str> = content.lines().collect();

        if let Some(language) = Language::for_path(file_path) {
            if let Some(units) = self.chunk_by_syntax(language, file_path, content, &lines) {
                return units;
            }
        }
        self.chunk_by_window(file_path, &lines)
    }
}

/// 0-indexed inclusive line span of a definition, including attached
/// decorator lines before it.
fn unit_span(language: Language, def: &Definition<'_>, line_count: usize) -> (usize, usize) {
    let last = line_count.saturating_sub(1);
    let mut start = def.outer.start_position().row;

    let decorators = language.decorator_kinds();
    if !decorators.is_empty() {
        let mut prev = def.outer.prev_named_sibling();
        while let Some(p) = prev {
            if !decorators.contains(&p.kind()) || p.end_position().row + 1 < start {
                break;
            }
            start = p.start_position().row;
            prev = p.prev_named_sibling();
        }
    }

    let end_pos = def.outer.end_position();
    let mut end = end_pos.row;
    if end_pos.column == 0 && end > start {
        end -= 1;
    }

    let start = start.min(last);
    (start, end.clamp(start, last))
}

fn make_unit(
    file_path: &str,
    lines: &[&str],
    start: usize,
    end: usize,
    kind: UnitKind,
    name: Option<String>,
) -> CodeUnit {
    CodeUnit {
        file_path: file_path.to_string(),
        content: lines[start..=end].join("\n"),
        start_line: start + 1,
        end_line: end + 1,
        kind,
        name,
    }
}

/// Maximal runs of unoccupied lines, skipping whitespace-only runs
fn module_units(file_path: &str, lines: &[&str], occupied: &[bool]) -> Vec<CodeUnit> {
    let mut units = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..=lines.len() {
        let free = i < lines.len() && !occupied[i];
        match (free, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                let run = &lines[start..i];
                if run.iter().any(|l| !l.trim().is_empty()) {
                    units.push(make_unit(file_path, lines, start, i - 1, UnitKind::Module, None));
                }
                run_start = None;
            }
            _ => {}
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> CodeChunker {
        CodeChunker::new(ChunkingConfig::default())
    }

    fn python_function(name: &str, body_lines: usize) -> String {
        let mut s = format!("def {}(x):\n", name);
        for i in 0..body_lines {
            s.push_str(&format!("    x = x + {}\n", i));
        }
        s
    }

    /// Top-level units (methods nested inside an emitted class excluded)
    /// must cover every non-blank line exactly once.
    fn assert_covers(units: &[CodeUnit], content: &str) {
        let lines: Vec<&str> = content.lines().collect();
        let mut counts = vec![0usize; lines.len()];
        let classes: Vec<&CodeUnit> = units.iter().filter(|u| u.kind == UnitKind::Class).collect();
        for unit in units {
            let nested = unit.kind == UnitKind::Method
                && classes
                    .iter()
                    .any(|c| c.start_line <= unit.start_line && unit.end_line <= c.end_line);
            if nested {
                continue;
            }
            for line in unit.start_line..=unit.end_line {
                counts[line - 1] += 1;
            }
        }
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                assert!(counts[i] <= 1, "line {} covered {} times", i + 1, counts[i]);
            } else {
                assert_eq!(counts[i], 1, "line {} covered {} times", i + 1, counts[i]);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(chunker().chunk("a.py", "").is_empty());
        assert!(chunker().chunk("a.py", "   \n\n  ").is_empty());
        assert!(chunker().chunk("notes.txt", "\n").is_empty());
    }

    #[test]
    fn test_python_functions_and_module() {
        let content = format!(
            "import os\nimport sys\n\n{}\n{}\nprint('done')\n",
            python_function("load", 6),
            python_function("save", 8)
        );
        let units = chunker().chunk("app.py", &content);

        let functions: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Function).collect();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name.as_deref(), Some("load"));
        assert_eq!(functions[0].start_line, 4);
        assert_eq!(functions[0].end_line, 10);
        assert_eq!(functions[1].name.as_deref(), Some("save"));

        let modules: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Module).collect();
        assert_eq!(modules.len(), 2);
        assert!(modules[0].content.contains("import os"));
        assert!(modules[1].content.contains("print('done')"));
        assert_covers(&units, &content);
    }

    #[test]
    fn test_short_function_folds_into_module() {
        let content = "def tiny():\n    return 1\n\nVALUE = tiny()\n";
        let units = chunker().chunk("tiny.py", content);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, UnitKind::Module);
        assert_eq!(units[0].start_line, 1);
        assert_eq!(units[0].end_line, 4);
    }

    #[test]
    fn test_python_decorator_included_in_span() {
        let content = format!("import functools\n\n@functools.cache\n{}", python_function("cached", 5));
        let units = chunker().chunk("deco.py", &content);
        let function = units.iter().find(|u| u.kind == UnitKind::Function).unwrap();
        assert_eq!(function.start_line, 3);
        assert!(function.content.starts_with("@functools.cache"));
        assert_eq!(function.name.as_deref(), Some("cached"));
        assert_covers(&units, &content);
    }

    #[test]
    fn test_class_with_nested_methods() {
        let mut content = String::from("class UserService:\n    \"\"\"Users.\"\"\"\n\n");
        for name in ["get_user", "delete_user"] {
            content.push_str(&format!("    def {}(self, user_id):\n", name));
            for i in 0..5 {
                content.push_str(&format!("        step_{} = user_id\n", i));
            }
            content.push('\n');
        }
        let units = chunker().chunk("service.py", &content);

        let class = units.iter().find(|u| u.kind == UnitKind::Class).unwrap();
        assert_eq!(class.name.as_deref(), Some("UserService"));
        assert_eq!(class.start_line, 1);

        let methods: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Method).collect();
        assert_eq!(methods.len(), 2);
        for m in &methods {
            assert!(m.start_line >= class.start_line && m.end_line <= class.end_line);
        }
        assert!(!units.iter().any(|u| u.kind == UnitKind::Module));
        assert_covers(&units, &content);
    }

    #[test]
    fn test_oversized_class_emits_methods_only() {
        let mut content = String::from("class BigService:\n");
        for i in 0..59 {
            content.push_str(&format!("    attr_{} = {}\n", i, i));
        }
        for m in 0..3 {
            content.push_str(&format!("    def method_{}(self):\n", m));
            for i in 0..19 {
                content.push_str(&format!("        value_{} = {}\n", i, i));
            }
        }
        assert_eq!(content.lines().count(), 120);

        let units = chunker().chunk("big.py", &content);
        assert!(!units.iter().any(|u| u.kind == UnitKind::Class));

        let methods: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Method).collect();
        assert_eq!(methods.len(), 3);
        assert_eq!((methods[0].start_line, methods[0].end_line), (61, 80));
        assert_eq!((methods[2].start_line, methods[2].end_line), (101, 120));

        let modules: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Module).collect();
        assert_eq!(modules.len(), 1);
        assert_eq!((modules[0].start_line, modules[0].end_line), (1, 60));
        assert_covers(&units, &content);
    }

    #[test]
    fn test_syntax_error_falls_back_to_blocks() {
        let content = "def broken(:\n    pass\n";
        let units = chunker().chunk("broken.py", content);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, UnitKind::Block);
    }

    #[test]
    fn test_fixed_window_for_unknown_type() {
        let content: String = (1..=120).map(|i| format!("line {}\n", i)).collect();
        let units = chunker().chunk("notes.md", &content);
        let spans: Vec<_> = units.iter().map(|u| (u.start_line, u.end_line)).collect();
        assert_eq!(spans, vec![(1, 50), (41, 90), (81, 120)]);
        assert!(units.iter().all(|u| u.kind == UnitKind::Block));
    }

    #[test]
    fn test_fixed_window_skips_blank_windows() {
        let config = ChunkingConfig {
            block_size: 3,
            block_overlap: 0,
            ..ChunkingConfig::default()
        };
        let content = "a\nb\nc\n\n\n\nd\n";
        let units = CodeChunker::new(config).chunk("x.txt", content);
        let spans: Vec<_> = units.iter().map(|u| (u.start_line, u.end_line)).collect();
        assert_eq!(spans, vec![(1, 3), (7, 7)]);
    }

    #[test]
    fn test_rust_attributes_and_impl() {
        let content = r#"use std::fmt;

#[derive(Debug, Clone)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        let point = Self { x, y, z };
        point.validate();
        point
    }

    fn validate(&self) {
        assert!(self.x >= 0);
    }
}
"#;
        let units = chunker().chunk("src/point.rs", content);

        let structure = units
            .iter()
            .find(|u| u.kind == UnitKind::Class && u.name.as_deref() == Some("Point") && u.start_line == 3)
            .unwrap();
        assert!(structure.content.starts_with("#[derive"));

        let imp = units
            .iter()
            .find(|u| u.kind == UnitKind::Class && u.start_line == 10)
            .unwrap();
        assert_eq!(imp.name.as_deref(), Some("Point"));

        let methods: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Method).collect();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name.as_deref(), Some("new"));
        assert_covers(&units, content);
    }

    #[test]
    fn test_typescript_exports_and_arrow_functions() {
        let content = r#"import { db } from './db';

export function findUser(id: string) {
  const user = db.get(id);
  if (!user) {
    return null;
  }
  return user;
}

export const handler = async (req: Request) => {
  const id = req.params.id;
  const user = await findUser(id);
  return user;
};
"#;
        let units = chunker().chunk("api/users.ts", content);
        let functions: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Function).collect();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name.as_deref(), Some("findUser"));
        assert_eq!(functions[0].start_line, 3);
        assert_eq!(functions[1].name.as_deref(), Some("handler"));
        assert_eq!((functions[1].start_line, functions[1].end_line), (11, 15));
        assert_covers(&units, content);
    }

    #[test]
    fn test_go_types_and_methods() {
        let content = r#"package server

type Server struct {
	addr string
	port int
	name string
}

func (s *Server) Start() error {
	if s.port == 0 {
		return nil
	}
	return nil
}
"#;
        let units = chunker().chunk("server.go", content);
        let class = units.iter().find(|u| u.kind == UnitKind::Class).unwrap();
        assert_eq!(class.name.as_deref(), Some("Server"));
        let method = units.iter().find(|u| u.kind == UnitKind::Method).unwrap();
        assert_eq!(method.name.as_deref(), Some("Start"));
        assert_covers(&units, content);
    }

    #[test]
    fn test_java_class_methods() {
        let content = r#"package demo;

public class Greeter {
    private final String name;

    public Greeter(String name) {
        this.name = name;
        validate();
        log();
    }

    @Override
    public String toString() {
        StringBuilder sb = new StringBuilder();
        sb.append(name);
        return sb.toString();
    }
}
"#;
        let units = chunker().chunk("Greeter.java", content);
        let class = units.iter().find(|u| u.kind == UnitKind::Class).unwrap();
        assert_eq!(class.name.as_deref(), Some("Greeter"));
        let names: Vec<_> = units
            .iter()
            .filter(|u| u.kind == UnitKind::Method)
            .filter_map(|u| u.name.as_deref())
            .collect();
        assert_eq!(names, vec!["Greeter", "toString"]);
    }

    #[test]
    fn test_unit_id() {
        let unit = CodeUnit {
            file_path: "src/a.py".to_string(),
            content: String::new(),
            start_line: 12,
            end_line: 20,
            kind: UnitKind::Function,
            name: None,
        };
        assert_eq!(unit.id(), "src/a.py:12");
        assert_eq!(unit.line_count(), 9);
        assert_eq!(UnitKind::Module.to_string(), "module");
    }
}
