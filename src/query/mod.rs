//! Query interface: the five tools exposed to callers.
//!
//! Every tool returns a [`ToolResponse`], a list of typed content blocks.
//! Failures are reported inside the envelope with `isError` set, never as `Err`.

pub mod mcp;
pub mod tree;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::chunking::CodeUnit;
use crate::index::IncrementalIndexer;

/// Most units listed by `search_by_symbol`
pub const MAX_SYMBOL_RESULTS: usize = 50;
pub const DEFAULT_TREE_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Uniform tool result envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Text of the first block, or "" for an empty envelope
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ContentBlock::Text { text }) => text,
            None => "",
        }
    }
}

impl From<QueryError> for ToolResponse {
    fn from(e: QueryError) -> Self {
        ToolResponse::error(format!("Error: {}", e))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("'{0}' parameter is required")]
    MissingArgument(&'static str),

    #[error("invalid mode '{0}' (expected one of: contains, prefix, exact)")]
    InvalidMode(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// How `search_by_symbol` compares names. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymbolMatchMode {
    #[default]
    Contains,
    Prefix,
    Exact,
}

impl SymbolMatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Prefix => "prefix",
            Self::Exact => "exact",
        }
    }

    pub fn matches(&self, candidate: &str, pattern: &str) -> bool {
        match self {
            Self::Contains => candidate.contains(pattern),
            Self::Prefix => candidate.starts_with(pattern),
            Self::Exact => candidate == pattern,
        }
    }
}

impl fmt::Display for SymbolMatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolMatchMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, QueryError> {
        match s {
            "contains" => Ok(Self::Contains),
            "prefix" => Ok(Self::Prefix),
            "exact" => Ok(Self::Exact),
            other => Err(QueryError::InvalidMode(other.to_string())),
        }
    }
}

/// Render numbered result blocks under a header carrying the result count
fn format_units<'a>(header: &str, results: impl IntoIterator<Item = (&'a CodeUnit, Option<f32>)>) -> String {
    let mut body = String::new();
    let mut count = 0;
    for (unit, score) in results {
        count += 1;
        let name = unit.name.as_deref().unwrap_or("(anonymous)");
        body.push_str(&format!(
            "\n--- [{}] {}:{}-{} | {} | Name: {} ---",
            count, unit.file_path, unit.start_line, unit.end_line, unit.kind, name
        ));
        if let Some(score) = score {
            body.push_str(&format!(" (score {:.3})", score));
        }
        body.push('\n');
        body.push_str(unit.content.trim_end());
        body.push('\n');
    }
    let noun = if count == 1 { "result" } else { "results" };
    format!("=== {} ({} {}) ===\n{}", header, count, noun, body)
}

/// Tool front end over one project's indexer
pub struct QueryInterface {
    indexer: IncrementalIndexer,
}

impl QueryInterface {
    pub fn new(indexer: IncrementalIndexer) -> Self {
        Self { indexer }
    }

    pub fn indexer(&self) -> &IncrementalIndexer {
        &self.indexer
    }

    pub fn into_indexer(self) -> IncrementalIndexer {
        self.indexer
    }

    pub async fn search_code(&self, query: &str, top_k: usize) -> ToolResponse {
        let query = query.trim();
        if query.is_empty() {
            return QueryError::MissingArgument("query").into();
        }
        let results = self.indexer.search(query, top_k).await;
        if results.is_empty() {
            return ToolResponse::text(format!("No results found for '{}'.", query));
        }
        ToolResponse::text(format_units(
            &format!("Search results for '{}'", query),
            results.iter().map(|r| (&r.unit, Some(r.score))),
        ))
    }

    /// Incremental update of the index
    pub async fn reindex(&mut self) -> ToolResponse {
        match self.indexer.update().await {
            Ok(summary) => {
                let stats = self.indexer.stats();
                ToolResponse::text(format!(
                    "Index updated: {}. {} units across {} files.",
                    summary, stats.units, stats.files
                ))
            }
            Err(e) => ToolResponse::error(format!("Error while reindexing: {:#}", e)),
        }
    }

    pub fn search_by_symbol(&self, name: &str, mode: &str) -> ToolResponse {
        if name.is_empty() {
            return QueryError::MissingArgument("name").into();
        }
        let mode = match mode.parse::<SymbolMatchMode>() {
            Ok(mode) => mode,
            Err(e) => return e.into(),
        };

        let matches: Vec<&CodeUnit> = self
            .indexer
            .units()
            .iter()
            .filter(|u| u.name.as_deref().is_some_and(|n| mode.matches(n, name)))
            .collect();
        if matches.is_empty() {
            return ToolResponse::text(format!("No symbols matching '{}' ({}).", name, mode));
        }

        let total = matches.len();
        let mut text = format_units(
            &format!("Symbols matching '{}' ({})", name, mode),
            matches.into_iter().take(MAX_SYMBOL_RESULTS).map(|u| (u, None)),
        );
        if total > MAX_SYMBOL_RESULTS {
            text.push_str(&format!(
                "\n(showing first {} of {} matches)\n",
                MAX_SYMBOL_RESULTS, total
            ));
        }
        ToolResponse::text(text)
    }

    /// `path` is relative to the project root; `None` or empty means the root.
    pub fn get_file_structure(&self, path: Option<&str>, depth: usize) -> ToolResponse {
        let dir = match self.resolve_dir(path.unwrap_or("")) {
            Ok(dir) => dir,
            Err(e) => return e.into(),
        };
        ToolResponse::text(tree::render_tree(&dir, depth, self.indexer.filter()))
    }

    fn resolve_dir(&self, path: &str) -> Result<PathBuf, QueryError> {
        let root = self.indexer.root();
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(QueryError::PathNotFound(path.to_string()));
        }
        let dir = root.join(relative);
        if !dir.exists() {
            return Err(QueryError::PathNotFound(path.to_string()));
        }
        // Symlinks must not lead outside the project either
        let inside = match (dir.canonicalize(), root.canonicalize()) {
            (Ok(dir), Ok(root)) => dir.starts_with(root),
            _ => false,
        };
        if !inside {
            return Err(QueryError::PathNotFound(path.to_string()));
        }
        if !dir.is_dir() {
            return Err(QueryError::NotADirectory(path.to_string()));
        }
        Ok(dir)
    }

    /// Vector-only nearest neighbours of a snippet
    pub async fn get_similar_patterns(&self, code_snippet: &str, top_k: usize) -> ToolResponse {
        if code_snippet.trim().is_empty() {
            return QueryError::MissingArgument("code_snippet").into();
        }
        let embedder = self.indexer.embedder();
        if !embedder.is_available() {
            return unavailable();
        }

        let vector = match embedder.embed_query(code_snippet).await {
            Ok(Some(vector)) => vector,
            Ok(None) => return unavailable(),
            Err(e) => {
                return ToolResponse::error(format!(
                    "Vector search unavailable: embedding failed: {}",
                    e
                ))
            }
        };

        let results = self.indexer.vector_store().search(&vector, top_k);
        if results.is_empty() {
            return ToolResponse::text("No similar patterns found.");
        }
        ToolResponse::text(format_units(
            "Similar patterns",
            results.iter().map(|(unit, score)| (unit, Some(*score))),
        ))
    }

    /// Dispatch a tool call by name with JSON arguments.
    pub async fn call_tool(&mut self, name: &str, args: &Value) -> ToolResponse {
        let default_top_k = self.indexer.default_top_k();
        match name {
            "search_code" => {
                let query = opt_str(args, "query").unwrap_or_default();
                self.search_code(query, opt_count(args, "top_k", default_top_k))
                    .await
            }
            "reindex" => self.reindex().await,
            "search_by_symbol" => {
                let symbol = opt_str(args, "name").unwrap_or_default();
                let mode = opt_str(args, "mode").unwrap_or("contains");
                self.search_by_symbol(symbol, mode)
            }
            "get_file_structure" => self.get_file_structure(
                opt_str(args, "path"),
                opt_count(args, "depth", DEFAULT_TREE_DEPTH),
            ),
            "get_similar_patterns" => {
                let snippet = opt_str(args, "code_snippet").unwrap_or_default();
                self.get_similar_patterns(snippet, opt_count(args, "top_k", default_top_k))
                    .await
            }
            other => ToolResponse::error(format!("Error: unknown tool: {}", other)),
        }
    }
}

fn unavailable() -> ToolResponse {
    ToolResponse::error(
        "Vector search unavailable: embedding provider is not configured or has failed \
         (set VOYAGE_API_KEY to enable)",
    )
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Non-negative integer argument; negative values clamp to 0
fn opt_count(args: &Value, key: &str, default: usize) -> usize {
    match args.get(key) {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(|n| n.max(0) as usize)
            .unwrap_or(default),
        None => default,
    }
}

/// JSON schemas for the five tools
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "search_code",
            "description": "Hybrid lexical and semantic search over indexed code units.",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string" },
                    "top_k": { "type": "number", "default": 5 }
                }
            }
        }),
        json!({
            "name": "reindex",
            "description": "Re-index files changed since the last run.",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),
        json!({
            "name": "search_by_symbol",
            "description": "Find functions, classes and methods by name.",
            "inputSchema": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string" },
                    "mode": {
                        "type": "string",
                        "enum": ["contains", "prefix", "exact"],
                        "default": "contains"
                    }
                }
            }
        }),
        json!({
            "name": "get_file_structure",
            "description": "Directory tree of the project, honoring index exclusions.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "default": "" },
                    "depth": { "type": "number", "default": DEFAULT_TREE_DEPTH }
                }
            }
        }),
        json!({
            "name": "get_similar_patterns",
            "description": "Find code units semantically similar to a snippet.",
            "inputSchema": {
                "type": "object",
                "required": ["code_snippet"],
                "properties": {
                    "code_snippet": { "type": "string" },
                    "top_k": { "type": "number", "default": 5 }
                }
            }
        }),
    ]
}
