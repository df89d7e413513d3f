//! File eligibility and directory walking.
//!
//! A file is indexed only if it passes, in order: excluded directory names,
//! binary extensions, the project's `.gitignore`, exclude globs, and finally
//! include globs (or the extension allowlist when no include globs are set).

use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::path_filter::PathFilter;
use crate::config::IndexerConfig;
use crate::utils::{has_binary_extension, relative_path_string};

/// Directory names never descended into
pub const EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    "node_modules",
    ".venv",
    "venv",
    "dist",
    "build",
    ".rag_cache",
    "target",
];

/// Default extension allowlist
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "py", "ts", "js", "tsx", "jsx", "go", "java", "rs", "yaml", "yml", "md",
];

pub struct FileFilter {
    root: PathBuf,
    excluded_dirs: HashSet<String>,
    extensions: HashSet<String>,
    patterns: PathFilter,
    gitignore: Option<Gitignore>,
    max_file_size: u64,
}

impl FileFilter {
    pub fn new(root: &Path, config: &IndexerConfig) -> Result<Self> {
        let mut excluded_dirs: HashSet<String> =
            EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect();
        // The cache directory may be renamed, it is never corpus content
        if let Some(name) = Path::new(&config.cache_dir).file_name() {
            excluded_dirs.insert(name.to_string_lossy().into_owned());
        }

        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let gitignore = if config.respect_gitignore {
            load_gitignore(root)
        } else {
            None
        };

        Ok(Self {
            root: root.to_path_buf(),
            excluded_dirs,
            extensions,
            patterns: PathFilter::new(&config.include_patterns, &config.exclude_patterns)?,
            gitignore,
            max_file_size: config.max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Corpus-relative, `/`-separated form of `path`
    pub fn relative(&self, path: &Path) -> String {
        relative_path_string(&self.root, path)
    }

    /// Directory names skipped during the walk, sorted
    pub fn excluded_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self.excluded_dirs.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    pub fn is_excluded_dir_name(&self, name: &str) -> bool {
        self.excluded_dirs.contains(name)
    }

    /// True if any directory between the root and `path` is excluded
    fn in_excluded_dir(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut components = relative.components().collect::<Vec<_>>();
        components.pop();
        components.iter().any(|c| match c {
            Component::Normal(name) => self.is_excluded_dir_name(&name.to_string_lossy()),
            _ => false,
        })
    }

    fn is_gitignored(&self, path: &Path, is_dir: bool) -> bool {
        let Some(gitignore) = &self.gitignore else {
            return false;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        gitignore
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// Whether the walker should skip a directory entirely
    fn prune_dir(&self, path: &Path) -> bool {
        let excluded_name = path
            .file_name()
            .is_some_and(|n| self.is_excluded_dir_name(&n.to_string_lossy()));
        excluded_name || self.is_gitignored(path, true)
    }

    /// Whether a file qualifies for indexing.
    pub fn is_eligible(&self, path: &Path) -> bool {
        if self.in_excluded_dir(path) {
            return false;
        }
        if has_binary_extension(path) {
            return false;
        }
        if self.is_gitignored(path, false) {
            return false;
        }

        let relative = self.relative(path);
        if self.patterns.is_excluded(&relative) {
            return false;
        }

        let included = if self.patterns.has_include_patterns() {
            self.patterns.is_included(&relative)
        } else {
            path.extension()
                .map(|e| self.extensions.contains(&e.to_string_lossy().to_ascii_lowercase()))
                .unwrap_or(false)
        };
        if !included {
            return false;
        }

        match path.metadata() {
            Ok(meta) => meta.len() <= self.max_file_size,
            Err(_) => false,
        }
    }

    /// Whether a directory listing should hide this entry
    pub fn is_hidden(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            if self.prune_dir(path) {
                return true;
            }
        } else if has_binary_extension(path) || self.is_gitignored(path, false) {
            return true;
        }
        self.patterns.is_excluded(&self.relative(path))
    }

    /// Every eligible file under the root, in file-name order.
    pub fn collect(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_type().is_dir() || !self.prune_dir(entry.path())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_eligible(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    }
}

fn load_gitignore(root: &Path) -> Option<Gitignore> {
    let path = root.join(".gitignore");
    if !path.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(&path) {
        tracing::warn!(path = %path.display(), error = %e, "Problem reading .gitignore");
    }
    match builder.build() {
        Ok(gitignore) => Some(gitignore),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Invalid .gitignore, ignoring it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn collected(filter: &FileFilter) -> Vec<String> {
        filter.collect().iter().map(|p| filter.relative(p)).collect()
    }

    #[test]
    fn test_default_eligibility() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/app.py", "print(1)");
        write(root, "src/lib.rs", "fn main() {}");
        write(root, "README.md", "# readme");
        write(root, "notes.txt", "not in allowlist");
        write(root, "logo.png", "binary");
        write(root, "node_modules/pkg/index.js", "module.exports = 1");
        write(root, "src/__pycache__/app.py", "cached");
        write(root, ".rag_cache/file_index.json", "{}");

        let filter = FileFilter::new(root, &IndexerConfig::default()).unwrap();
        assert_eq!(collected(&filter), vec!["README.md", "src/app.py", "src/lib.rs"]);
    }

    #[test]
    fn test_gitignore_respected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, ".gitignore", "secret/\n*.gen.py\n");
        write(root, "main.py", "x = 1");
        write(root, "schema.gen.py", "y = 2");
        write(root, "secret/keys.py", "k = 3");

        let filter = FileFilter::new(root, &IndexerConfig::default()).unwrap();
        assert_eq!(collected(&filter), vec!["main.py"]);

        let config = IndexerConfig {
            respect_gitignore: false,
            ..IndexerConfig::default()
        };
        let filter = FileFilter::new(root, &config).unwrap();
        assert_eq!(collected(&filter).len(), 3);
    }

    #[test]
    fn test_exclude_before_include() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/a.rs", "fn a() {}");
        write(root, "src/generated/b.rs", "fn b() {}");
        write(root, "scripts/run.sh", "echo hi");

        let config = IndexerConfig {
            include_patterns: vec!["src/**".to_string(), "**/*.sh".to_string()],
            exclude_patterns: vec!["**/generated/**".to_string()],
            ..IndexerConfig::default()
        };
        let filter = FileFilter::new(root, &config).unwrap();
        assert_eq!(collected(&filter), vec!["scripts/run.sh", "src/a.rs"]);
    }

    #[test]
    fn test_binary_extension_beats_include() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "assets/logo.png", "png");
        let config = IndexerConfig {
            include_patterns: vec!["**/*".to_string()],
            ..IndexerConfig::default()
        };
        let filter = FileFilter::new(root, &config).unwrap();
        assert!(collected(&filter).is_empty());
    }

    #[test]
    fn test_max_file_size() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "big.py", &"x = 1\n".repeat(100));
        write(root, "small.py", "x = 1\n");
        let config = IndexerConfig {
            max_file_size: 64,
            ..IndexerConfig::default()
        };
        let filter = FileFilter::new(root, &config).unwrap();
        assert_eq!(collected(&filter), vec!["small.py"]);
    }

    #[test]
    fn test_custom_cache_dir_is_excluded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, ".hcs/notes.md", "cache");
        write(root, "doc.md", "doc");
        let config = IndexerConfig {
            cache_dir: ".hcs".to_string(),
            ..IndexerConfig::default()
        };
        let filter = FileFilter::new(root, &config).unwrap();
        assert_eq!(collected(&filter), vec!["doc.md"]);
    }

    #[test]
    fn test_is_hidden() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let filter = FileFilter::new(root, &IndexerConfig::default()).unwrap();
        assert!(filter.is_hidden(&root.join("node_modules"), true));
        assert!(filter.is_hidden(&root.join("image.jpg"), false));
        assert!(!filter.is_hidden(&root.join("src"), true));
        assert!(!filter.is_hidden(&root.join("notes.txt"), false));
    }
}
