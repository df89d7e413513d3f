//! Directory tree rendering for `get_file_structure`

use std::path::{Path, PathBuf};

use crate::index::FileFilter;

/// Render `dir` as a box-drawing tree, directories first.
///
/// The root is level 0; entries at level `L` are listed when `L <= depth`.
/// Entries hidden from indexing (excluded directories, binary files, ignored
/// paths) are left out.
pub fn render_tree(dir: &Path, depth: usize, filter: &FileFilter) -> String {
    let mut out = format!("{}/\n", display_name(dir));
    if depth > 0 {
        render_children(dir, "", 1, depth, filter, &mut out);
    }
    out.truncate(out.trim_end().len());
    out
}

fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

fn visible_entries(dir: &Path, filter: &FileFilter) -> Vec<(PathBuf, bool)> {
    let reader = match std::fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!(path = %dir.display(), error = %e, "Cannot list directory");
            return Vec::new();
        }
    };

    let mut entries: Vec<(PathBuf, bool)> = reader
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let is_dir = entry.file_type().ok()?.is_dir();
            let path = entry.path();
            (!filter.is_hidden(&path, is_dir)).then_some((path, is_dir))
        })
        .collect();

    entries.sort_by(|(a, a_dir), (b, b_dir)| {
        b_dir
            .cmp(a_dir)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    entries
}

fn render_children(
    dir: &Path,
    prefix: &str,
    level: usize,
    depth: usize,
    filter: &FileFilter,
    out: &mut String,
) {
    let entries = visible_entries(dir, filter);
    let count = entries.len();

    for (i, (path, is_dir)) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let suffix = if is_dir { "/" } else { "" };
        out.push_str(&format!("{prefix}{connector}{}{suffix}\n", display_name(&path)));

        if is_dir && level < depth {
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_children(&path, &child_prefix, level + 1, depth, filter, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexerConfig;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/lib")).unwrap();
        fs::write(root.join("src/main.py"), "x = 1").unwrap();
        fs::write(root.join("src/lib/util.py"), "y = 2").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();
        fs::write(root.join("logo.png"), "png").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        dir
    }

    #[test]
    fn test_full_tree() {
        let dir = fixture();
        let filter = FileFilter::new(dir.path(), &IndexerConfig::default()).unwrap();
        let tree = render_tree(dir.path(), 3, &filter);
        let lines: Vec<&str> = tree.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "├── src/",
                "│   ├── lib/",
                "│   │   └── util.py",
                "│   └── main.py",
                "└── README.md",
            ]
        );
    }

    #[test]
    fn test_depth_limits_traversal() {
        let dir = fixture();
        let filter = FileFilter::new(dir.path(), &IndexerConfig::default()).unwrap();

        let tree = render_tree(dir.path(), 1, &filter);
        let lines: Vec<&str> = tree.lines().skip(1).collect();
        assert_eq!(lines, vec!["├── src/", "└── README.md"]);

        let tree = render_tree(dir.path(), 0, &filter);
        assert_eq!(tree.lines().count(), 1);
        assert!(tree.ends_with('/'));
    }

    #[test]
    fn test_hidden_entries() {
        let dir = fixture();
        let filter = FileFilter::new(dir.path(), &IndexerConfig::default()).unwrap();
        let tree = render_tree(dir.path(), 3, &filter);
        assert!(!tree.contains("node_modules"));
        assert!(!tree.contains("logo.png"));
    }
}
