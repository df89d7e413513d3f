//! Utility functions shared across modules

use std::path::Path;

/// Binary file extensions to skip during indexing.
/// These are common binary formats that don't contain searchable text.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "o", "a", "lib", // Executables and libraries
    "png", "jpg", "jpeg", "gif", "ico", "bmp", "webp", "svg", // Images
    "zip", "tar", "gz", "7z", "rar", "xz", "bz2", "whl", // Archives
    "woff", "woff2", "ttf", "eot", "otf", // Fonts
    "pdf", "doc", "docx", "xls", "xlsx", // Documents
    "mp3", "mp4", "wav", "avi", "mkv", "mov", // Media
    "pyc", "pyo", "class", // Compiled bytecode
    "db", "sqlite", "pkl", // Data stores and serialized objects
];

/// Check if a file should be skipped based on its extension.
pub fn has_binary_extension(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        BINARY_EXTENSIONS.contains(&ext.as_str())
    } else {
        false
    }
}

/// Check if content appears to be binary (contains null bytes or high ratio of non-printable chars).
///
/// Only the first 8KB are inspected.
pub fn is_binary_content(content: &str) -> bool {
    let mut check_len = content.len().min(8192);
    while !content.is_char_boundary(check_len) {
        check_len -= 1;
    }
    let sample = &content[..check_len];

    let mut non_text_count = 0;
    for byte in sample.bytes() {
        if byte == 0 {
            return true;
        }
        if byte < 32 && !matches!(byte, b'\t' | b'\n' | b'\r') {
            non_text_count += 1;
        }
    }

    non_text_count > check_len / 10
}

/// Format a number with underscore separators for readability (e.g., 89210 -> "89_210")
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('_');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Render `path` relative to `root` with forward slashes.
///
/// Corpus paths are stored in this form so that cache files written on one
/// platform stay comparable on another. Paths outside `root` are returned as-is.
///
/// ```
/// use hybrid_code_search::utils::relative_path_string;
/// use std::path::Path;
///
/// assert_eq!(
///     relative_path_string(Path::new("/work/repo"), Path::new("/work/repo/src/app.py")),
///     "src/app.py"
/// );
/// ```
pub fn relative_path_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}
