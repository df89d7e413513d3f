//! Path filtering using glob patterns for include/exclude file matching.
//!
//! Patterns are matched against corpus-relative, `/`-separated paths.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Filters files by path patterns using glob matching.
///
/// The two pattern sets are checked separately because eligibility applies
/// them at different points: excludes before the include test, and an empty
/// include set defers to the extension allowlist.
#[derive(Debug, Default)]
pub struct PathFilter {
    /// Include patterns - file must match at least one (if non-empty)
    include: Option<GlobSet>,
    /// Exclude patterns - file must not match any
    exclude: Option<GlobSet>,
}

fn build_set(patterns: &[String], kind: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("Invalid {} glob pattern: {}", kind, pattern))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .with_context(|| format!("Failed to build {} GlobSet", kind))?;
    Ok(Some(set))
}

impl PathFilter {
    /// Create a new path filter from include and exclude patterns.
    ///
    /// Patterns should be glob patterns like:
    /// - `src/**/*.rs` - All Rust files under src/
    /// - `**/test/**` - Any path containing test/
    /// - `*.{js,ts}` - Files with .js or .ts extension
    pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include_patterns, "include")?,
            exclude: build_set(exclude_patterns, "exclude")?,
        })
    }

    pub fn has_include_patterns(&self) -> bool {
        self.include.is_some()
    }

    /// True when the path matches an include pattern, or none are configured.
    pub fn is_included(&self, path: &str) -> bool {
        match &self.include {
            Some(set) => set.is_match(path),
            None => true,
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        match &self.exclude {
            Some(set) => set.is_match(path),
            None => false,
        }
    }

    /// Included and not excluded
    pub fn matches(&self, path: &str) -> bool {
        self.is_included(path) && !self.is_excluded(path)
    }

    /// Check if this filter has any patterns (include or exclude).
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(filter.is_empty());
        assert!(!filter.has_include_patterns());
        assert!(filter.matches("any/path/file.rs"));
        assert!(!filter.is_excluded("test/something.py"));
    }

    #[test]
    fn test_include_only() {
        let filter = PathFilter::new(&["src/**/*.rs".to_string()], &[]).unwrap();
        assert!(filter.has_include_patterns());
        assert!(filter.matches("src/main.rs"));
        assert!(filter.matches("src/lib/utils.rs"));
        assert!(!filter.matches("test/main.rs"));
        assert!(!filter.matches("src/main.py"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = PathFilter::new(&[], &["**/generated/**".to_string()]).unwrap();
        assert!(filter.matches("src/main.rs"));
        assert!(filter.is_excluded("src/generated/schema.py"));
        assert!(filter.is_excluded("generated/anything.rs"));
    }

    #[test]
    fn test_include_and_exclude() {
        let filter =
            PathFilter::new(&["src/**/*.rs".to_string()], &["**/test/**".to_string()]).unwrap();
        assert!(filter.matches("src/main.rs"));
        assert!(!filter.matches("src/test/main.rs"));
        assert!(!filter.matches("lib/main.rs"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = PathFilter::new(&["src/[".to_string()], &[]).unwrap_err();
        assert!(err.to_string().contains("Invalid include glob pattern"));
    }
}
