//! Path identity keys for grouping project records.
//!
//! Two project rows are the same project when their paths normalize to the
//! same [`PathIdentity`]. Normalization is purely lexical: it never touches
//! the filesystem, so it works for paths that no longer exist.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical grouping key derived from a filesystem path string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIdentity(String);

impl PathIdentity {
    /// Key produced for empty or whitespace-only input.
    pub const EMPTY_KEY: &'static str = "<empty>";

    /// Normalize a raw path into its identity key.
    ///
    /// - surrounding whitespace is trimmed
    /// - `\` separators become `/`, repeated separators collapse
    /// - `.` segments are dropped; `..` segments are kept as written
    /// - trailing separators are stripped (the root stays `/`)
    /// - the result is lowercased
    ///
    /// A leading `//` (UNC share) is preserved.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self(Self::EMPTY_KEY.to_string());
        }

        let unified = trimmed.replace('\\', "/");
        let prefix = if unified.starts_with("//") && !unified.starts_with("///") {
            "//"
        } else if unified.starts_with('/') {
            "/"
        } else {
            ""
        };

        let segments: Vec<&str> = unified
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "."))
            .collect();

        let mut key = String::with_capacity(unified.len());
        key.push_str(prefix);
        key.push_str(&segments.join("/"));
        if key.is_empty() {
            key.push('.');
        }

        Self(key.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this key came from empty or whitespace-only input.
    pub fn is_empty_key(&self) -> bool {
        self.0 == Self::EMPTY_KEY
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final non-empty segment of a raw path, case preserved.
pub fn folder_name(raw: &str) -> Option<&str> {
    raw.trim()
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> String {
        PathIdentity::normalize(raw).as_str().to_string()
    }

    #[test]
    fn test_trailing_separator_is_ignored() {
        assert_eq!(key("/home/dev/myproj/"), key("/home/dev/myproj"));
        assert_eq!(key("/home/dev/myproj///"), "/home/dev/myproj");
    }

    #[test]
    fn test_case_is_folded() {
        assert_eq!(key("/Users/Dev/MyProj"), key("/users/dev/myproj"));
    }

    #[test]
    fn test_windows_separators_match_forward_slashes() {
        assert_eq!(key("C:\\Code\\MyProj\\"), "c:/code/myproj");
        assert_eq!(key("C:\\Code\\MyProj"), key("c:/code/myproj"));
    }

    #[test]
    fn test_dot_segments_are_dropped() {
        assert_eq!(key("/a/./b//c"), "/a/b/c");
        assert_eq!(key("./a/"), "a");
    }

    #[test]
    fn test_parent_segments_are_not_collapsed() {
        assert_eq!(key("/a/link/.."), "/a/link/..");
        assert_ne!(key("/a/link/.."), key("/a"));
        assert_eq!(key("../a/b"), "../a/b");
    }

    #[test]
    fn test_root_and_unc_prefixes_survive() {
        assert_eq!(key("/"), "/");
        assert_eq!(key("///"), "/");
        assert_eq!(key("\\\\server\\share\\proj"), "//server/share/proj");
    }

    #[test]
    fn test_empty_input_gets_reserved_key() {
        let empty = PathIdentity::normalize("");
        let blank = PathIdentity::normalize("   \t");
        assert!(empty.is_empty_key());
        assert_eq!(empty, blank);
        assert_ne!(empty, PathIdentity::normalize("/"));
        assert_ne!(empty, PathIdentity::normalize("."));
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        assert_eq!(key("  /srv/app  "), "/srv/app");
    }

    #[test]
    fn test_folder_name_preserves_case() {
        assert_eq!(folder_name("/x/MyProj/"), Some("MyProj"));
        assert_eq!(folder_name("C:\\code\\Tool"), Some("Tool"));
        assert_eq!(folder_name("/"), None);
        assert_eq!(folder_name(""), None);
    }
}
