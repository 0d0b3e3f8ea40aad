//! Splits a `/`-separated path into an ordered sequence of components.

use crate::error::{FsError, FsResult};

/// Splits an absolute path into its non-empty components.
///
/// `/a/b/c` yields `["a", "b", "c"]`. A leading slash is mandatory; a bare
/// `""` or any path not starting with `/` is rejected rather than guessed
/// at. Repeated separators (`//a`) and a trailing separator (`/a/`) collapse
/// away since intermediate empty segments are simply dropped.
pub fn split(path: &str) -> FsResult<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::NotFound);
    }
    Ok(path.split('/').filter(|part| !part.is_empty()).collect())
}

/// Splits a path into its parent directory (as an absolute path) and its
/// final component (the base name).
///
/// Works for nested directories; the root `/` itself has no parent and is
/// not a valid input here.
pub fn split_parent(path: &str) -> FsResult<(String, &str)> {
    let parts = split(path)?;
    let (base, parent_parts) = parts.split_last().ok_or(FsError::NotFound)?;
    let mut parent = String::from("/");
    parent.push_str(&parent_parts.join("/"));
    Ok((parent, base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_path() {
        assert_eq!(split("/a/b/c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn collapses_repeated_and_trailing_separators() {
        assert_eq!(split("//a//b/").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn root_splits_to_no_components() {
        assert!(split("/").unwrap().is_empty());
    }

    #[test]
    fn rejects_relative_or_empty_paths() {
        assert!(split("").is_err());
        assert!(split("a/b").is_err());
    }

    #[test]
    fn splits_parent_and_base() {
        let (parent, base) = split_parent("/a/b/c").unwrap();
        assert_eq!(parent, "/a/b");
        assert_eq!(base, "c");
    }

    #[test]
    fn splits_parent_at_root() {
        let (parent, base) = split_parent("/hello").unwrap();
        assert_eq!(parent, "/");
        assert_eq!(base, "hello");
    }
}
