//! Path normalization and segment splitting.
//!
//! Registration and matching both go through these helpers so that a
//! pattern and a request path are compared on identical terms.

use std::borrow::Cow;

/// Marker that starts a parameter segment (`:id`).
pub const PARAM_MARKER: char = ':';

/// A lone wildcard segment (`*`).
pub const WILDCARD: &str = "*";

/// Normalizes a path: ensures a leading `/` and strips one trailing `/`
/// (except for the root path).
///
/// # Example
///
/// ```rust
/// use cyber_router::normalize_path;
///
/// assert_eq!(normalize_path("users/"), "/users");
/// assert_eq!(normalize_path("/"), "/");
/// assert_eq!(normalize_path(""), "/");
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let mut owned = if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    };

    if owned.len() > 1 && owned.ends_with('/') {
        owned.to_mut().pop();
    }

    owned
}

/// Splits a path into its non-empty `/`-delimited segments.
///
/// Empty segments (from `//` or a trailing slash) are skipped, so
/// `/a//b/` yields `["a", "b"]`.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Returns `true` if every segment of `prefix` equals the corresponding
/// leading segment of `path`.
///
/// Comparison is done on whole segments, so `/user` is not a prefix of
/// `/username/5`. The root prefix `/` is a prefix of every path.
///
/// # Example
///
/// ```rust
/// use cyber_router::is_segment_prefix;
///
/// assert!(is_segment_prefix("/api", "/api/users"));
/// assert!(is_segment_prefix("/", "/anything"));
/// assert!(!is_segment_prefix("/user", "/username/5"));
/// ```
#[must_use]
pub fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    let mut path_segments = segments(path);
    segments(prefix).all(|expected| path_segments.next() == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_leading_slash() {
        assert_eq!(normalize_path("users"), "/users");
        assert!(matches!(normalize_path("/users"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_strips_single_trailing_slash() {
        assert_eq!(normalize_path("/users/"), "/users");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_segments_skip_empty() {
        let parts: Vec<_> = segments("/a//b/").collect();
        assert_eq!(parts, vec!["a", "b"]);
        assert_eq!(segments("/").count(), 0);
    }

    #[test]
    fn test_segment_prefix_boundaries() {
        assert!(is_segment_prefix("/user", "/user"));
        assert!(is_segment_prefix("/user", "/user/5"));
        assert!(is_segment_prefix("/user/", "/user/5"));
        assert!(!is_segment_prefix("/user", "/username/5"));
        assert!(!is_segment_prefix("/users/admin", "/users"));
    }
}
