//! URI-to-cache-path mapping seam.
//!
//! Canonical cache naming is owned by an external collaborator; the
//! dispatcher only needs a relative path under the cache root for each
//! fetched URI. [`FlatUriMapper`] is the built-in mapping used when no
//! external canonicalizer is wired in.

use std::path::PathBuf;

/// Longest file name the flat mapper emits.
const MAX_NAME_LEN: usize = 200;

/// Maps a fetched URI to a path relative to the cache root.
pub trait UriMapper: Send + Sync {
    fn cache_path(&self, uri: &str) -> PathBuf;
}

/// Flattens a URI into a single sanitized file name.
///
/// The scheme is dropped and every character outside `[A-Za-z0-9._-]`
/// becomes `_`, so the result can never escape the cache root.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatUriMapper;

impl UriMapper for FlatUriMapper {
    fn cache_path(&self, uri: &str) -> PathBuf {
        let stripped = uri
            .strip_prefix("https://")
            .or_else(|| uri.strip_prefix("http://"))
            .unwrap_or(uri);

        let mut name: String = stripped
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        name.truncate(MAX_NAME_LEN);

        if name.is_empty() {
            name.push('_');
        }
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_dropped_and_separators_sanitized() {
        let mapper = FlatUriMapper;
        assert_eq!(
            mapper.cache_path("http://example.org/page?q=1"),
            PathBuf::from("example.org_page_q_1")
        );
        assert_eq!(
            mapper.cache_path("https://example.org/a/b.html"),
            PathBuf::from("example.org_a_b.html")
        );
    }

    #[test]
    fn result_never_escapes_the_root() {
        let mapper = FlatUriMapper;
        let path = mapper.cache_path("http://evil/../../etc/passwd");
        assert_eq!(path.components().count(), 1);
    }

    #[test]
    fn long_uris_are_truncated() {
        let mapper = FlatUriMapper;
        let uri = format!("http://example.org/{}", "a".repeat(500));
        assert!(mapper.cache_path(&uri).as_os_str().len() <= MAX_NAME_LEN);
    }

    #[test]
    fn empty_uri_still_yields_a_name() {
        let mapper = FlatUriMapper;
        assert_eq!(mapper.cache_path(""), PathBuf::from("_"));
    }
}
