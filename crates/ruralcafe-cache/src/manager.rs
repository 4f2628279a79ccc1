//! Filesystem cache manager.
//!
//! Owns the cache root and bulk enumeration over it. Fetch workers write
//! page files into the root through an externally provided URI-to-path
//! mapping; this type never names files itself.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// How many leading bytes are sniffed for content-type classification.
const SNIFF_LEN: usize = 512;

/// Filesystem-backed store of fetched pages.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    /// Creates a manager over the given cache root. The root is not
    /// touched until [`initialize`](Self::initialize).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the cache root if missing. Idempotent; returns `false` on
    /// any filesystem failure instead of raising.
    pub fn initialize(&self) -> bool {
        match fs::create_dir_all(&self.root) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(root = ?self.root, "Failed to create cache root: {}", e);
                false
            }
        }
    }

    /// Returns the number of files under the root, recursively.
    pub fn count(&self) -> usize {
        self.all_files().len()
    }

    /// Returns a flat recursive listing of every file under the root.
    /// Unreadable subtrees are skipped with a warning.
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files);
        files
    }

    /// Returns the subset of [`all_files`](Self::all_files) whose sniffed
    /// content type is `text/html`.
    pub fn text_files(&self) -> Vec<PathBuf> {
        self.all_files()
            .into_iter()
            .filter(|path| sniffs_as_html(path))
            .collect()
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = ?dir, "Skipping unreadable cache subtree: {}", e);
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}

/// Sniffs the leading bytes of a file for an HTML document prefix.
fn sniffs_as_html(path: &Path) -> bool {
    let mut head = [0u8; SNIFF_LEN];
    let n = match fs::File::open(path).and_then(|mut file| file.read(&mut head)) {
        Ok(n) => n,
        Err(_) => return false,
    };

    let text = String::from_utf8_lossy(&head[..n]).to_ascii_lowercase();
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    #[test]
    fn initialize_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path().join("cache"));

        assert!(cache.initialize());
        assert!(cache.root().is_dir());
        // Idempotent.
        assert!(cache.initialize());
    }

    #[test]
    fn initialize_on_unwritable_path_returns_false() {
        let dir = TempDir::new().unwrap();
        // A regular file where a directory component should be.
        let blocker = write_file(dir.path(), "blocker", b"x");
        let cache = CacheManager::new(blocker.join("cache"));

        assert!(!cache.initialize());
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn count_and_listing_are_recursive() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());
        write_file(dir.path(), "a.html", b"<html></html>");
        write_file(dir.path(), "sub/b.css", b"body {}");
        write_file(dir.path(), "sub/deep/c.js", b"var x;");

        assert_eq!(cache.count(), 3);
        assert_eq!(cache.all_files().len(), 3);
    }

    #[test]
    fn text_files_keeps_only_html() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path());
        write_file(dir.path(), "page.html", b"<html><body>hi</body></html>");
        write_file(dir.path(), "upper.html", b"  <!DOCTYPE HTML><html></html>");
        write_file(dir.path(), "style.css", b"body { color: red }");
        write_file(dir.path(), "image.bin", &[0xff, 0xd8, 0xff, 0xe0]);

        let mut text: Vec<_> = cache
            .text_files()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        text.sort();
        assert_eq!(text, vec!["page.html", "upper.html"]);
    }

    #[test]
    fn empty_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::new(dir.path().join("missing"));
        assert_eq!(cache.count(), 0);
        assert!(cache.all_files().is_empty());
    }
}
