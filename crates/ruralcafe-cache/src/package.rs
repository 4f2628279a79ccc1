//! Package codec.
//!
//! Bundles cached files into a single gzip stream with no per-file
//! framing; segment boundaries are declared externally as byte counts and
//! are not recoverable from the stream alone. A package carries an index
//! segment followed by a content segment, and the receiver splits the
//! decompressed bytes at the declared index size.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

/// Package codec errors.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The decompressed stream ended before the declared length.
    #[error("decompressed stream ended after {written} of {expected} bytes")]
    ShortRead { expected: u64, written: u64 },

    /// The declared index size exceeds the decompressed payload.
    #[error("index size {index_size} exceeds payload of {payload_len} bytes")]
    IndexOutOfBounds { index_size: u64, payload_len: u64 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, PackageError>;

/// One compressed transfer between proxies.
#[derive(Debug, Clone)]
pub struct Package {
    /// The gzip stream of index segment then content segment.
    pub payload: Vec<u8>,
    /// Uncompressed byte count of the index segment.
    pub index_size: u64,
    /// Uncompressed byte count of the content segment.
    pub content_size: u64,
}

impl Package {
    /// Assembles a package from cached files.
    ///
    /// The index segment lists each included file as a
    /// `path \t size` line, with paths relative to `root`. Files that
    /// fail to read are logged and left out of both segments; assembly is
    /// not atomic with respect to concurrent cache writes.
    pub fn assemble(root: &Path, files: &[PathBuf]) -> io::Result<Package> {
        let mut index = String::new();
        let mut bodies = Vec::with_capacity(files.len());

        for path in files {
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = ?path, "Skipping unreadable file: {}", e);
                    continue;
                }
            };
            let name = path.strip_prefix(root).unwrap_or(path);
            index.push_str(&format!("{}\t{}\n", name.display(), bytes.len()));
            bodies.push(bytes);
        }

        let content_size = bodies.iter().map(|b| b.len() as u64).sum();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(index.as_bytes())?;
        for body in &bodies {
            encoder.write_all(body)?;
        }

        Ok(Package {
            payload: encoder.finish()?,
            index_size: index.len() as u64,
            content_size,
        })
    }

    /// Splits a decompressed payload into index and content segments at
    /// the declared index size.
    pub fn split(decompressed: &[u8], index_size: u64) -> Result<(Vec<u8>, Vec<u8>)> {
        if index_size > decompressed.len() as u64 {
            return Err(PackageError::IndexOutOfBounds {
                index_size,
                payload_len: decompressed.len() as u64,
            });
        }
        let (index, content) = decompressed.split_at(index_size as usize);
        Ok((index.to_vec(), content.to_vec()))
    }
}

/// Compresses the given files, in order, into one gzip stream.
///
/// There is no per-file framing; callers must track each file's byte count
/// externally to recover boundaries. A file that fails to read is logged
/// and skipped, and compression proceeds with the rest.
pub fn compress(files: &[PathBuf]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for path in files {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = ?path, "Skipping unreadable file: {}", e);
                continue;
            }
        };
        encoder.write_all(&bytes)?;
    }
    encoder.finish()
}

/// Decompresses exactly `expected_len` bytes from a gzip stream into
/// `output`, creating parent directories as needed.
///
/// A stream that runs out before `expected_len` is an error; the partial
/// output file is removed so a failed transfer cannot masquerade as a
/// cached page. Decompressed bytes beyond `expected_len` are left unread.
pub fn decompress(source: impl Read, output: &Path, expected_len: u64) -> Result<u64> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(output)?;

    let mut decoder = GzDecoder::new(source);
    let mut buf = [0u8; 8192];
    let mut written = 0u64;

    while written < expected_len {
        let want = ((expected_len - written).min(buf.len() as u64)) as usize;
        let n = decoder.read(&mut buf[..want])?;
        if n == 0 {
            drop(file);
            let _ = fs::remove_file(output);
            return Err(PackageError::ShortRead {
                expected: expected_len,
                written,
            });
        }
        file.write_all(&buf[..n])?;
        written += n as u64;
    }

    Ok(written)
}
