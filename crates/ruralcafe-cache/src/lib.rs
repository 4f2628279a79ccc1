//! RuralCafe Cache - filesystem cache manager and package codec.
//!
//! The cache manager owns the on-disk store of fetched pages (bulk
//! enumeration and content-type classification only; naming is external).
//! The package codec bundles cached files into one gzip stream for batch
//! transfer between proxies, with segment sizes declared outside the
//! stream.

pub mod manager;
pub mod package;

pub use manager::CacheManager;
pub use package::{compress, decompress, Package, PackageError};
