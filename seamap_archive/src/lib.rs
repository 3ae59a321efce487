//! # seamap_archive
//!
//! Random-access reader for cloud-optimized tile archives (PMTiles v3) plus
//! a bounded pool of open local archives.
//!
//! An archive is opened once (header and root directory are fetched and
//! parsed eagerly, leaf directories lazily with a small cache) and then
//! serves individual tiles by byte range, from a local file or an HTTP
//! range source.

mod pool;
mod reader;
#[cfg(any(test, feature = "test"))]
pub mod testing;
mod types;

pub use pool::ArchivePool;
pub use reader::SectorArchive;
pub use types::{ArchiveCompression, ArchiveHeader, ArchiveTileType, Entry};
