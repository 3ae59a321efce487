//! Best-effort filesystem tile cache.
//!
//! One file per `(kind, source, z, x, y)` under the tile or derived cache
//! root; the file's mtime is the authoritative timestamp. There is no index
//! and no locking: the request coalescer already prevents duplicate writers,
//! and last-write-wins is acceptable for identical content.

use anyhow::{Context, Result};
use log::debug;
use seamap_core::{Blob, TileCoord};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The cacheable tile kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TileKind {
	Tiles,
	Contours,
	Bathymetry,
	Soundings,
	Composite,
}

impl TileKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TileKind::Tiles => "tiles",
			TileKind::Contours => "contours",
			TileKind::Bathymetry => "bathymetry",
			TileKind::Soundings => "soundings",
			TileKind::Composite => "composite",
		}
	}
}

/// A cache hit: the timestamp is known, the bytes are read on demand.
#[derive(Debug)]
pub struct CachedTile {
	path: PathBuf,
	pub mtime: SystemTime,
}

impl CachedTile {
	pub async fn read(&self) -> Result<Blob> {
		let bytes = tokio::fs::read(&self.path)
			.await
			.with_context(|| format!("failed to read cached tile {:?}", self.path))?;
		Ok(Blob::from(bytes))
	}
}

pub struct TileCache {
	tiles_root: PathBuf,
	derived_root: PathBuf,
}

impl TileCache {
	pub fn new(tiles_root: &Path, derived_root: &Path) -> TileCache {
		TileCache {
			tiles_root: tiles_root.to_path_buf(),
			derived_root: derived_root.to_path_buf(),
		}
	}

	fn path(&self, kind: TileKind, source: &str, coord: &TileCoord) -> PathBuf {
		let root = match kind {
			TileKind::Tiles => &self.tiles_root,
			_ => &self.derived_root,
		};
		root
			.join(kind.as_str())
			.join(source)
			.join(coord.z.to_string())
			.join(coord.x.to_string())
			.join(coord.y.to_string())
	}

	/// Looks up a tile, reading only file metadata.
	pub async fn lookup(&self, kind: TileKind, source: &str, coord: &TileCoord) -> Option<CachedTile> {
		let path = self.path(kind, source, coord);
		match tokio::fs::metadata(&path).await {
			Ok(meta) => {
				let mtime = meta.modified().ok()?;
				Some(CachedTile { path, mtime })
			}
			Err(_) => None,
		}
	}

	/// Writes tile bytes, creating intermediate directories.
	pub async fn put(&self, kind: TileKind, source: &str, coord: &TileCoord, bytes: &Blob) -> Result<()> {
		let path = self.path(kind, source, coord);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.with_context(|| format!("failed to create cache directory {parent:?}"))?;
		}
		tokio::fs::write(&path, bytes.as_slice())
			.await
			.with_context(|| format!("failed to write cached tile {path:?}"))?;
		debug!("cached {} {} {}", kind.as_str(), source, coord);
		Ok(())
	}
}
