//! A bounded pool of open local archives.

use crate::SectorArchive;
use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of archives kept open at once.
pub const DEFAULT_POOL_SIZE: usize = 50;

/// LRU cache of open [`SectorArchive`]s, keyed by path.
///
/// `acquire` promotes a present entry to most-recently-used; opening a new
/// archive past the bound evicts the least-recently-used one. Dropping the
/// evicted `Arc`'s last clone closes the underlying file descriptor, so an
/// archive still in use by an in-flight request stays readable until that
/// request finishes.
pub struct ArchivePool {
	pool: Mutex<LruCache<PathBuf, Arc<SectorArchive>>>,
}

impl ArchivePool {
	pub fn new(max_size: usize) -> ArchivePool {
		ArchivePool {
			pool: Mutex::new(LruCache::new(NonZeroUsize::new(max_size).expect("pool size must be > 0"))),
		}
	}

	/// Returns the open archive for `path`, opening it if necessary.
	pub async fn acquire(&self, path: &Path) -> Result<Arc<SectorArchive>> {
		if let Some(archive) = self.pool.lock().get(path) {
			return Ok(Arc::clone(archive));
		}

		// Opened without holding the lock; if another task raced us here the
		// later insert simply replaces the earlier one.
		let archive = Arc::new(SectorArchive::open_path(path).await?);
		self.pool.lock().put(path.to_path_buf(), Arc::clone(&archive));
		Ok(archive)
	}

	/// Drops all pooled archives.
	pub fn close_all(&self) {
		self.pool.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.pool.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for ArchivePool {
	fn default() -> Self {
		Self::new(DEFAULT_POOL_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MockArchiveBuilder;
	use seamap_core::TileCoord;

	fn write_fixture(dir: &Path, name: &str) -> PathBuf {
		let path = dir.join(name);
		let mut builder = MockArchiveBuilder::new(0, 6);
		builder.add_tile(TileCoord::new(1, 0, 0).unwrap(), name.as_bytes());
		builder.write_to(&path).unwrap();
		path
	}

	#[tokio::test]
	async fn acquire_opens_once_and_promotes() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = write_fixture(dir.path(), "a.pmtiles");

		let pool = ArchivePool::new(3);
		let first = pool.acquire(&path).await?;
		let second = pool.acquire(&path).await?;
		assert!(Arc::ptr_eq(&first, &second), "same handle is reused");
		assert_eq!(pool.len(), 1);
		Ok(())
	}

	#[tokio::test]
	async fn bound_is_never_exceeded() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let pool = ArchivePool::new(3);

		let paths: Vec<PathBuf> = (0..5)
			.map(|i| write_fixture(dir.path(), &format!("{i}.pmtiles")))
			.collect();
		for path in &paths {
			pool.acquire(path).await?;
			assert!(pool.len() <= 3);
		}
		assert_eq!(pool.len(), 3);

		// the three most recent paths are retained, the two oldest are gone
		let retained: Vec<bool> = {
			let mut guard = pool.pool.lock();
			paths.iter().map(|p| guard.contains(p)).collect()
		};
		assert_eq!(retained, vec![false, false, true, true, true]);
		Ok(())
	}

	#[tokio::test]
	async fn touch_on_access_changes_eviction_order() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let pool = ArchivePool::new(2);

		let a = write_fixture(dir.path(), "a.pmtiles");
		let b = write_fixture(dir.path(), "b.pmtiles");
		let c = write_fixture(dir.path(), "c.pmtiles");

		pool.acquire(&a).await?;
		pool.acquire(&b).await?;
		pool.acquire(&a).await?; // touch a, so b is now least-recent
		pool.acquire(&c).await?; // evicts b

		let mut guard = pool.pool.lock();
		assert!(guard.contains(&a));
		assert!(!guard.contains(&b));
		assert!(guard.contains(&c));
		Ok(())
	}

	#[tokio::test]
	async fn evicted_archive_stays_usable_while_held() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let pool = ArchivePool::new(1);

		let a = write_fixture(dir.path(), "a.pmtiles");
		let b = write_fixture(dir.path(), "b.pmtiles");

		let held = pool.acquire(&a).await?;
		pool.acquire(&b).await?; // evicts a from the pool

		// the held handle still reads fine
		let tile = held.get_tile(&TileCoord::new(1, 0, 0)?).await?;
		assert_eq!(tile.unwrap().as_slice(), b"a.pmtiles");
		Ok(())
	}

	#[tokio::test]
	async fn close_all_drains_the_pool() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let pool = ArchivePool::default();
		let path = write_fixture(dir.path(), "a.pmtiles");
		pool.acquire(&path).await?;
		pool.close_all();
		assert!(pool.is_empty());
		Ok(())
	}
}
