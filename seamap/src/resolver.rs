//! Three-tier tile resolution: filesystem cache, offline sector archive,
//! online range-fetch.
//!
//! Identical concurrent requests are coalesced through a shared future per
//! `(source, z, x, y)` key, so at most one underlying fetch is in flight
//! globally for any tile.

use crate::cache::{CachedTile, TileCache, TileKind};
use crate::connectivity::ConnectivityMonitor;
use crate::downloads::utility_available;
use crate::sources::{SourceDef, Sources};
use anyhow::Result;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, warn};
use seamap_archive::{ArchivePool, SectorArchive};
use seamap_core::{Blob, TileCoord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Tiles served from cache or offline archives within this window are
/// considered fresh enough to skip the online tier.
pub const FRESHNESS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Resolved tile bytes plus their authoritative timestamp.
pub type TileReply = (Blob, SystemTime);

type SharedFetch = Shared<BoxFuture<'static, Option<TileReply>>>;

#[derive(Clone, Eq, Hash, PartialEq)]
struct TileKey {
	source: String,
	coord: TileCoord,
}

pub struct TileResolver {
	sources: Arc<Sources>,
	cache: Arc<TileCache>,
	pool: Arc<ArchivePool>,
	monitor: ConnectivityMonitor,
	pmtiles_path: PathBuf,
	utility: String,
	/// In-flight fetches; an entry lives only until its fetch completes.
	pending: DashMap<TileKey, SharedFetch>,
	/// One HTTP-backed archive per source, so the remote header and root
	/// directory are fetched once per process.
	online_archives: DashMap<String, Arc<SectorArchive>>,
}

impl TileResolver {
	pub fn new(
		sources: Arc<Sources>,
		cache: Arc<TileCache>,
		pool: Arc<ArchivePool>,
		monitor: ConnectivityMonitor,
		pmtiles_path: PathBuf,
		utility: String,
	) -> TileResolver {
		TileResolver {
			sources,
			cache,
			pool,
			monitor,
			pmtiles_path,
			utility,
			pending: DashMap::new(),
			online_archives: DashMap::new(),
		}
	}

	/// Resolves a tile, coalescing identical concurrent requests.
	pub async fn get_tile(self: &Arc<Self>, source: &str, coord: &TileCoord) -> Option<TileReply> {
		let key = TileKey {
			source: source.to_string(),
			coord: *coord,
		};

		let (fetch, owner) = match self.pending.entry(key.clone()) {
			dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				let this = Arc::clone(self);
				let source = source.to_string();
				let coord = *coord;
				let fetch: SharedFetch = async move { this.resolve(&source, &coord).await }.boxed().shared();
				entry.insert(fetch.clone());
				(fetch, true)
			}
		};

		let result = fetch.await;
		if owner {
			self.pending.remove(&key);
		}
		result
	}

	/// Timestamp of the newest locally available copy of a tile, without
	/// reading any bodies.
	pub async fn peek_timestamp(&self, source: &str, coord: &TileCoord) -> Option<SystemTime> {
		let source = self.sources.get(source)?;
		let cache_mtime = self
			.cache
			.lookup(TileKind::Tiles, source.name, coord)
			.await
			.map(|hit| hit.mtime);
		let offline_mtime = match self.offline_archive_path(source, coord) {
			Some(path) => file_mtime(&path).await,
			None => None,
		};
		cache_mtime.max(offline_mtime)
	}

	fn offline_archive_path(&self, source: &SourceDef, coord: &TileCoord) -> Option<PathBuf> {
		let sector = coord.sector()?;
		Some(self.pmtiles_path.join(sector.sector_dir_name()).join(source.output))
	}

	async fn resolve(&self, source_name: &str, coord: &TileCoord) -> Option<TileReply> {
		let source = self.sources.get(source_name)?;
		if !source.zoom_in_range(coord.z) {
			return None;
		}

		// the offline tier needs the extraction utility that produced the
		// archives; without it the tier is skipped entirely
		let offline_path = if utility_available(&self.utility) {
			self.offline_archive_path(source, coord)
		} else {
			None
		};

		let cached = self.cache.lookup(TileKind::Tiles, source_name, coord).await;
		let offline_mtime = match &offline_path {
			Some(path) => file_mtime(path).await,
			None => None,
		};

		let newest = cached.as_ref().map(|hit| hit.mtime).max(offline_mtime);
		let fresh = newest.is_some_and(|ts| ts.elapsed().map_or(true, |age| age < FRESHNESS));

		if fresh {
			if let Some(reply) = self.serve_local(source_name, coord, &offline_path, &cached, offline_mtime).await {
				return Some(reply);
			}
		}

		if self.monitor.is_online() && !source.url.is_empty() {
			match self.fetch_online(source, coord).await {
				Ok(Some(blob)) => {
					if let Err(err) = self.cache.put(TileKind::Tiles, source_name, coord, &blob).await {
						warn!("failed to cache {source_name} {coord}: {err:#}");
					}
					return Some((blob, SystemTime::now()));
				}
				Ok(None) => return None,
				Err(err) => warn!("online tier failed for {source_name} {coord}: {err:#}"),
			}
		}

		// degraded: no connectivity (or the fetch failed), serve whatever
		// local copy exists even past the freshness window
		self.serve_local(source_name, coord, &offline_path, &cached, offline_mtime).await
	}

	/// Serves from offline archive or cache, whichever is newer; ties go to
	/// the cache (already decoded, cheaper). Failures fall through.
	async fn serve_local(
		&self,
		source_name: &str,
		coord: &TileCoord,
		offline_path: &Option<PathBuf>,
		cached: &Option<CachedTile>,
		offline_mtime: Option<SystemTime>,
	) -> Option<TileReply> {
		let cache_mtime = cached.as_ref().map(|hit| hit.mtime);

		if offline_mtime > cache_mtime {
			if let Some(path) = offline_path {
				match self.read_offline(path, coord).await {
					Ok(Some(blob)) => return Some((blob, offline_mtime.unwrap())),
					Ok(None) => debug!("offline archive has no tile {source_name} {coord}"),
					Err(err) => warn!("offline tier failed for {source_name} {coord}: {err:#}"),
				}
			}
		}

		if let Some(hit) = cached {
			match hit.read().await {
				Ok(blob) => return Some((blob, hit.mtime)),
				Err(err) => warn!("cache read failed for {source_name} {coord}: {err:#}"),
			}
		}

		None
	}

	async fn read_offline(&self, path: &Path, coord: &TileCoord) -> Result<Option<Blob>> {
		let archive = self.pool.acquire(path).await?;
		archive.get_tile(coord).await
	}

	async fn fetch_online(&self, source: &SourceDef, coord: &TileCoord) -> Result<Option<Blob>> {
		let archive = match self.online_archives.get(source.name) {
			Some(archive) => Arc::clone(&archive),
			None => {
				let archive = Arc::new(SectorArchive::open_url(source.url).await?);
				self.online_archives.insert(source.name.to_string(), Arc::clone(&archive));
				archive
			}
		};
		archive.get_tile(coord).await
	}
}

async fn file_mtime(path: &Path) -> Option<SystemTime> {
	tokio::fs::metadata(path).await.ok().and_then(|meta| meta.modified().ok())
}
