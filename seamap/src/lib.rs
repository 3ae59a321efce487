//! # seamap
//!
//! An offline-first tile server for marine navigation. Serves vector and
//! raster tiles from five upstream sources through a three-tier resolver
//! (filesystem cache, offline sector archives, online range-fetch),
//! orchestrates sector downloads via the external `pmtiles` utility, and
//! synthesizes contour, bathymetry and sounding vector tiles from terrain
//! rasters on demand.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod derived;
pub mod downloads;
pub mod resolver;
pub mod server;
pub mod sources;

use anyhow::{Context, Result};
use cache::TileCache;
use config::Config;
use connectivity::ConnectivityMonitor;
use derived::DerivedTiles;
use downloads::DownloadManager;
use resolver::TileResolver;
use seamap_archive::ArchivePool;
use sources::Sources;
use std::sync::Arc;

/// Name of the external archive-extraction utility.
pub const EXTRACT_UTILITY: &str = "pmtiles";

/// The process-wide core: every piece of shared mutable state lives behind
/// this value, each field carrying its own synchronization.
pub struct SeamapCore {
	pub config: Config,
	pub sources: Arc<Sources>,
	pub cache: Arc<TileCache>,
	pub pool: Arc<ArchivePool>,
	pub resolver: Arc<TileResolver>,
	pub downloads: Arc<DownloadManager>,
	pub derived: Arc<DerivedTiles>,
}

impl SeamapCore {
	pub async fn new(config: Config) -> Result<Arc<SeamapCore>> {
		Self::with_utility(config, EXTRACT_UTILITY.to_string()).await
	}

	pub async fn with_utility(config: Config, utility: String) -> Result<Arc<SeamapCore>> {
		for path in [&config.pmtiles_path, &config.tiles_path, &config.derived_path] {
			tokio::fs::create_dir_all(path)
				.await
				.with_context(|| format!("failed to create {path:?}"))?;
		}

		let sources = Arc::new(Sources::default());
		let cache = Arc::new(TileCache::new(&config.tiles_path, &config.derived_path));
		let pool = Arc::new(ArchivePool::default());
		let monitor = ConnectivityMonitor::start(sources.probe_url().unwrap_or_default().to_string());

		let resolver = Arc::new(TileResolver::new(
			Arc::clone(&sources),
			Arc::clone(&cache),
			Arc::clone(&pool),
			monitor,
			config.pmtiles_path.clone(),
			utility.clone(),
		));
		let downloads = Arc::new(DownloadManager::new(
			config.pmtiles_path.clone(),
			Arc::clone(&sources),
			utility,
		));
		let derived = Arc::new(DerivedTiles::new(
			Arc::clone(&resolver),
			Arc::clone(&cache),
			Arc::clone(&sources),
			config.depths.clone(),
		));

		Ok(Arc::new(SeamapCore {
			config,
			sources,
			cache,
			pool,
			resolver,
			downloads,
			derived,
		}))
	}

	/// Releases pooled archive handles.
	pub fn shutdown(&self) {
		self.pool.close_all();
	}
}
