//! Derived-tile generation: contours, bathymetry, soundings and the
//! composite tile.
//!
//! Each endpoint shares the resolver's cache through the filesystem tile
//! cache and regenerates only when the cached derived tile is older than
//! the underlying terrain data.

use crate::cache::{TileCache, TileKind};
use crate::resolver::{TileReply, TileResolver};
use crate::sources::{SourceDef, Sources};
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use log::{debug, warn};
use seamap_core::{Blob, TileCoord};
use seamap_geometry::{TileGeometry, TileValue, VectorTile, VectorTileLayer};
use seamap_terrain::{
	clip_lines_to_extent, contour_interval, decode_height_tile, isobands, isolines, soundings, DemView, HeightGrid,
	HeightTile, Neighborhood, SubsampledView,
};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

pub const EXTENT: u32 = 4096;

/// Zoom offset of the DEM source tiles: all nine neighbors come from the
/// parent zoom and are split to the quadrant of interest.
const OVERZOOM: u8 = 1;

/// Derived tiles are not generated beyond this zoom.
const MAX_DERIVED_ZOOM: u8 = 14;

/// Composed DEM tiles narrower than this are upsampled before contouring.
const MIN_DEM_WIDTH: u32 = 100;

struct DemGrids {
	/// Pixel-centered samples, for point sampling.
	pixels: HeightGrid,
	/// Corner-aligned samples, for isolines and isobands.
	corners: HeightGrid,
}

pub struct DerivedTiles {
	resolver: Arc<TileResolver>,
	cache: Arc<TileCache>,
	sources: Arc<Sources>,
	/// Bathymetry levels in metres, positive, ascending.
	depth_levels: Vec<f64>,
}

impl DerivedTiles {
	pub fn new(
		resolver: Arc<TileResolver>,
		cache: Arc<TileCache>,
		sources: Arc<Sources>,
		depth_levels: Vec<f64>,
	) -> DerivedTiles {
		DerivedTiles {
			resolver,
			cache,
			sources,
			depth_levels,
		}
	}

	/// Returns a derived tile, regenerating it when the cached copy is
	/// missing or older than the underlying source data. Empty geometry
	/// yields `None`.
	pub async fn get_tile(&self, kind: TileKind, source_name: &str, coord: &TileCoord) -> Result<Option<TileReply>> {
		if kind == TileKind::Composite {
			return self.get_composite(source_name, coord).await;
		}

		let Some(source) = self.sources.get(source_name) else {
			return Ok(None);
		};
		if source.encoding.is_none() {
			debug!("derived tiles need a terrain source, '{source_name}' is not one");
			return Ok(None);
		}
		let minzoom = source.minzoom + u8::from(OVERZOOM == 1);
		if coord.z < minzoom || coord.z > MAX_DERIVED_ZOOM {
			return Ok(None);
		}

		let Some(dem_zoom) = self.dem_zoom(source, coord) else {
			return Ok(None);
		};

		// freshness gate: compare against the underlying terrain tile
		let cached = self.cache.lookup(kind, source_name, coord).await;
		let source_ts = self.resolver.peek_timestamp(source_name, &coord.at_zoom(dem_zoom)).await;
		if let Some(hit) = &cached {
			let stale = source_ts.is_some_and(|ts| hit.mtime < ts);
			if !stale {
				return Ok(Some((hit.read().await?, hit.mtime)));
			}
		}

		let Some(grids) = self.load_dem(source, coord, dem_zoom).await? else {
			return Ok(None);
		};

		let tile = match kind {
			TileKind::Contours => self.contours_tile(&grids, coord)?,
			TileKind::Bathymetry => self.bathymetry_tile(&grids)?,
			TileKind::Soundings => self.soundings_tile(&grids, coord)?,
			TileKind::Tiles | TileKind::Composite => bail!("not a derived kind: {kind:?}"),
		};

		if tile.is_empty() {
			return Ok(None);
		}
		let blob = tile.to_blob()?;
		if let Err(err) = self.cache.put(kind, source_name, coord, &blob).await {
			warn!("failed to cache derived {} {source_name} {coord}: {err:#}", kind.as_str());
		}
		Ok(Some((blob, SystemTime::now())))
	}

	/// Source zoom the DEM neighborhood is fetched at, or `None` when the
	/// source cannot cover this tile at all.
	fn dem_zoom(&self, source: &SourceDef, coord: &TileCoord) -> Option<u8> {
		let dem_zoom = (coord.z - OVERZOOM).min(source.maxzoom);
		(dem_zoom >= source.minzoom).then_some(dem_zoom)
	}

	/// Loads and composes the 3×3 DEM neighborhood, with per-generation
	/// deduplication of the underlying tile fetches, then resamples per the
	/// standard chain.
	async fn load_dem(&self, source: &SourceDef, coord: &TileCoord, dem_zoom: u8) -> Result<Option<DemGrids>> {
		let encoding = source.encoding.expect("checked by caller");
		let factor = 1u32 << (coord.z - dem_zoom);

		let mut fetched: HashMap<TileCoord, Option<HeightTile>> = HashMap::new();
		let mut tiles: Vec<Option<HeightTile>> = Vec::with_capacity(9);

		for dy in -1..=1 {
			for dx in -1..=1 {
				// off-sphere in y: the neighborhood fills in a zero tile
				let Some(neighbor) = coord.neighbor(dx, dy) else {
					tiles.push(None);
					continue;
				};
				let parent = neighbor.at_zoom(dem_zoom);

				if !fetched.contains_key(&parent) {
					let tile = match self.resolver.get_tile(source.name, &parent).await {
						Some((blob, _)) => match decode_height_tile(&blob, encoding) {
							Ok(tile) => Some(tile),
							Err(err) => {
								warn!("failed to decode {} {parent}: {err:#}", source.name);
								None
							}
						},
						None => None,
					};
					fetched.insert(parent, tile);
				}

				let quadrant = fetched[&parent]
					.as_ref()
					.and_then(|tile| tile.split(factor, neighbor.x % factor, neighbor.y % factor).ok());
				tiles.push(quadrant);
			}
		}

		let Some(neighborhood) = Neighborhood::new(tiles)? else {
			return Ok(None);
		};

		let mut view: Box<dyn DemView> = Box::new(neighborhood);
		while view.core_width() < MIN_DEM_WIDTH {
			view = Box::new(SubsampledView::new(view, 2));
		}
		let pixels = HeightGrid::from_view(view.as_ref(), 2);
		let corners = pixels.average_to_corners();
		Ok(Some(DemGrids { pixels, corners }))
	}

	fn contours_tile(&self, grids: &DemGrids, coord: &TileCoord) -> Result<VectorTile> {
		let mut layer = VectorTileLayer::new_standard("contours");

		if let Some((min, max)) = grids.corners.value_range() {
			let interval = contour_interval(coord.z);
			let mut levels = Vec::new();
			let mut level = (f64::from(min) / interval).ceil() * interval;
			while level <= f64::from(max) {
				levels.push(level);
				level += interval;
			}

			for (level, lines) in isolines(&grids.corners, &levels) {
				let lines = self.to_extent_lines(&grids.corners, lines);
				let clipped = clip_lines_to_extent(lines, EXTENT);
				if clipped.is_empty() {
					continue;
				}
				let index = (level / interval).round() as i64 % 5 == 0;
				layer.add_feature(
					&TileGeometry::MultiLineString(clipped),
					&[("ele", TileValue::Int(level as i64)), ("idx", TileValue::Bool(index))],
				)?;
			}
		}

		Ok(VectorTile::new(vec![layer]))
	}

	fn bathymetry_tile(&self, grids: &DemGrids) -> Result<VectorTile> {
		let mut areas = VectorTileLayer::new_standard("depth_areas");
		let mut labels = VectorTileLayer::new_standard("depth_contours");

		// configured depths are positive; bands live below the datum
		let mut levels: Vec<f64> = self.depth_levels.iter().map(|depth| -depth).collect();
		levels.sort_by(f64::total_cmp);

		for band in isobands(&grids.corners, &levels) {
			let min_depth = band.upper.abs();
			let max_depth = band.lower.abs();

			for polygon in &band.polygons {
				let rings: Vec<Vec<[f64; 2]>> = polygon
					.iter()
					.map(|ring| ring.iter().map(|p| grids.corners.corner_to_extent(p[0], p[1], EXTENT)).collect())
					.collect();
				areas.add_feature(
					&TileGeometry::MultiPolygon(rings),
					&[
						("minDepth", TileValue::Double(min_depth)),
						("maxDepth", TileValue::Double(max_depth)),
					],
				)?;
			}

			let lines = self.to_extent_lines(&grids.corners, band.label_lines.clone());
			let clipped = clip_lines_to_extent(lines, EXTENT);
			if !clipped.is_empty() {
				labels.add_feature(
					&TileGeometry::MultiLineString(clipped),
					&[("depth", TileValue::Double(max_depth))],
				)?;
			}
		}

		Ok(VectorTile::new(vec![areas, labels]))
	}

	fn soundings_tile(&self, grids: &DemGrids, coord: &TileCoord) -> Result<VectorTile> {
		let mut layer = VectorTileLayer::new_standard("soundings");
		// shallow-first order so labels draw shallow depths on top
		for sounding in soundings(&grids.pixels, coord, EXTENT) {
			layer.add_feature(
				&TileGeometry::MultiPoint(vec![[sounding.x, sounding.y]]),
				&[("depth", TileValue::Double(sounding.depth))],
			)?;
		}
		Ok(VectorTile::new(vec![layer]))
	}

	fn to_extent_lines(&self, grid: &HeightGrid, lines: Vec<Vec<[f64; 2]>>) -> Vec<Vec<[f64; 2]>> {
		lines
			.into_iter()
			.map(|line| line.into_iter().map(|p| grid.corner_to_extent(p[0], p[1], EXTENT)).collect())
			.collect()
	}

	/// The composite tile merges the basemap, the nautical overlay and the
	/// three derived products into a single vector tile.
	async fn get_composite(&self, source_name: &str, coord: &TileCoord) -> Result<Option<TileReply>> {
		if coord.z < 1 || coord.z > MAX_DERIVED_ZOOM {
			return Ok(None);
		}

		let basemap = self.sources.basemap();
		let overlay = self.sources.overlay();
		let terrain = self.sources.terrain();
		let bathymetry = self.sources.bathymetry();

		// regenerate when any contributor is newer than the cached composite
		let cached = self.cache.lookup(TileKind::Composite, source_name, coord).await;
		if let Some(hit) = &cached {
			let mut newest: Option<SystemTime> = None;
			for (name, probe) in [
				(basemap.name, *coord),
				(overlay.name, *coord),
				(terrain.name, coord.at_zoom(coord.z - 1)),
				(bathymetry.name, coord.at_zoom(coord.z - 1)),
			] {
				newest = newest.max(self.resolver.peek_timestamp(name, &probe).await);
			}
			let stale = newest.is_some_and(|ts| hit.mtime < ts);
			if !stale {
				return Ok(Some((hit.read().await?, hit.mtime)));
			}
		}

		let mut layers: Vec<VectorTileLayer> = Vec::new();

		for source in [basemap, overlay] {
			if let Some((blob, _)) = self.resolver.get_tile(source.name, coord).await {
				match decode_vector_tile(&blob) {
					Ok(tile) => layers.extend(tile.layers),
					Err(err) => warn!("failed to decode {} {coord} for composite: {err:#}", source.name),
				}
			}
		}
		for (kind, source) in [
			(TileKind::Contours, terrain),
			(TileKind::Bathymetry, bathymetry),
			(TileKind::Soundings, bathymetry),
		] {
			match Box::pin(self.get_tile(kind, source.name, coord)).await {
				Ok(Some((blob, _))) => match decode_vector_tile(&blob) {
					Ok(tile) => layers.extend(tile.layers),
					Err(err) => warn!("failed to decode derived {} for composite: {err:#}", kind.as_str()),
				},
				Ok(None) => {}
				Err(err) => warn!("derived {} failed for composite {coord}: {err:#}", kind.as_str()),
			}
		}

		let tile = VectorTile::new(layers);
		if tile.is_empty() {
			return Ok(None);
		}
		let blob = tile.to_blob()?;
		if let Err(err) = self.cache.put(TileKind::Composite, source_name, coord, &blob).await {
			warn!("failed to cache composite {coord}: {err:#}");
		}
		Ok(Some((blob, SystemTime::now())))
	}
}

/// Parses a vector tile, transparently inflating gzip-compressed payloads
/// (tiles stored in archives usually are).
pub fn decode_vector_tile(blob: &Blob) -> Result<VectorTile> {
	if blob.as_slice().starts_with(&[0x1f, 0x8b]) {
		let mut decoder = GzDecoder::new(blob.as_slice());
		let mut bytes = Vec::new();
		decoder.read_to_end(&mut bytes).context("failed to inflate vector tile")?;
		return VectorTile::from_blob(&Blob::from(bytes));
	}
	VectorTile::from_blob(blob)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cache::TileCache;
	use crate::connectivity::ConnectivityMonitor;
	use seamap_archive::testing::MockArchiveBuilder;
	use seamap_archive::ArchivePool;
	use seamap_core::TileFormat;
	use seamap_terrain::TerrainEncoding;
	use std::path::{Path, PathBuf};

	struct Fixture {
		_dir: tempfile::TempDir,
		derived: DerivedTiles,
		pmtiles_path: PathBuf,
	}

	fn fixture() -> Fixture {
		let dir = tempfile::tempdir().unwrap();
		let pmtiles_path = dir.path().join("pmtiles");
		std::fs::create_dir_all(&pmtiles_path).unwrap();
		let sources = Arc::new(Sources::default());
		let cache = Arc::new(TileCache::new(&dir.path().join("tiles"), &dir.path().join("derived")));
		let resolver = Arc::new(TileResolver::new(
			Arc::clone(&sources),
			Arc::clone(&cache),
			Arc::new(ArchivePool::default()),
			ConnectivityMonitor::fixed(false),
			pmtiles_path.clone(),
			"sh".to_string(),
		));
		let derived = DerivedTiles::new(resolver, cache, sources, vec![2.0, 5.0, 10.0, 20.0, 50.0]);
		Fixture {
			_dir: dir,
			derived,
			pmtiles_path,
		}
	}

	/// Encodes a 256x256 terrarium PNG where every pixel has elevation
	/// `f(x, y)` metres.
	fn terrarium_png(f: impl Fn(u32, u32) -> f64) -> Vec<u8> {
		let mut raw = Vec::with_capacity(256 * 256 * 3);
		for y in 0..256u32 {
			for x in 0..256u32 {
				let value = f(x, y) + 32768.0;
				let r = (value / 256.0).floor();
				let g = (value - r * 256.0).floor();
				let b = ((value - value.floor()) * 256.0).floor();
				raw.extend_from_slice(&[r as u8, g as u8, b as u8]);
			}
		}
		let image = image::RgbImage::from_vec(256, 256, raw).unwrap();
		let mut bytes = std::io::Cursor::new(Vec::new());
		image::DynamicImage::ImageRgb8(image)
			.write_to(&mut bytes, image::ImageFormat::Png)
			.unwrap();
		bytes.into_inner()
	}

	/// Writes one gebco sector archive holding every zoom-7 parent tile the
	/// 3×3 neighborhood of `coord` (zoom 8) can ask for, all encoding a
	/// constant depth.
	fn write_dem_sectors(pmtiles_path: &Path, coord: &TileCoord, depth: f64) {
		let png = terrarium_png(|_, _| -depth);
		let mut by_sector: HashMap<String, Vec<TileCoord>> = HashMap::new();
		for dy in -1..=1 {
			for dx in -1..=1 {
				if let Some(neighbor) = coord.neighbor(dx, dy) {
					let parent = neighbor.at_zoom(coord.z - 1);
					let sector = parent.sector().unwrap();
					by_sector.entry(sector.sector_dir_name()).or_default().push(parent);
				}
			}
		}
		for (sector_dir, parents) in by_sector {
			let mut builder = MockArchiveBuilder::new(0, 8);
			let mut seen = Vec::new();
			for parent in parents {
				if !seen.contains(&parent) {
					builder.add_tile(parent, &png);
					seen.push(parent);
				}
			}
			builder
				.write_to(&pmtiles_path.join(sector_dir).join("gebco.pmtiles"))
				.unwrap();
		}
	}

	fn coord() -> TileCoord {
		// away from tile-grid edges so all neighbors exist
		TileCoord::new(8, 132, 88).unwrap()
	}

	#[tokio::test]
	async fn bathymetry_tile_from_constant_depth() -> Result<()> {
		let fixture = fixture();
		write_dem_sectors(&fixture.pmtiles_path, &coord(), 7.0);

		let (blob, _) = fixture
			.derived
			.get_tile(TileKind::Bathymetry, "gebco", &coord())
			.await?
			.expect("bathymetry tile");

		let tile = decode_vector_tile(&blob)?;
		assert_eq!(tile.layers[0].name, "depth_areas");
		assert_eq!(tile.layers[1].name, "depth_contours");
		// constant 7 m depth falls into exactly the [5, 10) band
		assert_eq!(tile.layers[0].features.len(), 1);
		let properties = tile.layers[0].feature_properties(&tile.layers[0].features[0])?;
		assert!(properties.contains(&("minDepth".to_string(), TileValue::Double(5.0))));
		assert!(properties.contains(&("maxDepth".to_string(), TileValue::Double(10.0))));
		// interior band: no boundary crosses the tile, so no label lines
		assert!(tile.layers[1].features.is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn derived_tile_is_cached_and_served_from_cache() -> Result<()> {
		let fixture = fixture();
		write_dem_sectors(&fixture.pmtiles_path, &coord(), 7.0);

		let (first, _) = fixture
			.derived
			.get_tile(TileKind::Bathymetry, "gebco", &coord())
			.await?
			.unwrap();
		let hit = fixture
			.derived
			.cache
			.lookup(TileKind::Bathymetry, "gebco", &coord())
			.await
			.expect("cached after generation");
		let (second, ts) = fixture
			.derived
			.get_tile(TileKind::Bathymetry, "gebco", &coord())
			.await?
			.unwrap();
		assert_eq!(first.as_slice(), second.as_slice());
		assert_eq!(ts, hit.mtime, "second answer comes from cache");
		Ok(())
	}

	#[tokio::test]
	async fn regenerates_when_source_is_newer() -> Result<()> {
		let fixture = fixture();
		write_dem_sectors(&fixture.pmtiles_path, &coord(), 7.0);

		fixture.derived.get_tile(TileKind::Bathymetry, "gebco", &coord()).await?.unwrap();
		let first_mtime = fixture
			.derived
			.cache
			.lookup(TileKind::Bathymetry, "gebco", &coord())
			.await
			.unwrap()
			.mtime;

		// bump the archive past the cached derived tile
		let sector = coord().at_zoom(7).sector().unwrap();
		let archive = fixture
			.pmtiles_path
			.join(sector.sector_dir_name())
			.join("gebco.pmtiles");
		std::fs::File::options()
			.write(true)
			.open(&archive)?
			.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))?;

		// a cache answer would echo the old file mtime; regeneration
		// stamps a fresh timestamp
		let (_, ts) = fixture
			.derived
			.get_tile(TileKind::Bathymetry, "gebco", &coord())
			.await?
			.unwrap();
		assert!(ts > first_mtime, "expected regeneration, got the cached tile");
		Ok(())
	}

	#[tokio::test]
	async fn soundings_are_deterministic_bytes() -> Result<()> {
		let fx = fixture();
		write_dem_sectors(&fx.pmtiles_path, &coord(), 12.3);

		let (first, _) = fx
			.derived
			.get_tile(TileKind::Soundings, "gebco", &coord())
			.await?
			.unwrap();

		// drop the cache so the second call regenerates from scratch
		let other = fixture();
		write_dem_sectors(&other.pmtiles_path, &coord(), 12.3);
		let (second, _) = other
			.derived
			.get_tile(TileKind::Soundings, "gebco", &coord())
			.await?
			.unwrap();

		assert_eq!(first.as_slice(), second.as_slice(), "byte-identical regeneration");

		let tile = decode_vector_tile(&first)?;
		assert_eq!(tile.layers[0].name, "soundings");
		let properties = tile.layers[0].feature_properties(&tile.layers[0].features[0])?;
		assert_eq!(properties, vec![("depth".to_string(), TileValue::Double(12.3))]);
		Ok(())
	}

	#[tokio::test]
	async fn missing_center_tile_is_absent() -> Result<()> {
		let fixture = fixture();
		// no archives at all
		let result = fixture.derived.get_tile(TileKind::Bathymetry, "gebco", &coord()).await?;
		assert!(result.is_none());
		Ok(())
	}

	#[tokio::test]
	async fn unknown_or_vector_source_yields_nothing() -> Result<()> {
		let fixture = fixture();
		assert!(fixture.derived.get_tile(TileKind::Contours, "atlantis", &coord()).await?.is_none());
		assert!(fixture.derived.get_tile(TileKind::Contours, "osm", &coord()).await?.is_none());
		Ok(())
	}

	#[tokio::test]
	async fn zoom_outside_derived_range_is_absent() -> Result<()> {
		let fixture = fixture();
		let too_deep = TileCoord::new(15, 0, 0).unwrap();
		assert!(fixture.derived.get_tile(TileKind::Contours, "gebco", &too_deep).await?.is_none());
		let too_shallow = TileCoord::new(0, 0, 0).unwrap();
		assert!(fixture.derived.get_tile(TileKind::Contours, "gebco", &too_shallow).await?.is_none());
		Ok(())
	}

	#[tokio::test]
	async fn composite_merges_basemap_and_derived_layers() -> Result<()> {
		let fixture = fixture();
		write_dem_sectors(&fixture.pmtiles_path, &coord(), 7.0);

		// a small gzipped basemap tile in the osm sector archive
		let mut water = VectorTileLayer::new_standard("water");
		water.add_feature(
			&TileGeometry::MultiPolygon(vec![vec![
				[0.0, 0.0],
				[0.0, 4096.0],
				[4096.0, 4096.0],
				[4096.0, 0.0],
				[0.0, 0.0],
			]]),
			&[],
		)?;
		let osm_tile = VectorTile::new(vec![water]).to_blob()?;
		use flate2::{write::GzEncoder, Compression};
		use std::io::Write;
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(osm_tile.as_slice())?;
		let gzipped = encoder.finish()?;

		let sector = coord().sector().unwrap();
		let mut builder = MockArchiveBuilder::new(0, 14);
		builder.add_tile(coord(), &gzipped);
		builder
			.write_to(
				&fixture
					.pmtiles_path
					.join(sector.sector_dir_name())
					.join("osm.pmtiles"),
			)
			.unwrap();

		let (blob, _) = fixture
			.derived
			.get_tile(TileKind::Composite, "osm", &coord())
			.await?
			.expect("composite tile");
		let tile = decode_vector_tile(&blob)?;
		let names: Vec<&str> = tile.layers.iter().map(|layer| layer.name.as_str()).collect();

		assert!(names.contains(&"water"), "basemap layer present, got {names:?}");
		assert!(names.contains(&"depth_areas"), "bathymetry merged, got {names:?}");
		assert!(names.contains(&"soundings"), "soundings merged, got {names:?}");
		// basemap layers come first, derived layers after
		assert_eq!(names[0], "water");
		Ok(())
	}

	#[test]
	fn gzip_detection() -> Result<()> {
		let tile = VectorTile::new(vec![VectorTileLayer::new_standard("test")]);
		let plain = tile.to_blob()?;
		assert_eq!(decode_vector_tile(&plain)?, tile);

		use flate2::{write::GzEncoder, Compression};
		use std::io::Write;
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(plain.as_slice())?;
		let gzipped = Blob::from(encoder.finish()?);
		assert_eq!(decode_vector_tile(&gzipped)?, tile);
		Ok(())
	}
}
