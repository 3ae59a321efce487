//! Reading tiles from a cloud-optimized archive.

use crate::types::{find_tile, parse_directory, tile_id, ArchiveHeader, Entry};
use anyhow::{bail, Context, Result};
use lru::LruCache;
use parking_lot::Mutex;
use seamap_core::{
	io::{DataReader, DataReaderFile, DataReaderHttp},
	Blob, ByteRange, TileCoord, TileFormat,
};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

/// Parsed leaf directories kept per reader; leaves repeat heavily for
/// neighboring tile requests.
const LEAF_CACHE_SIZE: usize = 16;

/// An open tile archive.
///
/// The header and root directory are read once at open time; afterwards
/// every tile lookup costs at most one leaf-directory read plus one tile
/// read. All reads are positional, so one `SectorArchive` serves concurrent
/// requests.
pub struct SectorArchive {
	data_reader: DataReader,
	header: ArchiveHeader,
	root_entries: Vec<Entry>,
	leaf_cache: Mutex<LruCache<ByteRange, Arc<Vec<Entry>>>>,
}

impl SectorArchive {
	/// Opens a local archive file.
	pub async fn open_path(path: &Path) -> Result<SectorArchive> {
		let reader = DataReaderFile::open(path).with_context(|| format!("failed to open archive {path:?}"))?;
		SectorArchive::open_reader(Box::new(reader)).await
	}

	/// Opens a remote archive via HTTP range requests.
	pub async fn open_url(url: &str) -> Result<SectorArchive> {
		let url = reqwest::Url::parse(url).with_context(|| format!("invalid archive url '{url}'"))?;
		let reader = DataReaderHttp::from_url(url)?;
		SectorArchive::open_reader(Box::new(reader)).await
	}

	pub async fn open_reader(data_reader: DataReader) -> Result<SectorArchive> {
		let header_blob = data_reader
			.read_range(&ByteRange::new(0, ArchiveHeader::len()))
			.await
			.with_context(|| format!("failed to read header of '{}'", data_reader.get_name()))?;
		let header = ArchiveHeader::deserialize(&header_blob)?;

		let root_blob = data_reader.read_range(&header.root_dir).await?;
		let root_blob = header.internal_compression.decompress(root_blob)?;
		let root_entries = parse_directory(&root_blob)
			.with_context(|| format!("failed to parse root directory of '{}'", data_reader.get_name()))?;

		Ok(SectorArchive {
			data_reader,
			header,
			root_entries,
			leaf_cache: Mutex::new(LruCache::new(NonZeroUsize::new(LEAF_CACHE_SIZE).unwrap())),
		})
	}

	pub fn name(&self) -> &str {
		self.data_reader.get_name()
	}

	pub fn min_zoom(&self) -> u8 {
		self.header.min_zoom
	}

	pub fn max_zoom(&self) -> u8 {
		self.header.max_zoom
	}

	pub fn tile_format(&self) -> Option<TileFormat> {
		self.header.tile_type.as_tile_format()
	}

	/// Returns the tile bytes as stored, or `None` if the archive has no
	/// tile at this coordinate. I/O problems are errors, absence is not.
	pub async fn get_tile(&self, coord: &TileCoord) -> Result<Option<Blob>> {
		let id = tile_id(coord);

		let mut entry = match find_tile(&self.root_entries, id) {
			Some(entry) => entry,
			None => return Ok(None),
		};

		// follow leaf-directory pointers; the format nests at most a few
		// levels, anything deeper is a broken archive
		for _ in 0..3 {
			if entry.run_length > 0 {
				let range = entry.range.get_shifted_forward(self.header.tile_data.offset);
				let blob = self
					.data_reader
					.read_range(&range)
					.await
					.with_context(|| format!("failed to read tile {coord} from '{}'", self.name()))?;
				return Ok(Some(blob));
			}

			let entries = self.leaf_entries(entry.range).await?;
			entry = match find_tile(&entries, id) {
				Some(entry) => entry,
				None => return Ok(None),
			};
		}

		bail!("leaf directories nested too deeply in '{}'", self.name());
	}

	async fn leaf_entries(&self, range: ByteRange) -> Result<Arc<Vec<Entry>>> {
		if let Some(entries) = self.leaf_cache.lock().get(&range) {
			return Ok(Arc::clone(entries));
		}

		let blob = self
			.data_reader
			.read_range(&range.get_shifted_forward(self.header.leaf_dirs.offset))
			.await?;
		let blob = self.header.internal_compression.decompress(blob)?;
		let entries = Arc::new(parse_directory(&blob)?);

		self.leaf_cache.lock().put(range, Arc::clone(&entries));
		Ok(entries)
	}
}

impl std::fmt::Debug for SectorArchive {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SectorArchive")
			.field("name", &self.name())
			.field("zoom", &(self.header.min_zoom..=self.header.max_zoom))
			.field("entries", &self.root_entries.len())
			.finish()
	}
}
