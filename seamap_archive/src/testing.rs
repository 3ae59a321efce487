//! Test fixtures: build small, valid archives in memory or on disk.
//!
//! Only compiled for tests (and for downstream crates enabling the `test`
//! feature).

use crate::types::{serialize_directory, tile_id, ArchiveCompression, ArchiveHeader, ArchiveTileType, Entry};
use crate::SectorArchive;
use anyhow::Result;
use seamap_core::{Blob, ByteRange, TileCoord};
use std::path::Path;

/// Builds a minimal single-root-directory archive from a set of tiles.
pub struct MockArchiveBuilder {
	min_zoom: u8,
	max_zoom: u8,
	tiles: Vec<(TileCoord, Vec<u8>)>,
}

impl MockArchiveBuilder {
	pub fn new(min_zoom: u8, max_zoom: u8) -> MockArchiveBuilder {
		MockArchiveBuilder {
			min_zoom,
			max_zoom,
			tiles: Vec::new(),
		}
	}

	pub fn add_tile(&mut self, coord: TileCoord, bytes: &[u8]) {
		self.tiles.push((coord, bytes.to_vec()));
	}

	/// Serializes the archive into a byte blob.
	pub fn build(&self) -> Result<Blob> {
		let mut entries = Vec::new();
		let mut tile_data = Vec::new();

		let mut ids: Vec<(u64, &Vec<u8>)> = self.tiles.iter().map(|(coord, bytes)| (tile_id(coord), bytes)).collect();
		ids.sort_by_key(|(id, _)| *id);

		for (id, bytes) in ids {
			entries.push(Entry {
				tile_id: id,
				range: ByteRange::new(tile_data.len() as u64, bytes.len() as u64),
				run_length: 1,
			});
			tile_data.extend_from_slice(bytes);
		}

		let root_dir = serialize_directory(&entries)?;
		let metadata = b"{}";

		let root_offset = ArchiveHeader::len();
		let metadata_offset = root_offset + root_dir.len();
		let tile_data_offset = metadata_offset + metadata.len() as u64;

		let header = ArchiveHeader {
			root_dir: ByteRange::new(root_offset, root_dir.len()),
			metadata: ByteRange::new(metadata_offset, metadata.len() as u64),
			leaf_dirs: ByteRange::new(tile_data_offset, 0),
			tile_data: ByteRange::new(tile_data_offset, tile_data.len() as u64),
			addressed_tiles_count: self.tiles.len() as u64,
			tile_entries_count: self.tiles.len() as u64,
			tile_contents_count: self.tiles.len() as u64,
			clustered: true,
			internal_compression: ArchiveCompression::None,
			tile_compression: ArchiveCompression::None,
			tile_type: ArchiveTileType::Mvt,
			min_zoom: self.min_zoom,
			max_zoom: self.max_zoom,
			min_lon_e7: -1_800_000_000,
			min_lat_e7: -850_511_287,
			max_lon_e7: 1_800_000_000,
			max_lat_e7: 850_511_287,
			center_zoom: self.min_zoom,
			center_lon_e7: 0,
			center_lat_e7: 0,
		};

		let mut bytes = header.serialize()?.into_vec();
		bytes.extend_from_slice(root_dir.as_slice());
		bytes.extend_from_slice(metadata);
		bytes.extend_from_slice(&tile_data);
		Ok(Blob::from(bytes))
	}

	/// Writes the archive to `path`.
	pub fn write_to(&self, path: &Path) -> Result<()> {
		std::fs::create_dir_all(path.parent().unwrap())?;
		std::fs::write(path, self.build()?.as_slice())?;
		Ok(())
	}

	/// Writes the archive to a temporary file and opens it.
	pub async fn into_archive(self) -> Result<SectorArchive> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("fixture.pmtiles");
		self.write_to(&path)?;
		// open before the tempdir is dropped; the fd stays valid afterwards
		SectorArchive::open_path(&path).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_a_parsable_archive() -> Result<()> {
		let mut builder = MockArchiveBuilder::new(0, 6);
		builder.add_tile(TileCoord::new(6, 34, 22)?, b"payload");
		let blob = builder.build()?;

		let header = ArchiveHeader::deserialize(&blob.read_range(&ByteRange::new(0, ArchiveHeader::len()))?)?;
		assert_eq!(header.min_zoom, 0);
		assert_eq!(header.max_zoom, 6);
		assert_eq!(header.addressed_tiles_count, 1);
		Ok(())
	}
}
