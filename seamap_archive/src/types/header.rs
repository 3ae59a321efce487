use super::ArchiveCompression;
use anyhow::{bail, ensure, Result};
use seamap_core::{
	io::{ValueReaderSlice, ValueWriterBlob},
	Blob, ByteRange, TileFormat,
};

/// Tile payload type stored in an archive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveTileType {
	Unknown = 0,
	Mvt = 1,
	Png = 2,
	Jpeg = 3,
	Webp = 4,
	Avif = 5,
}

impl ArchiveTileType {
	pub fn from_u8(value: u8) -> Result<ArchiveTileType> {
		Ok(match value {
			0 => ArchiveTileType::Unknown,
			1 => ArchiveTileType::Mvt,
			2 => ArchiveTileType::Png,
			3 => ArchiveTileType::Jpeg,
			4 => ArchiveTileType::Webp,
			5 => ArchiveTileType::Avif,
			_ => bail!("unknown tile type value {value}"),
		})
	}

	pub fn as_tile_format(&self) -> Option<TileFormat> {
		match self {
			ArchiveTileType::Mvt => Some(TileFormat::Pbf),
			ArchiveTileType::Png => Some(TileFormat::Png),
			ArchiveTileType::Webp => Some(TileFormat::Webp),
			_ => None,
		}
	}
}

/// The fixed-size (127 byte) little-endian archive header.
#[derive(Debug, PartialEq)]
pub struct ArchiveHeader {
	pub root_dir: ByteRange,
	pub metadata: ByteRange,
	pub leaf_dirs: ByteRange,
	pub tile_data: ByteRange,
	pub addressed_tiles_count: u64,
	pub tile_entries_count: u64,
	pub tile_contents_count: u64,
	pub clustered: bool,
	pub internal_compression: ArchiveCompression,
	pub tile_compression: ArchiveCompression,
	pub tile_type: ArchiveTileType,
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub min_lon_e7: i32,
	pub min_lat_e7: i32,
	pub max_lon_e7: i32,
	pub max_lat_e7: i32,
	pub center_zoom: u8,
	pub center_lon_e7: i32,
	pub center_lat_e7: i32,
}

impl ArchiveHeader {
	pub const MAGIC: &'static [u8; 7] = b"PMTiles";

	pub fn len() -> u64 {
		127
	}

	pub fn deserialize(blob: &Blob) -> Result<ArchiveHeader> {
		let buffer = blob.as_slice();
		ensure!(buffer.len() == 127, "archive header must be 127 bytes");
		ensure!(&buffer[0..7] == Self::MAGIC, "bad archive magic number");
		ensure!(buffer[7] == 3, "archive version must be 3");

		let mut reader = ValueReaderSlice::new(buffer);
		reader.set_position(8)?;

		Ok(ArchiveHeader {
			root_dir: reader.read_range()?,
			metadata: reader.read_range()?,
			leaf_dirs: reader.read_range()?,
			tile_data: reader.read_range()?,
			addressed_tiles_count: reader.read_u64()?,
			tile_entries_count: reader.read_u64()?,
			tile_contents_count: reader.read_u64()?,
			clustered: reader.read_u8()? == 1,
			internal_compression: ArchiveCompression::from_u8(reader.read_u8()?)?,
			tile_compression: ArchiveCompression::from_u8(reader.read_u8()?)?,
			tile_type: ArchiveTileType::from_u8(reader.read_u8()?)?,
			min_zoom: reader.read_u8()?,
			max_zoom: reader.read_u8()?,
			min_lon_e7: reader.read_i32()?,
			min_lat_e7: reader.read_i32()?,
			max_lon_e7: reader.read_i32()?,
			max_lat_e7: reader.read_i32()?,
			center_zoom: reader.read_u8()?,
			center_lon_e7: reader.read_i32()?,
			center_lat_e7: reader.read_i32()?,
		})
	}

	pub fn serialize(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new();
		writer.write_slice(Self::MAGIC)?;
		writer.write_u8(3)?;

		writer.write_u64(self.root_dir.offset)?;
		writer.write_u64(self.root_dir.length)?;
		writer.write_u64(self.metadata.offset)?;
		writer.write_u64(self.metadata.length)?;
		writer.write_u64(self.leaf_dirs.offset)?;
		writer.write_u64(self.leaf_dirs.length)?;
		writer.write_u64(self.tile_data.offset)?;
		writer.write_u64(self.tile_data.length)?;
		writer.write_u64(self.addressed_tiles_count)?;
		writer.write_u64(self.tile_entries_count)?;
		writer.write_u64(self.tile_contents_count)?;
		writer.write_u8(u8::from(self.clustered))?;
		writer.write_u8(self.internal_compression as u8)?;
		writer.write_u8(self.tile_compression as u8)?;
		writer.write_u8(self.tile_type as u8)?;
		writer.write_u8(self.min_zoom)?;
		writer.write_u8(self.max_zoom)?;
		writer.write_i32(self.min_lon_e7)?;
		writer.write_i32(self.min_lat_e7)?;
		writer.write_i32(self.max_lon_e7)?;
		writer.write_i32(self.max_lat_e7)?;
		writer.write_u8(self.center_zoom)?;
		writer.write_i32(self.center_lon_e7)?;
		writer.write_i32(self.center_lat_e7)?;

		let blob = writer.into_blob();
		ensure!(blob.len() == Self::len(), "serialized header has wrong length");
		Ok(blob)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_round_trip() -> Result<()> {
		let header = ArchiveHeader {
			root_dir: ByteRange::new(127, 64),
			metadata: ByteRange::new(191, 2),
			leaf_dirs: ByteRange::new(193, 0),
			tile_data: ByteRange::new(193, 4000),
			addressed_tiles_count: 12,
			tile_entries_count: 12,
			tile_contents_count: 10,
			clustered: true,
			internal_compression: ArchiveCompression::Gzip,
			tile_compression: ArchiveCompression::None,
			tile_type: ArchiveTileType::Webp,
			min_zoom: 0,
			max_zoom: 12,
			min_lon_e7: -1_800_000_000,
			min_lat_e7: -850_511_287,
			max_lon_e7: 1_800_000_000,
			max_lat_e7: 850_511_287,
			center_zoom: 6,
			center_lon_e7: 0,
			center_lat_e7: 0,
		};

		let blob = header.serialize()?;
		assert_eq!(blob.len(), 127);
		assert_eq!(ArchiveHeader::deserialize(&blob)?, header);
		Ok(())
	}

	#[test]
	fn rejects_bad_magic() {
		let mut bytes = vec![0u8; 127];
		bytes[0..7].copy_from_slice(b"NOTILES");
		assert!(ArchiveHeader::deserialize(&Blob::from(bytes)).is_err());
	}

	#[test]
	fn rejects_wrong_version() -> Result<()> {
		let mut bytes = vec![0u8; 127];
		bytes[0..7].copy_from_slice(ArchiveHeader::MAGIC);
		bytes[7] = 2;
		assert!(ArchiveHeader::deserialize(&Blob::from(bytes)).is_err());
		Ok(())
	}

	#[test]
	fn tile_type_mapping() {
		assert_eq!(ArchiveTileType::Mvt.as_tile_format(), Some(TileFormat::Pbf));
		assert_eq!(ArchiveTileType::Webp.as_tile_format(), Some(TileFormat::Webp));
		assert_eq!(ArchiveTileType::Jpeg.as_tile_format(), None);
	}
}
