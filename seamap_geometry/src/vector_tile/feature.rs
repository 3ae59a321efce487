//! One feature of a vector-tile layer: tag ids plus command-encoded
//! geometry.

use super::geometry_type::GeomType;
use anyhow::{bail, ensure, Context, Result};
use seamap_core::io::{ValueReaderSlice, ValueWriterBlob};
use seamap_core::Blob;

/// Decoded feature geometry in tile-extent coordinates.
///
/// Polygons hold their rings flat, outer ring first followed by its holes;
/// ring roles are carried by winding, as the wire format prescribes.
#[derive(Clone, Debug, PartialEq)]
pub enum TileGeometry {
	MultiPoint(Vec<[f64; 2]>),
	MultiLineString(Vec<Vec<[f64; 2]>>),
	MultiPolygon(Vec<Vec<[f64; 2]>>),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileFeature {
	pub id: Option<u64>,
	pub tag_ids: Vec<u32>,
	pub geom_type: GeomType,
	pub geom_data: Blob,
}

impl TileFeature {
	pub fn read(reader: &mut ValueReaderSlice) -> Result<TileFeature> {
		let mut feature = TileFeature::default();

		while reader.has_remaining() {
			match reader.read_pbf_key().context("failed to read PBF key")? {
				(1, 0) => feature.id = Some(reader.read_varint()?),
				(2, 2) => feature.tag_ids = reader.read_pbf_packed_uint32()?,
				(3, 0) => feature.geom_type = GeomType::from(reader.read_varint()?),
				(4, 2) => feature.geom_data = reader.read_pbf_blob()?,
				(f, w) => bail!("unexpected field number ({f}) / wire type ({w}) in feature"),
			}
		}

		Ok(feature)
	}

	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new();

		if let Some(id) = self.id {
			writer.write_pbf_key(1, 0)?;
			writer.write_varint(id)?;
		}
		if !self.tag_ids.is_empty() {
			writer.write_pbf_key(2, 2)?;
			writer.write_pbf_packed_uint32(&self.tag_ids)?;
		}
		writer.write_pbf_key(3, 0)?;
		writer.write_varint(self.geom_type.as_u64())?;
		if !self.geom_data.is_empty() {
			writer.write_pbf_key(4, 2)?;
			writer.write_pbf_blob(&self.geom_data)?;
		}

		Ok(writer.into_blob())
	}

	/// Encodes geometry into the command stream of the wire format.
	pub fn from_geometry(id: Option<u64>, tag_ids: Vec<u32>, geometry: &TileGeometry) -> Result<TileFeature> {
		fn write_point(writer: &mut ValueWriterBlob, cursor: &mut (i64, i64), point: [f64; 2]) -> Result<()> {
			let x = point[0].round() as i64;
			let y = point[1].round() as i64;
			writer.write_svarint(x - cursor.0)?;
			writer.write_svarint(y - cursor.1)?;
			*cursor = (x, y);
			Ok(())
		}

		let mut writer = ValueWriterBlob::new();
		let cursor = &mut (0i64, 0i64);

		let geom_type = match geometry {
			TileGeometry::MultiPoint(points) => {
				ensure!(!points.is_empty(), "point features must contain points");
				writer.write_varint(((points.len() as u64) << 3) | 0x1)?; // MoveTo
				for point in points {
					write_point(&mut writer, cursor, *point)?;
				}
				GeomType::Point
			}
			TileGeometry::MultiLineString(lines) => {
				for line in lines {
					ensure!(line.len() >= 2, "linestrings must contain at least two points");
					writer.write_varint(1 << 3 | 0x1)?; // MoveTo
					write_point(&mut writer, cursor, line[0])?;
					writer.write_varint(((line.len() as u64 - 1) << 3) | 0x2)?; // LineTo
					for point in &line[1..] {
						write_point(&mut writer, cursor, *point)?;
					}
				}
				GeomType::LineString
			}
			TileGeometry::MultiPolygon(rings) => {
				for ring in rings {
					ensure!(ring.len() >= 4, "rings must contain at least four points (A,B,C,A)");
					ensure!(ring[0] == ring[ring.len() - 1], "rings must be closed");
					// the closing point is implied by ClosePath
					let open = &ring[..ring.len() - 1];
					writer.write_varint(1 << 3 | 0x1)?; // MoveTo
					write_point(&mut writer, cursor, open[0])?;
					writer.write_varint(((open.len() as u64 - 1) << 3) | 0x2)?; // LineTo
					for point in &open[1..] {
						write_point(&mut writer, cursor, *point)?;
					}
					writer.write_varint(7)?; // ClosePath
				}
				GeomType::Polygon
			}
		};

		Ok(TileFeature {
			id,
			tag_ids,
			geom_type,
			geom_data: writer.into_blob(),
		})
	}

	/// Decodes the command stream back into geometry.
	pub fn to_geometry(&self) -> Result<TileGeometry> {
		let mut reader = ValueReaderSlice::new(self.geom_data.as_slice());

		let mut lines: Vec<Vec<[f64; 2]>> = Vec::new();
		let mut line: Vec<[f64; 2]> = Vec::new();
		let mut x = 0i64;
		let mut y = 0i64;

		while reader.has_remaining() {
			let value = reader.read_varint()?;
			let command = value & 0x7;
			let count = value >> 3;

			match command {
				1 | 2 => {
					for _ in 0..count {
						if command == 1 && !line.is_empty() {
							lines.push(line);
							line = Vec::new();
						}
						x += reader.read_svarint()?;
						y += reader.read_svarint()?;
						line.push([x as f64, y as f64]);
					}
				}
				7 => {
					ensure!(!line.is_empty(), "ClosePath on an empty ring");
					line.push(line[0]);
				}
				_ => bail!("unknown geometry command {command}"),
			}
		}
		if !line.is_empty() {
			lines.push(line);
		}

		match self.geom_type {
			GeomType::Point => {
				// every MoveTo starts a new "line" above, so each point
				// arrives as its own single-entry line
				let mut points = Vec::with_capacity(lines.len());
				for line in lines {
					ensure!(line.len() == 1, "point entries must hold exactly one point");
					points.push(line[0]);
				}
				ensure!(!points.is_empty(), "point geometry must not be empty");
				Ok(TileGeometry::MultiPoint(points))
			}
			GeomType::LineString => {
				for l in &lines {
					ensure!(l.len() >= 2, "decoded linestring is degenerate");
				}
				Ok(TileGeometry::MultiLineString(lines))
			}
			GeomType::Polygon => {
				for ring in &lines {
					ensure!(ring.len() >= 4, "decoded ring is degenerate");
					ensure!(ring[0] == ring[ring.len() - 1], "decoded ring is not closed");
				}
				Ok(TileGeometry::MultiPolygon(lines))
			}
			GeomType::Unknown => bail!("unknown geometry type"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(geometry: TileGeometry) -> Result<()> {
		let feature = TileFeature::from_geometry(None, vec![], &geometry)?;
		let blob = feature.to_blob()?;
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		let decoded = TileFeature::read(&mut reader)?;
		assert_eq!(decoded.to_geometry()?, geometry);
		Ok(())
	}

	#[test]
	fn point_round_trip() -> Result<()> {
		round_trip(TileGeometry::MultiPoint(vec![[25.0, 17.0]]))?;
		round_trip(TileGeometry::MultiPoint(vec![[5.0, 7.0], [3.0, 2.0], [4095.0, 0.0]]))
	}

	#[test]
	fn line_round_trip() -> Result<()> {
		round_trip(TileGeometry::MultiLineString(vec![
			vec![[2.0, 2.0], [2.0, 10.0], [10.0, 10.0]],
			vec![[1.0, 1.0], [3.0, 5.0]],
		]))
	}

	#[test]
	fn polygon_round_trip() -> Result<()> {
		round_trip(TileGeometry::MultiPolygon(vec![
			vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
			vec![[3.0, 3.0], [3.0, 5.0], [5.0, 5.0], [3.0, 3.0]],
		]))
	}

	#[test]
	fn id_and_tags_survive() -> Result<()> {
		let feature = TileFeature::from_geometry(
			Some(42),
			vec![0, 1, 2, 3],
			&TileGeometry::MultiPoint(vec![[1.0, 2.0]]),
		)?;
		let blob = feature.to_blob()?;
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		let decoded = TileFeature::read(&mut reader)?;
		assert_eq!(decoded.id, Some(42));
		assert_eq!(decoded.tag_ids, vec![0, 1, 2, 3]);
		assert_eq!(decoded.geom_type, GeomType::Point);
		Ok(())
	}

	#[test]
	fn coordinates_are_rounded_to_integers() -> Result<()> {
		let feature = TileFeature::from_geometry(None, vec![], &TileGeometry::MultiPoint(vec![[1.4, 2.6]]))?;
		assert_eq!(
			feature.to_geometry()?,
			TileGeometry::MultiPoint(vec![[1.0, 3.0]])
		);
		Ok(())
	}

	#[test]
	fn degenerate_geometry_is_rejected() {
		assert!(TileFeature::from_geometry(None, vec![], &TileGeometry::MultiPoint(vec![])).is_err());
		assert!(
			TileFeature::from_geometry(None, vec![], &TileGeometry::MultiLineString(vec![vec![[0.0, 0.0]]])).is_err()
		);
		assert!(TileFeature::from_geometry(
			None,
			vec![],
			&TileGeometry::MultiPolygon(vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]])
		)
		.is_err());
	}
}
