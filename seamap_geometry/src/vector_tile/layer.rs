//! One named layer of a vector tile.

use super::{PropertyManager, TileFeature, TileGeometry, TileValue};
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use seamap_core::io::{ValueReaderSlice, ValueWriterBlob};
use seamap_core::Blob;

pub const DEFAULT_EXTENT: u32 = 4096;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorTileLayer {
	pub name: String,
	pub extent: u32,
	pub version: u32,
	pub features: Vec<TileFeature>,
	pub properties: PropertyManager,
}

impl VectorTileLayer {
	/// A fresh layer with the standard extent of 4096.
	pub fn new_standard(name: &str) -> VectorTileLayer {
		VectorTileLayer {
			name: name.to_string(),
			extent: DEFAULT_EXTENT,
			version: 2,
			features: Vec::new(),
			properties: PropertyManager::new(),
		}
	}

	/// Adds a feature, interning its properties into the layer tables.
	///
	/// Integer properties outside the signed 32-bit range are dropped, since
	/// consumers of the format reject them.
	pub fn add_feature(&mut self, geometry: &TileGeometry, properties: &[(&str, TileValue)]) -> Result<()> {
		let mut tag_ids = Vec::with_capacity(properties.len() * 2);
		for (key, value) in properties {
			if !value.is_representable() {
				debug!("dropping property '{key}' with out-of-range value {value:?}");
				continue;
			}
			tag_ids.push(self.properties.add_key((*key).to_string()));
			tag_ids.push(self.properties.add_value(value.clone()));
		}
		self.features.push(TileFeature::from_geometry(None, tag_ids, geometry)?);
		Ok(())
	}

	/// The properties of a decoded feature, resolved against the layer
	/// tables.
	pub fn feature_properties(&self, feature: &TileFeature) -> Result<Vec<(String, TileValue)>> {
		let mut properties = Vec::with_capacity(feature.tag_ids.len() / 2);
		for pair in feature.tag_ids.chunks(2) {
			let [key_id, value_id] = pair else {
				bail!("feature has an odd number of tag ids");
			};
			let key = self.properties.key(*key_id).ok_or_else(|| anyhow!("key id {key_id} out of range"))?;
			let value = self
				.properties
				.value(*value_id)
				.ok_or_else(|| anyhow!("value id {value_id} out of range"))?;
			properties.push((key.clone(), value.clone()));
		}
		Ok(properties)
	}

	pub fn is_empty(&self) -> bool {
		self.features.is_empty()
	}

	pub fn read(reader: &mut ValueReaderSlice) -> Result<VectorTileLayer> {
		let mut name = None;
		let mut extent = DEFAULT_EXTENT;
		let mut version = 1;
		let mut features = Vec::new();
		let mut keys = Vec::new();
		let mut values = Vec::new();

		while reader.has_remaining() {
			match reader.read_pbf_key().context("failed to read PBF key")? {
				(1, 2) => name = Some(reader.read_pbf_string()?),
				(2, 2) => {
					let mut sub = reader.get_pbf_sub_reader()?;
					features.push(TileFeature::read(&mut sub).context("failed to read feature")?);
				}
				(3, 2) => keys.push(reader.read_pbf_string()?),
				(4, 2) => {
					let mut sub = reader.get_pbf_sub_reader()?;
					values.push(TileValue::read(&mut sub).context("failed to read value")?);
				}
				(5, 0) => extent = reader.read_varint()? as u32,
				(15, 0) => version = reader.read_varint()? as u32,
				(f, w) => bail!("unexpected field number ({f}) / wire type ({w}) in layer"),
			}
		}

		Ok(VectorTileLayer {
			name: name.ok_or_else(|| anyhow!("layer without a name"))?,
			extent,
			version,
			features,
			properties: PropertyManager::from_tables(keys, values),
		})
	}

	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new();

		writer.write_pbf_key(1, 2)?;
		writer.write_pbf_string(&self.name)?;

		for feature in &self.features {
			writer.write_pbf_key(2, 2)?;
			writer.write_pbf_blob(&feature.to_blob()?)?;
		}
		for key in self.properties.iter_keys() {
			writer.write_pbf_key(3, 2)?;
			writer.write_pbf_string(key)?;
		}
		for value in self.properties.iter_values() {
			writer.write_pbf_key(4, 2)?;
			writer.write_pbf_blob(&value.to_blob()?)?;
		}

		writer.write_pbf_key(5, 0)?;
		writer.write_varint(u64::from(self.extent))?;
		writer.write_pbf_key(15, 0)?;
		writer.write_varint(u64::from(self.version))?;

		Ok(writer.into_blob())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn layer_round_trip() -> Result<()> {
		let mut layer = VectorTileLayer::new_standard("soundings");
		layer.add_feature(
			&TileGeometry::MultiPoint(vec![[100.0, 200.0]]),
			&[("depth", TileValue::Double(5.2))],
		)?;
		layer.add_feature(
			&TileGeometry::MultiPoint(vec![[300.0, 400.0]]),
			&[("depth", TileValue::Double(7.9))],
		)?;

		let blob = layer.to_blob()?;
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		let decoded = VectorTileLayer::read(&mut reader)?;

		assert_eq!(decoded.name, "soundings");
		assert_eq!(decoded.extent, DEFAULT_EXTENT);
		assert_eq!(decoded.features.len(), 2);
		assert_eq!(
			decoded.feature_properties(&decoded.features[1])?,
			vec![("depth".to_string(), TileValue::Double(7.9))]
		);
		Ok(())
	}

	#[test]
	fn properties_are_interned_across_features() -> Result<()> {
		let mut layer = VectorTileLayer::new_standard("contours");
		for i in 0..10 {
			layer.add_feature(
				&TileGeometry::MultiLineString(vec![vec![[0.0, f64::from(i)], [10.0, f64::from(i)]]]),
				&[("ele", TileValue::Int(100))],
			)?;
		}
		assert_eq!(layer.properties.iter_keys().count(), 1);
		assert_eq!(layer.properties.iter_values().count(), 1);
		Ok(())
	}

	#[test]
	fn out_of_range_integers_are_dropped() -> Result<()> {
		let mut layer = VectorTileLayer::new_standard("test");
		layer.add_feature(
			&TileGeometry::MultiPoint(vec![[1.0, 1.0]]),
			&[
				("ok", TileValue::Int(7)),
				("too_big", TileValue::Int(i64::from(i32::MAX) + 1)),
			],
		)?;
		let feature = &layer.features[0];
		assert_eq!(feature.tag_ids.len(), 2, "only the representable property is kept");
		assert_eq!(
			layer.feature_properties(feature)?,
			vec![("ok".to_string(), TileValue::Int(7))]
		);
		Ok(())
	}

	#[test]
	fn layer_without_name_is_rejected() {
		// a single extent field, no name
		let mut writer = ValueWriterBlob::new();
		writer.write_pbf_key(5, 0).unwrap();
		writer.write_varint(4096).unwrap();
		let blob = writer.into_blob();
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		assert!(VectorTileLayer::read(&mut reader).is_err());
	}
}
