//! A whole vector tile: an ordered list of layers.

use super::VectorTileLayer;
use anyhow::{bail, Context, Result};
use seamap_core::io::{ValueReaderSlice, ValueWriterBlob};
use seamap_core::Blob;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorTile {
	pub layers: Vec<VectorTileLayer>,
}

impl VectorTile {
	pub fn new(layers: Vec<VectorTileLayer>) -> VectorTile {
		VectorTile { layers }
	}

	pub fn from_blob(blob: &Blob) -> Result<VectorTile> {
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		let mut layers = Vec::new();

		while reader.has_remaining() {
			match reader.read_pbf_key().context("failed to read PBF key")? {
				(3, 2) => {
					let mut sub = reader.get_pbf_sub_reader()?;
					layers.push(VectorTileLayer::read(&mut sub).context("failed to read layer")?);
				}
				(f, w) => bail!("unexpected field number ({f}) / wire type ({w}) in tile"),
			}
		}

		Ok(VectorTile { layers })
	}

	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new();
		for layer in &self.layers {
			writer.write_pbf_key(3, 2)?;
			writer.write_pbf_blob(&layer.to_blob()?)?;
		}
		Ok(writer.into_blob())
	}

	/// True when no layer carries a feature.
	pub fn is_empty(&self) -> bool {
		self.layers.iter().all(VectorTileLayer::is_empty)
	}
}
