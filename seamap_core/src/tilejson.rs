//! A minimal TileJSON 3.0 document, serialized with serde.

use serde::Serialize;
use std::collections::BTreeMap;

/// A TileJSON 3.0 document describing one tile set.
#[derive(Clone, Debug, Serialize)]
pub struct TileJson {
	pub tilejson: &'static str,
	pub name: String,
	pub tiles: Vec<String>,
	pub minzoom: u8,
	pub maxzoom: u8,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub attribution: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bounds: Option<[f64; 4]>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub vector_layers: Vec<VectorLayer>,
}

/// One entry of the `vector_layers` array.
#[derive(Clone, Debug, Serialize)]
pub struct VectorLayer {
	pub id: String,
	pub fields: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub minzoom: Option<u8>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub maxzoom: Option<u8>,
}

impl TileJson {
	pub fn new(name: &str, tiles_url: String, minzoom: u8, maxzoom: u8) -> TileJson {
		TileJson {
			tilejson: "3.0.0",
			name: name.to_string(),
			tiles: vec![tiles_url],
			minzoom,
			maxzoom,
			attribution: None,
			bounds: None,
			vector_layers: Vec::new(),
		}
	}

	pub fn with_attribution(mut self, attribution: Option<&str>) -> TileJson {
		self.attribution = attribution.map(str::to_string);
		self
	}

	pub fn with_vector_layer(mut self, id: &str, fields: &[(&str, &str)]) -> TileJson {
		self.vector_layers.push(VectorLayer {
			id: id.to_string(),
			fields: fields
				.iter()
				.map(|(k, v)| ((*k).to_string(), (*v).to_string()))
				.collect(),
			minzoom: None,
			maxzoom: None,
		});
		self
	}
}
