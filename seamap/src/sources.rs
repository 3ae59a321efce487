//! The upstream tile sources served by this process.

use seamap_core::TileFormat;
use seamap_terrain::TerrainEncoding;

/// Static description of one upstream source.
#[derive(Clone, Debug)]
pub struct SourceDef {
	pub name: &'static str,
	pub url: &'static str,
	/// File name of this source's archive inside a sector directory.
	pub output: &'static str,
	pub minzoom: u8,
	pub maxzoom: u8,
	pub format: TileFormat,
	/// Set for terrain-RGB sources; `None` for vector sources.
	pub encoding: Option<TerrainEncoding>,
	pub attribution: Option<&'static str>,
}

impl SourceDef {
	pub fn content_type(&self) -> &'static str {
		self.format.content_type()
	}

	pub fn zoom_in_range(&self, z: u8) -> bool {
		z >= self.minzoom && z <= self.maxzoom
	}
}

/// The five configured sources, in download order.
pub struct Sources {
	sources: Vec<SourceDef>,
}

impl Sources {
	pub fn get(&self, name: &str) -> Option<&SourceDef> {
		self.sources.iter().find(|s| s.name == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &SourceDef> + '_ {
		self.sources.iter()
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// URL probed by the connectivity monitor.
	pub fn probe_url(&self) -> Option<&'static str> {
		self.sources.first().map(|s| s.url)
	}

	// fixed roles used by the composite endpoint
	pub fn basemap(&self) -> &SourceDef {
		&self.sources[0]
	}

	pub fn overlay(&self) -> &SourceDef {
		&self.sources[1]
	}

	pub fn bathymetry(&self) -> &SourceDef {
		self.get("gebco").expect("gebco source is configured")
	}

	pub fn terrain(&self) -> &SourceDef {
		self.get("mapterhorn").expect("mapterhorn source is configured")
	}
}

impl Default for Sources {
	fn default() -> Sources {
		Sources {
			sources: vec![
				SourceDef {
					name: "osm",
					url: "https://build.protomaps.com/osm.pmtiles",
					output: "osm.pmtiles",
					minzoom: 0,
					maxzoom: 14,
					format: TileFormat::Pbf,
					encoding: None,
					attribution: Some("© OpenStreetMap contributors"),
				},
				SourceDef {
					name: "openseamap",
					url: "https://osmdata.seamap.dev/openseamap.pmtiles",
					output: "openseamap.pmtiles",
					minzoom: 0,
					maxzoom: 14,
					format: TileFormat::Pbf,
					encoding: None,
					attribution: Some("© OpenSeaMap contributors"),
				},
				SourceDef {
					name: "gebco",
					url: "https://osmdata.seamap.dev/gebco.pmtiles",
					output: "gebco.pmtiles",
					minzoom: 0,
					maxzoom: 8,
					format: TileFormat::Png,
					encoding: Some(TerrainEncoding::Terrarium),
					attribution: Some("GEBCO Compilation Group"),
				},
				SourceDef {
					name: "emodnet",
					url: "https://osmdata.seamap.dev/emodnet.pmtiles",
					output: "emodnet.pmtiles",
					minzoom: 3,
					maxzoom: 10,
					format: TileFormat::Png,
					encoding: Some(TerrainEncoding::Terrarium),
					attribution: Some("EMODnet Bathymetry Consortium"),
				},
				SourceDef {
					name: "mapterhorn",
					url: "https://download.mapterhorn.com/planet.pmtiles",
					output: "mapterhorn.pmtiles",
					minzoom: 0,
					maxzoom: 12,
					format: TileFormat::Webp,
					encoding: Some(TerrainEncoding::Terrarium),
					attribution: Some("© Mapterhorn"),
				},
			],
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn five_sources_with_roles() {
		let sources = Sources::default();
		assert_eq!(sources.len(), 5);
		assert_eq!(sources.basemap().name, "osm");
		assert_eq!(sources.overlay().name, "openseamap");
		assert_eq!(sources.bathymetry().name, "gebco");
		assert_eq!(sources.terrain().name, "mapterhorn");
		assert!(sources.get("nonexistent").is_none());
	}

	#[test]
	fn terrain_sources_carry_an_encoding() {
		let sources = Sources::default();
		for source in sources.iter() {
			match source.format {
				TileFormat::Pbf => assert!(source.encoding.is_none()),
				_ => assert!(source.encoding.is_some()),
			}
		}
	}

	#[test]
	fn zoom_gating() {
		let sources = Sources::default();
		let gebco = sources.bathymetry();
		assert!(gebco.zoom_in_range(0));
		assert!(gebco.zoom_in_range(8));
		assert!(!gebco.zoom_in_range(9));
	}
}
