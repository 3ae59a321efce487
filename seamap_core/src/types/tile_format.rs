use anyhow::{bail, Result};
use std::fmt;

/// Payload format of a tile source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TileFormat {
	/// Mapbox vector tile (protobuf).
	Pbf,
	Png,
	Webp,
}

impl TileFormat {
	pub fn content_type(&self) -> &'static str {
		match self {
			TileFormat::Pbf => "application/x-protobuf",
			TileFormat::Png => "image/png",
			TileFormat::Webp => "image/webp",
		}
	}

	pub fn extension(&self) -> &'static str {
		match self {
			TileFormat::Pbf => "pbf",
			TileFormat::Png => "png",
			TileFormat::Webp => "webp",
		}
	}

	pub fn from_extension(ext: &str) -> Result<TileFormat> {
		Ok(match ext {
			"pbf" | "mvt" => TileFormat::Pbf,
			"png" => TileFormat::Png,
			"webp" => TileFormat::Webp,
			_ => bail!("unknown tile extension '{ext}'"),
		})
	}
}

impl fmt::Display for TileFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.extension())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_round_trip() {
		for format in [TileFormat::Pbf, TileFormat::Png, TileFormat::Webp] {
			assert_eq!(TileFormat::from_extension(format.extension()).unwrap(), format);
		}
		assert_eq!(TileFormat::from_extension("mvt").unwrap(), TileFormat::Pbf);
		assert!(TileFormat::from_extension("gif").is_err());
	}
}
