//! Decoding terrain-RGB raster tiles into height tiles.

use crate::HeightTile;
use anyhow::{bail, Context, Result};
use seamap_core::Blob;

/// The two common terrain-RGB variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerrainEncoding {
	/// `elevation = R*256 + G + B/256 - 32768`
	Terrarium,
	/// `elevation = -10000 + (R*65536 + G*256 + B) * 0.1`
	Mapbox,
}

impl TerrainEncoding {
	pub fn from_name(name: &str) -> Result<TerrainEncoding> {
		Ok(match name {
			"terrarium" => TerrainEncoding::Terrarium,
			"mapbox" => TerrainEncoding::Mapbox,
			_ => bail!("unknown terrain encoding '{name}'"),
		})
	}

	fn elevation(&self, r: u8, g: u8, b: u8) -> f32 {
		match self {
			TerrainEncoding::Terrarium => {
				f32::from(r) * 256.0 + f32::from(g) + f32::from(b) / 256.0 - 32768.0
			}
			TerrainEncoding::Mapbox => {
				-10000.0 + (f32::from(r) * 65536.0 + f32::from(g) * 256.0 + f32::from(b)) * 0.1
			}
		}
	}
}

/// Decodes a PNG or WebP terrain tile into elevations in metres.
///
/// Fully transparent pixels decode to `NaN` (unknown).
pub fn decode_height_tile(bytes: &Blob, encoding: TerrainEncoding) -> Result<HeightTile> {
	let image = image::load_from_memory(bytes.as_slice()).context("failed to decode terrain raster")?;
	let rgba = image.to_rgba8();
	let (width, height) = rgba.dimensions();

	let mut data = Vec::with_capacity((width * height) as usize);
	for pixel in rgba.pixels() {
		let [r, g, b, a] = pixel.0;
		if a == 0 {
			data.push(f32::NAN);
		} else {
			data.push(encoding.elevation(r, g, b));
		}
	}

	HeightTile::new(width, height, data)
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{ImageBuffer, Rgba};
	use std::io::Cursor;

	fn encode_png(pixels: &[(u8, u8, u8, u8)], width: u32) -> Blob {
		let height = pixels.len() as u32 / width;
		let mut raw = Vec::new();
		for (r, g, b, a) in pixels {
			raw.extend_from_slice(&[*r, *g, *b, *a]);
		}
		let image = ImageBuffer::<Rgba<u8>, _>::from_vec(width, height, raw).unwrap();
		let mut bytes = Cursor::new(Vec::new());
		image::DynamicImage::ImageRgba8(image)
			.write_to(&mut bytes, image::ImageFormat::Png)
			.unwrap();
		Blob::from(bytes.into_inner())
	}

	#[test]
	fn terrarium_formula() -> Result<()> {
		// sea level is (128, 0, 0); 1 metre below is (127, 255, 0)
		let blob = encode_png(&[(128, 0, 0, 255), (127, 255, 0, 255)], 2);
		let tile = decode_height_tile(&blob, TerrainEncoding::Terrarium)?;
		assert_eq!(tile.get(0, 0), 0.0);
		assert_eq!(tile.get(1, 0), -1.0);
		Ok(())
	}

	#[test]
	fn mapbox_formula() -> Result<()> {
		// (1, 134, 160) is 100000 raw units: -10000 + 100000 * 0.1 = 0 m
		let blob = encode_png(&[(1, 134, 160, 255)], 1);
		let tile = decode_height_tile(&blob, TerrainEncoding::Mapbox)?;
		assert!((tile.get(0, 0) - 0.0).abs() < 0.05);
		Ok(())
	}

	#[test]
	fn transparent_pixels_are_unknown() -> Result<()> {
		let blob = encode_png(&[(0, 0, 0, 0)], 1);
		let tile = decode_height_tile(&blob, TerrainEncoding::Terrarium)?;
		assert!(tile.get(0, 0).is_nan());
		Ok(())
	}

	#[test]
	fn encoding_names() {
		assert_eq!(TerrainEncoding::from_name("terrarium").unwrap(), TerrainEncoding::Terrarium);
		assert_eq!(TerrainEncoding::from_name("mapbox").unwrap(), TerrainEncoding::Mapbox);
		assert!(TerrainEncoding::from_name("none").is_err());
	}

	#[test]
	fn garbage_bytes_fail() {
		assert!(decode_height_tile(&Blob::from("not an image"), TerrainEncoding::Terrarium).is_err());
	}
}
