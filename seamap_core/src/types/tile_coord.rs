//! XYZ tile coordinates (`z`, `x`, `y`, with `y = 0` at the north edge) and
//! their Web-Mercator conversions.
//!
//! Zoom 6 tiles ("sectors") are the unit of offline storage: every coordinate
//! at `z >= 6` reduces to the zoom-6 ancestor that contains it.

use crate::GeoBBox;
use anyhow::{bail, ensure, Result};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// The zoom level used as the unit of offline storage.
pub const SECTOR_ZOOM: u8 = 6;

#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TileCoord {
	pub x: u32,
	pub y: u32,
	pub z: u8,
}

impl TileCoord {
	pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= 30, "zoom level ({z}) must be <= 30");
		ensure!(x < (1 << z), "x ({x}) must be < 2^{z}");
		ensure!(y < (1 << z), "y ({y}) must be < 2^{z}");
		Ok(TileCoord { x, y, z })
	}

	/// Number of tiles along one axis at this zoom level.
	pub fn max_index(&self) -> u32 {
		1 << self.z
	}

	/// Geographic bounds `[west, south, east, north]` of this tile.
	pub fn as_geo_bbox(&self) -> GeoBBox {
		let size = f64::from(1u32 << self.z);

		let lon = |x: f64| x / size * 360.0 - 180.0;
		let lat = |y: f64| (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();

		GeoBBox(
			lon(f64::from(self.x)),
			lat(f64::from(self.y + 1)),
			lon(f64::from(self.x + 1)),
			lat(f64::from(self.y)),
		)
	}

	/// The zoom-6 ancestor containing this tile, or `None` below sector zoom.
	pub fn sector(&self) -> Option<TileCoord> {
		if self.z < SECTOR_ZOOM {
			return None;
		}
		let shift = self.z - SECTOR_ZOOM;
		Some(TileCoord {
			x: self.x >> shift,
			y: self.y >> shift,
			z: SECTOR_ZOOM,
		})
	}

	/// Directory name of this tile when used as a sector, e.g. `6_34_22`.
	pub fn sector_dir_name(&self) -> String {
		format!("{}_{}_{}", self.z, self.x, self.y)
	}

	/// This coordinate scaled to `z`, truncating when scaling down.
	pub fn at_zoom(&self, z: u8) -> TileCoord {
		if z > self.z {
			let shift = z - self.z;
			TileCoord {
				x: self.x << shift,
				y: self.y << shift,
				z,
			}
		} else {
			let shift = self.z - z;
			TileCoord {
				x: self.x >> shift,
				y: self.y >> shift,
				z,
			}
		}
	}

	/// Neighbor at `(dx, dy)`. X wraps around the date line; a Y outside the
	/// sphere yields `None`.
	pub fn neighbor(&self, dx: i32, dy: i32) -> Option<TileCoord> {
		let max = self.max_index() as i64;
		let x = (i64::from(self.x) + i64::from(dx)).rem_euclid(max);
		let y = i64::from(self.y) + i64::from(dy);
		if y < 0 || y >= max {
			return None;
		}
		Some(TileCoord {
			x: x as u32,
			y: y as u32,
			z: self.z,
		})
	}
}

impl FromStr for TileCoord {
	type Err = anyhow::Error;

	/// Parses a `z/x/y` identifier. Used for sector ids in the download API.
	fn from_str(value: &str) -> Result<TileCoord> {
		let parts: Vec<&str> = value.split('/').collect();
		if parts.len() != 3 {
			bail!("invalid tile identifier '{value}': expected 'z/x/y'");
		}
		let z: u8 = parts[0].parse().map_err(|_| anyhow::anyhow!("invalid zoom in '{value}'"))?;
		let x: u32 = parts[1].parse().map_err(|_| anyhow::anyhow!("invalid x in '{value}'"))?;
		let y: u32 = parts[2].parse().map_err(|_| anyhow::anyhow!("invalid y in '{value}'"))?;
		TileCoord::new(z, x, y)
	}
}

impl fmt::Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.z, self.x, self.y)
	}
}

impl fmt::Display for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.z, self.x, self.y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn new_checks_bounds() {
		assert!(TileCoord::new(6, 63, 63).is_ok());
		assert!(TileCoord::new(6, 64, 0).is_err());
		assert!(TileCoord::new(31, 0, 0).is_err());
	}

	#[rstest]
	#[case(6, 34, 22, 6, 34, 22)]
	#[case(7, 68, 44, 6, 34, 22)]
	#[case(14, 8888, 5678, 6, 34, 22)]
	#[case(10, 500, 300, 6, 31, 18)]
	fn sector_reduction(
		#[case] z: u8,
		#[case] x: u32,
		#[case] y: u32,
		#[case] sz: u8,
		#[case] sx: u32,
		#[case] sy: u32,
	) {
		let sector = TileCoord::new(z, x, y).unwrap().sector().unwrap();
		assert_eq!(sector, TileCoord::new(sz, sx, sy).unwrap());
		// direct computation, per definition
		assert_eq!(sector.x, x / (1 << (z - 6)));
		assert_eq!(sector.y, y / (1 << (z - 6)));
		// reduction is idempotent
		assert_eq!(sector.sector().unwrap(), sector);
	}

	#[test]
	fn sector_undefined_below_zoom_6() {
		assert!(TileCoord::new(5, 1, 1).unwrap().sector().is_none());
	}

	#[test]
	fn geo_bbox_is_mercator_inverse() {
		let bbox = TileCoord::new(0, 0, 0).unwrap().as_geo_bbox();
		assert!((bbox.0 - -180.0).abs() < 1e-9);
		assert!((bbox.2 - 180.0).abs() < 1e-9);
		assert!((bbox.3 - 85.0511287798).abs() < 1e-6);
		assert!((bbox.1 + 85.0511287798).abs() < 1e-6);

		let bbox = TileCoord::new(6, 34, 22).unwrap().as_geo_bbox();
		assert!(bbox.0 < bbox.2, "west < east");
		assert!(bbox.1 < bbox.3, "south < north");
		assert!((bbox.0 - 11.25).abs() < 1e-9);
		assert!((bbox.2 - 16.875).abs() < 1e-9);
	}

	#[test]
	fn geo_bbox_tiles_are_contiguous() {
		let a = TileCoord::new(8, 132, 88).unwrap().as_geo_bbox();
		let b = TileCoord::new(8, 133, 88).unwrap().as_geo_bbox();
		let c = TileCoord::new(8, 132, 89).unwrap().as_geo_bbox();
		assert!((a.2 - b.0).abs() < 1e-12, "east edge meets west edge");
		assert!((a.1 - c.3).abs() < 1e-12, "south edge meets north edge");
	}

	#[test]
	fn neighbor_wraps_x_but_not_y() {
		let coord = TileCoord::new(4, 0, 0).unwrap();
		assert_eq!(coord.neighbor(-1, 0).unwrap(), TileCoord::new(4, 15, 0).unwrap());
		assert_eq!(coord.neighbor(0, 1).unwrap(), TileCoord::new(4, 0, 1).unwrap());
		assert!(coord.neighbor(0, -1).is_none());
		let south = TileCoord::new(4, 3, 15).unwrap();
		assert!(south.neighbor(0, 1).is_none());
	}

	#[test]
	fn parse_sector_ids() {
		assert_eq!("6/34/22".parse::<TileCoord>().unwrap(), TileCoord::new(6, 34, 22).unwrap());
		assert!("6/34".parse::<TileCoord>().is_err());
		assert!("6/34/22/1".parse::<TileCoord>().is_err());
		assert!("a/b/c".parse::<TileCoord>().is_err());
		assert!("6/-1/22".parse::<TileCoord>().is_err());
		assert!("../../etc".parse::<TileCoord>().is_err());
	}

	#[test]
	fn at_zoom_scales_both_ways() {
		let coord = TileCoord::new(8, 132, 88).unwrap();
		assert_eq!(coord.at_zoom(7), TileCoord::new(7, 66, 44).unwrap());
		assert_eq!(coord.at_zoom(9), TileCoord::new(9, 264, 176).unwrap());
	}
}
