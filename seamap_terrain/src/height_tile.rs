//! Height tiles and the view algebra used to compose, resample and
//! materialize them.
//!
//! A [`HeightTile`] is a rectangular grid of elevations in metres (`NaN` =
//! unknown). Derived-tile generation composes the 3×3 neighborhood of a
//! tile into a virtual view, optionally upsamples it, and materializes the
//! center tile plus a margin into a [`HeightGrid`], whose indices map
//! linearly onto tile-extent coordinates.

use anyhow::{ensure, Result};

/// Read access to a pixel grid whose "core" region is the target tile.
///
/// Coordinates outside `0..core_width` / `0..core_height` are valid margin
/// reads; views clamp once they run out of backing data.
pub trait DemView {
	fn core_width(&self) -> u32;
	fn core_height(&self) -> u32;
	fn get(&self, x: i64, y: i64) -> f32;
}

/// A concrete grid of elevations.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightTile {
	width: u32,
	height: u32,
	data: Vec<f32>,
}

impl HeightTile {
	pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<HeightTile> {
		ensure!(width > 0 && height > 0, "height tile must not be empty");
		ensure!(
			data.len() == (width * height) as usize,
			"data length {} does not match {width}x{height}",
			data.len()
		);
		Ok(HeightTile { width, height, data })
	}

	/// An all-zero tile, used for off-sphere neighbors.
	pub fn zero(width: u32, height: u32) -> HeightTile {
		HeightTile {
			width,
			height,
			data: vec![0.0; (width * height) as usize],
		}
	}

	/// Builds a tile from a closure, mostly for tests and synthetic data.
	pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> HeightTile {
		let mut data = Vec::with_capacity((width * height) as usize);
		for y in 0..height {
			for x in 0..width {
				data.push(f(x, y));
			}
		}
		HeightTile { width, height, data }
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	/// Scalar sample; out-of-range coordinates clamp to the edge.
	pub fn get(&self, x: u32, y: u32) -> f32 {
		let x = x.min(self.width - 1);
		let y = y.min(self.height - 1);
		self.data[(y * self.width + x) as usize]
	}

	/// Extracts sub-region `(sx, sy)` of a `factor`×`factor` split.
	pub fn split(&self, factor: u32, sx: u32, sy: u32) -> Result<HeightTile> {
		ensure!(factor > 0 && sx < factor && sy < factor, "invalid split ({sx},{sy}) of {factor}");
		ensure!(
			self.width % factor == 0 && self.height % factor == 0,
			"tile {}x{} not divisible by {factor}",
			self.width,
			self.height
		);
		let w = self.width / factor;
		let h = self.height / factor;
		let ox = sx * w;
		let oy = sy * h;
		Ok(HeightTile::from_fn(w, h, |x, y| self.get(ox + x, oy + y)))
	}
}

impl DemView for HeightTile {
	fn core_width(&self) -> u32 {
		self.width
	}

	fn core_height(&self) -> u32 {
		self.height
	}

	fn get(&self, x: i64, y: i64) -> f32 {
		let x = x.clamp(0, i64::from(self.width) - 1) as u32;
		let y = y.clamp(0, i64::from(self.height) - 1) as u32;
		HeightTile::get(self, x, y)
	}
}

/// The 3×3 neighborhood of a tile as one virtual view.
///
/// The core is the center tile; margin reads fall into the surrounding
/// tiles, giving generators seamless data across tile edges.
pub struct Neighborhood {
	tiles: Vec<HeightTile>,
	width: u32,
	height: u32,
}

impl Neighborhood {
	/// Composes nine tiles indexed `[dy+1][dx+1]`, i.e. row-major around the
	/// center. Returns `None` if the center tile is missing; missing
	/// neighbors are replaced by all-zero tiles of the center's dimensions.
	pub fn new(mut tiles: Vec<Option<HeightTile>>) -> Result<Option<Neighborhood>> {
		ensure!(tiles.len() == 9, "a neighborhood needs exactly nine tiles");

		let Some(center) = tiles[4].take() else {
			return Ok(None);
		};
		let (width, height) = (center.width, center.height);

		let mut filled = Vec::with_capacity(9);
		for (i, slot) in tiles.into_iter().enumerate() {
			let tile = if i == 4 {
				center.clone()
			} else {
				match slot {
					Some(tile) => {
						ensure!(
							tile.width == width && tile.height == height,
							"neighbor {i} is {}x{}, center is {width}x{height}",
							tile.width,
							tile.height
						);
						tile
					}
					None => HeightTile::zero(width, height),
				}
			};
			filled.push(tile);
		}

		Ok(Some(Neighborhood {
			tiles: filled,
			width,
			height,
		}))
	}
}

impl DemView for Neighborhood {
	fn core_width(&self) -> u32 {
		self.width
	}

	fn core_height(&self) -> u32 {
		self.height
	}

	fn get(&self, x: i64, y: i64) -> f32 {
		let w = i64::from(self.width);
		let h = i64::from(self.height);
		let x = (x + w).clamp(0, 3 * w - 1);
		let y = (y + h).clamp(0, 3 * h - 1);
		let tile = &self.tiles[(y / h * 3 + x / w) as usize];
		tile.get((x % w) as u32, (y % h) as u32)
	}
}

/// Linear 1→n upsampling of pixel centers.
pub struct SubsampledView {
	inner: Box<dyn DemView>,
	factor: u32,
}

impl SubsampledView {
	pub fn new(inner: Box<dyn DemView>, factor: u32) -> SubsampledView {
		SubsampledView { inner, factor }
	}
}

impl DemView for SubsampledView {
	fn core_width(&self) -> u32 {
		self.inner.core_width() * self.factor
	}

	fn core_height(&self) -> u32 {
		self.inner.core_height() * self.factor
	}

	fn get(&self, x: i64, y: i64) -> f32 {
		let f = f64::from(self.factor);
		// position of this pixel center in inner pixel-center space
		let u = (x as f64 + 0.5) / f - 0.5;
		let v = (y as f64 + 0.5) / f - 0.5;
		let x0 = u.floor();
		let y0 = v.floor();
		let fx = (u - x0) as f32;
		let fy = (v - y0) as f32;
		let x0 = x0 as i64;
		let y0 = y0 as i64;

		let v00 = self.inner.get(x0, y0);
		let v10 = self.inner.get(x0 + 1, y0);
		let v01 = self.inner.get(x0, y0 + 1);
		let v11 = self.inner.get(x0 + 1, y0 + 1);

		let top = v00 * (1.0 - fx) + v10 * fx;
		let bottom = v01 * (1.0 - fx) + v11 * fx;
		top * (1.0 - fy) + bottom * fy
	}
}

/// A materialized grid: the core region of a view plus a fixed margin.
///
/// Index `(gx, gy)` covers core coordinate `(gx - margin, gy - margin)`. A
/// pixel-centered grid sample sits at position `index - margin + 0.5` in
/// core pixel units; after [`HeightGrid::average_to_corners`] samples sit on
/// integer positions (pixel boundaries), which is what the isoline and
/// isoband generators expect.
#[derive(Clone, Debug)]
pub struct HeightGrid {
	pub width: u32,
	pub height: u32,
	pub margin: u32,
	pub core_width: u32,
	pub core_height: u32,
	data: Vec<f32>,
}

impl HeightGrid {
	/// Forces `view` into a concrete grid with a `margin`-pixel border.
	pub fn from_view(view: &dyn DemView, margin: u32) -> HeightGrid {
		let core_width = view.core_width();
		let core_height = view.core_height();
		let width = core_width + 2 * margin;
		let height = core_height + 2 * margin;

		let mut data = Vec::with_capacity((width * height) as usize);
		let m = i64::from(margin);
		for gy in 0..height {
			for gx in 0..width {
				data.push(view.get(i64::from(gx) - m, i64::from(gy) - m));
			}
		}

		HeightGrid {
			width,
			height,
			margin,
			core_width,
			core_height,
			data,
		}
	}

	/// Raw sample by grid index, clamped to the grid.
	pub fn get(&self, gx: i64, gy: i64) -> f32 {
		let gx = gx.clamp(0, i64::from(self.width) - 1) as u32;
		let gy = gy.clamp(0, i64::from(self.height) - 1) as u32;
		self.data[(gy * self.width + gx) as usize]
	}

	/// Shifts pixel-centered samples onto grid corners: each corner becomes
	/// the mean of its up to four adjacent pixels. The result has one more
	/// sample per axis; `NaN` pixels poison adjacent corners.
	pub fn average_to_corners(&self) -> HeightGrid {
		let width = self.width + 1;
		let height = self.height + 1;
		let mut data = Vec::with_capacity((width * height) as usize);

		for gy in 0..height {
			for gx in 0..width {
				let x = i64::from(gx);
				let y = i64::from(gy);
				let sum = self.get(x - 1, y - 1) + self.get(x, y - 1) + self.get(x - 1, y) + self.get(x, y);
				data.push(sum / 4.0);
			}
		}

		HeightGrid {
			width,
			height,
			margin: self.margin,
			core_width: self.core_width,
			core_height: self.core_height,
			data,
		}
	}

	/// Minimum and maximum finite value, or `None` when everything is
	/// unknown.
	pub fn value_range(&self) -> Option<(f32, f32)> {
		let mut range: Option<(f32, f32)> = None;
		for value in &self.data {
			if value.is_nan() {
				continue;
			}
			range = Some(match range {
				Some((min, max)) => (min.min(*value), max.max(*value)),
				None => (*value, *value),
			});
		}
		range
	}

	/// Maps a corner-grid index to tile-extent coordinates.
	pub fn corner_to_extent(&self, gx: f64, gy: f64, extent: u32) -> [f64; 2] {
		let scale = f64::from(extent) / f64::from(self.core_width);
		[
			(gx - f64::from(self.margin)) * scale,
			(gy - f64::from(self.margin)) * scale,
		]
	}

	/// Maps tile-extent coordinates to the nearest pixel-grid index.
	pub fn extent_to_pixel(&self, x: f64, y: f64, extent: u32) -> (i64, i64) {
		let scale = f64::from(self.core_width) / f64::from(extent);
		(
			(x * scale - 0.5 + f64::from(self.margin)).round() as i64,
			(y * scale - 0.5 + f64::from(self.margin)).round() as i64,
		)
	}
}
