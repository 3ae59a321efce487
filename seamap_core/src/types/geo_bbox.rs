use std::fmt;

/// A geographic bounding box: `(west, south, east, north)` in degrees.
#[derive(Clone, Copy, PartialEq)]
pub struct GeoBBox(pub f64, pub f64, pub f64, pub f64);

impl GeoBBox {
	pub fn as_array(&self) -> [f64; 4] {
		[self.0, self.1, self.2, self.3]
	}

	/// Formats the box as `west,south,east,north`, the shape the extraction
	/// utility's `--bbox` argument expects.
	pub fn as_bbox_arg(&self) -> String {
		format!("{},{},{},{}", self.0, self.1, self.2, self.3)
	}
}

impl fmt::Debug for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "GeoBBox({}, {}, {}, {})", self.0, self.1, self.2, self.3)
	}
}
