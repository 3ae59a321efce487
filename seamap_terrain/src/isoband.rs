//! Marching-squares band mode: filled regions between successive levels.
//!
//! Each cell contributes the part of its square lying inside the band
//! `[lower, upper)`, clipped with linear interpolation along edges. Edges
//! shared by two cells cancel, the surviving directed edges stitch into
//! closed rings: outer rings end up with negative signed area (clockwise in
//! tile coordinates, y pointing down), holes positive.

use crate::HeightGrid;
use std::collections::HashMap;

/// One band with its assembled polygons and the rings classified as the
/// band's deeper boundary (used for depth-contour label lines).
///
/// Coordinates are corner-grid indices, like the isoline output.
pub struct Band {
	pub lower: f64,
	pub upper: f64,
	/// Each polygon is its outer ring followed by its holes.
	pub polygons: Vec<Vec<Vec<[f64; 2]>>>,
	pub label_lines: Vec<Vec<[f64; 2]>>,
}

/// Computes isobands for every consecutive pair of `levels` (ascending).
pub fn isobands(grid: &HeightGrid, levels: &[f64]) -> Vec<Band> {
	levels
		.windows(2)
		.map(|pair| band(grid, pair[0], pair[1]))
		.collect()
}

fn band(grid: &HeightGrid, lower: f64, upper: f64) -> Band {
	let mut edges = EdgeSet::new();

	for cy in 0..i64::from(grid.height) - 1 {
		for cx in 0..i64::from(grid.width) - 1 {
			let x = cx as f64;
			let y = cy as f64;
			// counterclockwise in y-down coordinates, so that surviving
			// outer boundaries come out with negative signed area
			let cell = [
				([x, y], f64::from(grid.get(cx, cy))),
				([x, y + 1.0], f64::from(grid.get(cx, cy + 1))),
				([x + 1.0, y + 1.0], f64::from(grid.get(cx + 1, cy + 1))),
				([x + 1.0, y], f64::from(grid.get(cx + 1, cy))),
			];
			if cell.iter().any(|(_, v)| v.is_nan()) {
				continue;
			}

			let fragment = clip(&cell, lower, upper);
			if fragment.len() < 3 {
				continue;
			}
			for i in 0..fragment.len() {
				edges.add(fragment[i], fragment[(i + 1) % fragment.len()]);
			}
		}
	}

	let rings = edges.into_rings();

	// partition by signed area and assign holes to their outer rings
	let mut outers: Vec<(Vec<[f64; 2]>, f64)> = Vec::new();
	let mut holes: Vec<Vec<[f64; 2]>> = Vec::new();
	for ring in &rings {
		let area = signed_area(ring);
		if area < 0.0 {
			outers.push((ring.clone(), area));
		} else if area > 0.0 {
			holes.push(ring.clone());
		}
	}

	let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = outers.iter().map(|(ring, _)| vec![ring.clone()]).collect();
	for hole in holes {
		// smallest containing outer ring wins
		let mut best: Option<(usize, f64)> = None;
		for (i, (ring, area)) in outers.iter().enumerate() {
			if point_in_ring(hole[0], ring) {
				let size = area.abs();
				if best.is_none_or(|(_, best_size)| size < best_size) {
					best = Some((i, size));
				}
			}
		}
		if let Some((i, _)) = best {
			polygons[i].push(hole);
		}
	}

	// rings whose sampled elevation sits nearer the lower level bound the
	// deeper side of the band
	let mut label_lines = Vec::new();
	for ring in rings {
		let [x, y] = ring[0];
		let sample = f64::from(grid.get(x.round() as i64, y.round() as i64));
		if !sample.is_finite() {
			continue;
		}
		if (sample - lower).abs() < (sample - upper).abs() {
			label_lines.push(ring);
		}
	}

	Band {
		lower,
		upper,
		polygons,
		label_lines,
	}
}

/// Clips a cell polygon to `lower <= v < upper`, interpolating positions
/// along edges.
fn clip(cell: &[([f64; 2], f64); 4], lower: f64, upper: f64) -> Vec<([f64; 2], f64)> {
	let stage1 = clip_half(&cell.to_vec(), lower, true);
	clip_half(&stage1, upper, false)
}

fn clip_half(points: &[([f64; 2], f64)], level: f64, keep_above: bool) -> Vec<([f64; 2], f64)> {
	let inside = |v: f64| if keep_above { v >= level } else { v < level };
	let mut result = Vec::with_capacity(points.len() + 2);

	for i in 0..points.len() {
		let (p, pv) = points[i];
		let (q, qv) = points[(i + 1) % points.len()];
		if inside(pv) {
			result.push((p, pv));
		}
		if inside(pv) != inside(qv) {
			let t = (level - pv) / (qv - pv);
			result.push(([p[0] + t * (q[0] - p[0]), p[1] + t * (q[1] - p[1])], level));
		}
	}

	result
}

fn quantize(p: [f64; 2]) -> (i64, i64) {
	((p[0] * 256.0).round() as i64, (p[1] * 256.0).round() as i64)
}

/// Directed edges with cancellation of opposite pairs.
struct EdgeSet {
	edges: HashMap<((i64, i64), (i64, i64)), ([f64; 2], [f64; 2])>,
}

impl EdgeSet {
	fn new() -> EdgeSet {
		EdgeSet { edges: HashMap::new() }
	}

	fn add(&mut self, from: ([f64; 2], f64), to: ([f64; 2], f64)) {
		let a = quantize(from.0);
		let b = quantize(to.0);
		if a == b {
			return;
		}
		// an interior edge is added once per side, in opposite directions
		if self.edges.remove(&(b, a)).is_some() {
			return;
		}
		self.edges.insert((a, b), (from.0, to.0));
	}

	/// Walks the surviving edges into closed rings.
	fn into_rings(self) -> Vec<Vec<[f64; 2]>> {
		let mut outgoing: HashMap<(i64, i64), Vec<((i64, i64), [f64; 2], [f64; 2])>> = HashMap::new();
		for ((a, b), (pa, pb)) in self.edges {
			outgoing.entry(a).or_default().push((b, pa, pb));
		}

		let mut rings = Vec::new();
		while let Some(&start_key) = outgoing.keys().next() {
			let mut ring: Vec<[f64; 2]> = Vec::new();
			let mut key = start_key;

			loop {
				let Some(candidates) = outgoing.get_mut(&key) else {
					break;
				};
				let (next_key, pa, pb) = candidates.pop().unwrap();
				if candidates.is_empty() {
					outgoing.remove(&key);
				}
				if ring.is_empty() {
					ring.push(pa);
				}
				ring.push(pb);
				key = next_key;
				if key == start_key {
					break;
				}
			}

			// a walk that did not return to its start is a broken boundary
			if ring.len() >= 4 && key == start_key {
				// the closing point is quantize-equal to the first; snap it
				// so rings are exactly closed
				*ring.last_mut().unwrap() = ring[0];
				rings.push(ring);
			}
		}

		rings
	}
}

/// Shoelace formula; y grows downward, so visually-clockwise rings come out
/// negative.
pub(crate) fn signed_area(ring: &[[f64; 2]]) -> f64 {
	let mut sum = 0.0;
	for i in 0..ring.len() {
		let [x1, y1] = ring[i];
		let [x2, y2] = ring[(i + 1) % ring.len()];
		sum += x1 * y2 - x2 * y1;
	}
	sum / 2.0
}

/// Ray-casting point-in-ring test.
pub(crate) fn point_in_ring(point: [f64; 2], ring: &[[f64; 2]]) -> bool {
	let [px, py] = point;
	let mut inside = false;
	for i in 0..ring.len() {
		let [x1, y1] = ring[i];
		let [x2, y2] = ring[(i + 1) % ring.len()];
		if (y1 > py) != (y2 > py) {
			let cross_x = x1 + (py - y1) / (y2 - y1) * (x2 - x1);
			if px < cross_x {
				inside = !inside;
			}
		}
	}
	inside
}
