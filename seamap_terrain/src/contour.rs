//! Marching-squares isolines over a corner grid.

use crate::HeightGrid;
use std::collections::HashMap;

/// Contour interval in metres for land elevations at a given zoom.
pub fn contour_interval(z: u8) -> f64 {
	match z {
		14.. => 10.0,
		13 => 20.0,
		12 => 50.0,
		10 | 11 => 100.0,
		8 | 9 => 200.0,
		_ => 500.0,
	}
}

#[derive(Clone, Copy)]
enum Edge {
	Top,
	Right,
	Bottom,
	Left,
}

/// Computes the isolines of `grid` at each of `levels`.
///
/// Coordinates are corner-grid indices; use
/// [`HeightGrid::corner_to_extent`] to map them into tile space. Cells
/// touching a `NaN` corner are skipped, which simply truncates lines at the
/// edge of known data.
pub fn isolines(grid: &HeightGrid, levels: &[f64]) -> Vec<(f64, Vec<Vec<[f64; 2]>>)> {
	levels.iter().map(|&level| (level, isolines_at(grid, level))).collect()
}

fn isolines_at(grid: &HeightGrid, level: f64) -> Vec<Vec<[f64; 2]>> {
	let mut segments: Vec<([f64; 2], [f64; 2])> = Vec::new();

	for cy in 0..i64::from(grid.height) - 1 {
		for cx in 0..i64::from(grid.width) - 1 {
			let tl = adjust(f64::from(grid.get(cx, cy)), level);
			let tr = adjust(f64::from(grid.get(cx + 1, cy)), level);
			let br = adjust(f64::from(grid.get(cx + 1, cy + 1)), level);
			let bl = adjust(f64::from(grid.get(cx, cy + 1)), level);
			if tl.is_nan() || tr.is_nan() || br.is_nan() || bl.is_nan() {
				continue;
			}

			let mut case = 0u8;
			if tl >= level {
				case |= 1;
			}
			if tr >= level {
				case |= 2;
			}
			if br >= level {
				case |= 4;
			}
			if bl >= level {
				case |= 8;
			}

			let point = |edge: Edge| -> [f64; 2] {
				let x = cx as f64;
				let y = cy as f64;
				match edge {
					Edge::Top => [x + cross(tl, tr, level), y],
					Edge::Right => [x + 1.0, y + cross(tr, br, level)],
					Edge::Bottom => [x + cross(bl, br, level), y + 1.0],
					Edge::Left => [x, y + cross(tl, bl, level)],
				}
			};
			let mut emit = |a: Edge, b: Edge| segments.push((point(a), point(b)));

			use Edge::*;
			match case {
				0 | 15 => {}
				1 => emit(Left, Top),
				2 => emit(Top, Right),
				3 => emit(Left, Right),
				4 => emit(Right, Bottom),
				6 => emit(Top, Bottom),
				7 => emit(Left, Bottom),
				8 => emit(Bottom, Left),
				9 => emit(Top, Bottom),
				11 => emit(Right, Bottom),
				12 => emit(Right, Left),
				13 => emit(Top, Right),
				14 => emit(Left, Top),
				5 | 10 => {
					// saddle: resolve by the cell-center mean
					let center = (tl + tr + br + bl) / 4.0;
					let high_center = center >= level;
					if (case == 5) == high_center {
						emit(Top, Right);
						emit(Bottom, Left);
					} else {
						emit(Left, Top);
						emit(Right, Bottom);
					}
				}
				16.. => unreachable!(),
			}
		}
	}

	stitch(segments)
}

/// Nudges values lying exactly on the level so every crossing is strict.
fn adjust(value: f64, level: f64) -> f64 {
	if value == level {
		level + 1e-9
	} else {
		value
	}
}

/// Position in `[0,1]` where the value crosses `level` between two corners.
fn cross(a: f64, b: f64, level: f64) -> f64 {
	((level - a) / (b - a)).clamp(0.0, 1.0)
}

fn quantize(p: [f64; 2]) -> (i64, i64) {
	((p[0] * 256.0).round() as i64, (p[1] * 256.0).round() as i64)
}

/// Joins segments into polylines by matching endpoints.
pub(crate) fn stitch(segments: Vec<([f64; 2], [f64; 2])>) -> Vec<Vec<[f64; 2]>> {
	let segments: Vec<([f64; 2], [f64; 2])> = segments
		.into_iter()
		.filter(|(a, b)| quantize(*a) != quantize(*b))
		.collect();

	// endpoint -> indices of segments touching it
	let mut adjacency: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
	for (i, (a, b)) in segments.iter().enumerate() {
		adjacency.entry(quantize(*a)).or_default().push(i);
		adjacency.entry(quantize(*b)).or_default().push(i);
	}

	let mut used = vec![false; segments.len()];
	let mut lines = Vec::new();

	for start in 0..segments.len() {
		if used[start] {
			continue;
		}
		used[start] = true;
		let (a, b) = segments[start];
		let mut line: std::collections::VecDeque<[f64; 2]> = [a, b].into_iter().collect();

		// grow at both ends until no unused segment continues the line
		for front in [false, true] {
			loop {
				let tip = if front { line.front() } else { line.back() };
				let tip_key = quantize(*tip.unwrap());
				let next = adjacency
					.get(&tip_key)
					.and_then(|candidates| candidates.iter().find(|&&i| !used[i]).copied());
				let Some(i) = next else {
					break;
				};
				used[i] = true;
				let (a, b) = segments[i];
				let point = if quantize(a) == tip_key { b } else { a };
				if front {
					line.push_front(point);
				} else {
					line.push_back(point);
				}
			}
		}

		lines.push(line.into_iter().collect());
	}

	lines
}

/// Splits lines at the tile boundary, keeping runs of interior points.
///
/// Runs shorter than two points are dropped.
pub fn clip_lines_to_extent(lines: Vec<Vec<[f64; 2]>>, extent: u32) -> Vec<Vec<[f64; 2]>> {
	let max = f64::from(extent);
	let mut result = Vec::new();

	for line in lines {
		let mut run: Vec<[f64; 2]> = Vec::new();
		for point in line {
			if point[0] >= 0.0 && point[0] <= max && point[1] >= 0.0 && point[1] <= max {
				run.push(point);
			} else if run.len() >= 2 {
				result.push(std::mem::take(&mut run));
			} else {
				run.clear();
			}
		}
		if run.len() >= 2 {
			result.push(run);
		}
	}

	result
}
