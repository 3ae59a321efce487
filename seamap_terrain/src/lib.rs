//! # seamap_terrain
//!
//! Terrain-RGB decoding and the raster-to-vector pipeline built on it:
//! height tiles with neighbor composition and resampling, marching-squares
//! isolines and isobands, and deterministic spot-depth sampling.

mod contour;
mod decode;
mod height_tile;
mod isoband;
mod soundings;

pub use contour::{clip_lines_to_extent, contour_interval, isolines};
pub use decode::{decode_height_tile, TerrainEncoding};
pub use height_tile::{DemView, HeightGrid, HeightTile, Neighborhood, SubsampledView};
pub use isoband::{isobands, Band};
pub use soundings::{soundings, Sounding};
