//! # seamap_geometry
//!
//! Encoding and decoding of compact vector tiles (the Mapbox Vector Tile
//! protobuf format): named layers of point/linestring/polygon features with
//! deduplicated string/value property tables and zigzag command-encoded
//! geometry in tile-extent space.

mod vector_tile;

pub use vector_tile::*;
