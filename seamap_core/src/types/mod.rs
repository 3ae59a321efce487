mod blob;
mod byte_range;
mod geo_bbox;
mod tile_coord;
mod tile_format;

pub use blob::Blob;
pub use byte_range::ByteRange;
pub use geo_bbox::GeoBBox;
pub use tile_coord::TileCoord;
pub use tile_format::TileFormat;
