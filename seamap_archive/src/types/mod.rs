mod compression;
mod entries;
mod header;
mod tile_id;

pub use compression::ArchiveCompression;
pub use entries::{find_tile, parse_directory, serialize_directory, Entry};
pub use header::{ArchiveHeader, ArchiveTileType};
pub use tile_id::tile_id;
