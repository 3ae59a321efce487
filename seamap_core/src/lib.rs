//! # seamap_core
//!
//! Shared building blocks for the seamap tile server: byte buffers and
//! ranges, tile coordinates with Web-Mercator conversions, tile formats,
//! TileJSON documents, and the positional I/O layer (local files and HTTP
//! byte ranges) that the archive reader is built on.

pub mod io;
pub mod tilejson;
mod types;

pub use types::*;
