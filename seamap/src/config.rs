//! Binary configuration: the four data paths, the bathymetry levels and the
//! listen address.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "seamap", about = "Offline-first tile server for marine navigation")]
pub struct Cli {
	/// Root directory of offline sector archives.
	#[arg(long, default_value = "data/pmtiles")]
	pub pmtiles_path: PathBuf,

	/// Directory with styles, sprites and glyphs.
	#[arg(long, default_value = "data/styles")]
	pub styles_path: PathBuf,

	/// Cache directory for upstream tiles.
	#[arg(long, default_value = "data/tiles")]
	pub tiles_path: PathBuf,

	/// Cache directory for derived tiles.
	#[arg(long, default_value = "data/derived")]
	pub derived_path: PathBuf,

	/// Bathymetry depth levels in metres, comma-separated.
	#[arg(long, default_value = "2,5,10,20,50")]
	pub depths: String,

	#[arg(long, default_value = "0.0.0.0")]
	pub ip: String,

	#[arg(long, default_value_t = 8080)]
	pub port: u16,
}

/// Resolved configuration handed to the core.
#[derive(Clone, Debug)]
pub struct Config {
	pub pmtiles_path: PathBuf,
	pub styles_path: PathBuf,
	pub tiles_path: PathBuf,
	pub derived_path: PathBuf,
	/// Depth levels in metres, positive, ascending.
	pub depths: Vec<f64>,
	pub ip: String,
	pub port: u16,
}

impl Config {
	pub fn from_cli(cli: Cli) -> Result<Config> {
		Ok(Config {
			pmtiles_path: cli.pmtiles_path,
			styles_path: cli.styles_path,
			tiles_path: cli.tiles_path,
			derived_path: cli.derived_path,
			depths: parse_depths(&cli.depths)?,
			ip: cli.ip,
			port: cli.port,
		})
	}
}

/// Parses `"2,5,10,20,50"` into ascending positive depths.
pub fn parse_depths(value: &str) -> Result<Vec<f64>> {
	let mut depths = Vec::new();
	for part in value.split(',') {
		let depth: f64 = part
			.trim()
			.parse()
			.with_context(|| format!("invalid depth level '{part}'"))?;
		ensure!(depth.is_finite() && depth > 0.0, "depth levels must be positive, got '{part}'");
		depths.push(depth);
	}
	ensure!(!depths.is_empty(), "at least one depth level is required");
	depths.sort_by(f64::total_cmp);
	depths.dedup();
	Ok(depths)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_default_depths() -> Result<()> {
		assert_eq!(parse_depths("2,5,10,20,50")?, vec![2.0, 5.0, 10.0, 20.0, 50.0]);
		Ok(())
	}

	#[test]
	fn sorts_and_dedupes() -> Result<()> {
		assert_eq!(parse_depths("10, 2, 5, 10")?, vec![2.0, 5.0, 10.0]);
		Ok(())
	}

	#[test]
	fn rejects_garbage() {
		assert!(parse_depths("").is_err());
		assert!(parse_depths("2,five").is_err());
		assert!(parse_depths("-5").is_err());
		assert!(parse_depths("0").is_err());
	}
}
