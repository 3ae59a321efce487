use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use seamap::config::{Cli, Config};
use seamap::{server, SeamapCore, EXTRACT_UTILITY};

#[tokio::main]
async fn main() -> Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = Config::from_cli(Cli::parse())?;
	info!("offline archives: {:?}", config.pmtiles_path);
	info!("tile cache: {:?}, derived cache: {:?}", config.tiles_path, config.derived_path);

	let core = SeamapCore::new(config).await?;
	if !core.downloads.utility_available() {
		warn!("'{EXTRACT_UTILITY}' not found on PATH; sector downloads and offline archives are disabled");
	}

	let result = server::serve(core.clone()).await;
	core.shutdown();
	result
}
