//! The HTTP surface: thin glue between axum and the core.

mod handlers;
mod routes;

pub use routes::build_router;

use crate::SeamapCore;
use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds the listen address and serves until the task is aborted.
pub async fn serve(core: Arc<SeamapCore>) -> Result<()> {
	let address = format!("{}:{}", core.config.ip, core.config.port);
	let app = build_router(core);
	let listener = TcpListener::bind(&address)
		.await
		.with_context(|| format!("failed to bind {address}"))?;
	info!("listening on http://{address}");
	axum::serve(listener, app).await.context("server terminated")?;
	Ok(())
}
