//! Router composition. Intentionally tiny and declarative; all logic lives
//! in `handlers`.

use super::handlers;
use crate::SeamapCore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

pub fn build_router(core: Arc<SeamapCore>) -> Router {
	Router::new()
		.route("/status", get(handlers::status))
		.route("/tiles/{*path}", get(handlers::tiles))
		.route("/contours/{*path}", get(handlers::contours))
		.route("/bathymetry/{*path}", get(handlers::bathymetry))
		.route("/soundings/{*path}", get(handlers::soundings))
		.route("/composite/{*path}", get(handlers::composite))
		.route(
			"/pmtiles",
			get(handlers::list_sectors)
				.post(handlers::enqueue_sectors)
				.delete(handlers::delete_sector),
		)
		.route("/pmtiles/status", get(handlers::download_status))
		.route("/pmtiles/cancel", post(handlers::cancel_downloads))
		.route("/styles/{*path}", get(handlers::styles))
		.route("/sprites/{*path}", get(handlers::sprites))
		.route("/glyphs/{*path}", get(handlers::glyphs))
		.layer(CatchPanicLayer::new())
		.with_state(core)
}
