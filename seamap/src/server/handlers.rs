//! Concrete HTTP handlers and response helpers.
//!
//! Outcome mapping happens here and nowhere else: absent data becomes 204,
//! unknown sources 404, malformed requests 400, path traversal 403, a
//! missing extraction utility 503.

use crate::cache::TileKind;
use crate::sources::SourceDef;
use crate::SeamapCore;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use log::{debug, warn};
use seamap_core::tilejson::TileJson;
use seamap_core::{TileCoord, TileFormat};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const CACHE_TILES: &str = "public, max-age=86400";
const CACHE_TILEJSON: &str = "public, max-age=3600";
const CACHE_STYLES: &str = "public, max-age=3600";
const CACHE_ASSETS: &str = "public, max-age=86400";

// --- small response helpers --------------------------------------------------

fn bytes_response(content_type: &str, cache_control: &str, body: Vec<u8>, gzip: bool) -> Response<Body> {
	let mut builder = Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, content_type)
		.header(header::CACHE_CONTROL, cache_control);
	if gzip {
		builder = builder.header(header::CONTENT_ENCODING, "gzip");
	}
	builder.body(Body::from(body)).expect("failed to build response")
}

fn json_response<T: Serialize>(cache_control: Option<&str>, value: &T) -> Response<Body> {
	let body = serde_json::to_vec(value).expect("failed to serialize response");
	let mut builder = Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, "application/json");
	if let Some(cache_control) = cache_control {
		builder = builder.header(header::CACHE_CONTROL, cache_control);
	}
	builder.body(Body::from(body)).expect("failed to build response")
}

fn empty_response() -> Response<Body> {
	Response::builder()
		.status(StatusCode::NO_CONTENT)
		.body(Body::empty())
		.expect("failed to build response")
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
	Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
		.body(Body::from(message.to_string()))
		.expect("failed to build response")
}

// --- path parsing ------------------------------------------------------------

enum TilePath {
	TileJson(String),
	Tile { source: String, coord: TileCoord, ext: String },
}

fn parse_tile_path(path: &str) -> Result<TilePath, &'static str> {
	let parts: Vec<&str> = path.split('/').collect();
	match parts.as_slice() {
		[doc] => {
			let name = doc.strip_suffix(".json").ok_or("expected '{source}.json'")?;
			if name.is_empty() {
				return Err("empty source name");
			}
			Ok(TilePath::TileJson(name.to_string()))
		}
		[source, z, x, y_ext] => {
			let (y, ext) = y_ext.rsplit_once('.').ok_or("missing tile extension")?;
			let z: u8 = z.parse().map_err(|_| "invalid zoom")?;
			let x: u32 = x.parse().map_err(|_| "invalid x")?;
			let y: u32 = y.parse().map_err(|_| "invalid y")?;
			let coord = TileCoord::new(z, x, y).map_err(|_| "coordinates out of range")?;
			Ok(TilePath::Tile {
				source: (*source).to_string(),
				coord,
				ext: ext.to_string(),
			})
		}
		_ => Err("expected '{source}.json' or '{source}/{z}/{x}/{y}.{ext}'"),
	}
}

fn is_traversal(id: &str) -> bool {
	id.contains("..") || id.starts_with('/') || id.contains('\\')
}

/// Rejects static-asset paths with empty, dot or parent segments.
fn sanitize_asset_path(path: &str) -> bool {
	!path.is_empty() && path.split('/').all(|segment| !segment.is_empty() && !segment.starts_with('.'))
}

// --- liveness ----------------------------------------------------------------

#[derive(Serialize)]
struct StatusReply {
	status: &'static str,
}

pub async fn status() -> Response<Body> {
	json_response(None, &StatusReply { status: "ok" })
}

// --- tiles -------------------------------------------------------------------

pub async fn tiles(State(core): State<Arc<SeamapCore>>, Path(path): Path<String>) -> Response<Body> {
	debug!("tile request: {path}");
	match parse_tile_path(&path) {
		Err(message) => error_response(StatusCode::BAD_REQUEST, message),
		Ok(TilePath::TileJson(name)) => match core.sources.get(&name) {
			None => error_response(StatusCode::NOT_FOUND, "unknown source"),
			Some(source) => json_response(Some(CACHE_TILEJSON), &source_tilejson(source)),
		},
		Ok(TilePath::Tile { source, coord, ext }) => {
			let Some(def) = core.sources.get(&source) else {
				return error_response(StatusCode::NOT_FOUND, "unknown source");
			};
			match TileFormat::from_extension(&ext) {
				Ok(format) if format == def.format => {}
				_ => return error_response(StatusCode::BAD_REQUEST, "wrong tile extension for source"),
			}
			match core.resolver.get_tile(&source, &coord).await {
				Some((blob, _)) => {
					// vector tiles are stored gzip-compressed in archives
					let gzip = def.format == TileFormat::Pbf && blob.as_slice().starts_with(&[0x1f, 0x8b]);
					bytes_response(def.content_type(), CACHE_TILES, blob.into_vec(), gzip)
				}
				None => empty_response(),
			}
		}
	}
}

fn source_tilejson(source: &SourceDef) -> TileJson {
	TileJson::new(
		source.name,
		format!("/tiles/{}/{{z}}/{{x}}/{{y}}.{}", source.name, source.format.extension()),
		source.minzoom,
		source.maxzoom,
	)
	.with_attribution(source.attribution)
}

// --- derived tiles -----------------------------------------------------------

pub async fn contours(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	derived(state, TileKind::Contours, path).await
}

pub async fn bathymetry(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	derived(state, TileKind::Bathymetry, path).await
}

pub async fn soundings(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	derived(state, TileKind::Soundings, path).await
}

pub async fn composite(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	derived(state, TileKind::Composite, path).await
}

async fn derived(State(core): State<Arc<SeamapCore>>, kind: TileKind, Path(path): Path<String>) -> Response<Body> {
	debug!("derived {} request: {path}", kind.as_str());
	match parse_tile_path(&path) {
		Err(message) => error_response(StatusCode::BAD_REQUEST, message),
		Ok(TilePath::TileJson(name)) => match core.sources.get(&name) {
			None => error_response(StatusCode::NOT_FOUND, "unknown source"),
			Some(source) => json_response(Some(CACHE_TILEJSON), &derived_tilejson(kind, source)),
		},
		Ok(TilePath::Tile { source, coord, ext }) => {
			if ext != "pbf" {
				return error_response(StatusCode::BAD_REQUEST, "derived tiles are vector tiles (.pbf)");
			}
			if core.sources.get(&source).is_none() {
				return error_response(StatusCode::NOT_FOUND, "unknown source");
			}
			match core.derived.get_tile(kind, &source, &coord).await {
				Ok(Some((blob, _))) => {
					bytes_response(TileFormat::Pbf.content_type(), CACHE_TILES, blob.into_vec(), false)
				}
				Ok(None) => empty_response(),
				Err(err) => {
					warn!("derived {} {source} {coord} failed: {err:#}", kind.as_str());
					error_response(StatusCode::INTERNAL_SERVER_ERROR, "tile generation failed")
				}
			}
		}
	}
}

fn derived_tilejson(kind: TileKind, source: &SourceDef) -> TileJson {
	let template = format!("/{}/{}/{{z}}/{{x}}/{{y}}.pbf", kind.as_str(), source.name);
	let minzoom = source.minzoom.saturating_add(1);
	let mut doc = TileJson::new(source.name, template, minzoom, 14).with_attribution(source.attribution);
	match kind {
		TileKind::Contours => {
			doc = doc.with_vector_layer("contours", &[("ele", "Number"), ("idx", "Boolean")]);
		}
		TileKind::Bathymetry => {
			doc = doc
				.with_vector_layer("depth_areas", &[("minDepth", "Number"), ("maxDepth", "Number")])
				.with_vector_layer("depth_contours", &[("depth", "Number")]);
		}
		TileKind::Soundings => {
			doc = doc.with_vector_layer("soundings", &[("depth", "Number")]);
		}
		TileKind::Composite => {
			doc = doc
				.with_vector_layer("contours", &[("ele", "Number"), ("idx", "Boolean")])
				.with_vector_layer("depth_areas", &[("minDepth", "Number"), ("maxDepth", "Number")])
				.with_vector_layer("depth_contours", &[("depth", "Number")])
				.with_vector_layer("soundings", &[("depth", "Number")]);
		}
		TileKind::Tiles => {}
	}
	doc
}

// --- sector downloads --------------------------------------------------------

pub async fn list_sectors(State(core): State<Arc<SeamapCore>>) -> Response<Body> {
	if !core.downloads.utility_available() {
		return error_response(StatusCode::SERVICE_UNAVAILABLE, "extraction utility not available");
	}
	match core.downloads.list_sectors().await {
		Ok(sectors) => json_response(None, &sectors),
		Err(err) => {
			warn!("failed to list sectors: {err:#}");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to list sectors")
		}
	}
}

pub async fn download_status(State(core): State<Arc<SeamapCore>>) -> Response<Body> {
	json_response(None, &core.downloads.status())
}

pub async fn enqueue_sectors(
	State(core): State<Arc<SeamapCore>>,
	Query(params): Query<HashMap<String, String>>,
) -> Response<Body> {
	let Some(tiles) = params.get("tile") else {
		return error_response(StatusCode::BAD_REQUEST, "missing 'tile' parameter");
	};

	let mut sectors = Vec::new();
	for id in tiles.split(',') {
		if is_traversal(id) {
			return error_response(StatusCode::FORBIDDEN, "invalid sector identifier");
		}
		match id.parse::<TileCoord>() {
			Ok(sector) => sectors.push(sector),
			Err(_) => return error_response(StatusCode::BAD_REQUEST, "sector identifiers must be 'z/x/y'"),
		}
	}

	match core.downloads.enqueue(sectors) {
		Ok(()) => json_response(None, &core.downloads.status()),
		Err(err) => {
			warn!("enqueue refused: {err:#}");
			error_response(StatusCode::SERVICE_UNAVAILABLE, "extraction utility not available")
		}
	}
}

pub async fn cancel_downloads(State(core): State<Arc<SeamapCore>>) -> Response<Body> {
	core.downloads.cancel().await;
	json_response(None, &core.downloads.status())
}

pub async fn delete_sector(
	State(core): State<Arc<SeamapCore>>,
	Query(params): Query<HashMap<String, String>>,
) -> Response<Body> {
	let Some(id) = params.get("tile") else {
		return error_response(StatusCode::BAD_REQUEST, "missing 'tile' parameter");
	};
	if is_traversal(id) {
		warn!("refusing sector path traversal: {id}");
		return error_response(StatusCode::FORBIDDEN, "invalid sector identifier");
	}
	let Ok(sector) = id.parse::<TileCoord>() else {
		return error_response(StatusCode::BAD_REQUEST, "sector identifiers must be 'z/x/y'");
	};
	if core.downloads.is_queued(&sector) {
		return error_response(StatusCode::BAD_REQUEST, "sector is queued for download");
	}
	match core.downloads.delete_sector(&sector).await {
		Ok(()) => json_response(None, &StatusReply { status: "ok" }),
		Err(err) => {
			warn!("failed to delete sector {sector}: {err:#}");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to delete sector")
		}
	}
}

// --- static assets -----------------------------------------------------------

pub async fn styles(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	serve_static(state, "styles", path).await
}

pub async fn sprites(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	serve_static(state, "sprites", path).await
}

pub async fn glyphs(state: State<Arc<SeamapCore>>, path: Path<String>) -> Response<Body> {
	serve_static(state, "glyphs", path).await
}

async fn serve_static(State(core): State<Arc<SeamapCore>>, kind: &'static str, Path(path): Path<String>) -> Response<Body> {
	if !sanitize_asset_path(&path) {
		warn!("refusing static path traversal: {kind}/{path}");
		return error_response(StatusCode::FORBIDDEN, "invalid path");
	}

	let file = core.config.styles_path.join(kind).join(&path);
	match tokio::fs::read(&file).await {
		Ok(bytes) => {
			let content_type = match file.extension().and_then(|e| e.to_str()) {
				Some("json") => "application/json",
				Some("pbf") => "application/x-protobuf",
				Some("png") => "image/png",
				_ => "application/octet-stream",
			};
			let cache_control = if kind == "styles" { CACHE_STYLES } else { CACHE_ASSETS };
			bytes_response(content_type, cache_control, bytes, false)
		}
		Err(_) => error_response(StatusCode::NOT_FOUND, "Not Found"),
	}
}
