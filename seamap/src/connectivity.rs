//! Background connectivity probing.
//!
//! A periodic HEAD request against the first upstream source keeps a single
//! atomic boolean up to date. The flag is read without locking; a stale
//! value only sends one request down a suboptimal path.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ConnectivityMonitor {
	online: Arc<AtomicBool>,
}

impl ConnectivityMonitor {
	/// Starts the background probe task. Offline until the first probe
	/// succeeds.
	pub fn start(probe_url: String) -> ConnectivityMonitor {
		let online = Arc::new(AtomicBool::new(false));

		let flag = Arc::clone(&online);
		tokio::spawn(async move {
			let client = match reqwest::Client::builder().connect_timeout(PROBE_TIMEOUT).build() {
				Ok(client) => client,
				Err(err) => {
					log::warn!("connectivity monitor disabled: {err}");
					return;
				}
			};
			let mut interval = tokio::time::interval(PROBE_INTERVAL);
			loop {
				interval.tick().await;
				let result = probe(&client, &probe_url).await;
				if result != flag.load(Ordering::Relaxed) {
					debug!("connectivity changed: online={result}");
				}
				flag.store(result, Ordering::Relaxed);
			}
		});

		ConnectivityMonitor { online }
	}

	/// A monitor pinned to a fixed state; no probing.
	pub fn fixed(online: bool) -> ConnectivityMonitor {
		ConnectivityMonitor {
			online: Arc::new(AtomicBool::new(online)),
		}
	}

	pub fn is_online(&self) -> bool {
		self.online.load(Ordering::Relaxed)
	}
}

/// One HEAD probe; any status in `[200, 400)` counts as online, everything
/// else (timeouts, DNS failures, server errors) as offline.
async fn probe(client: &reqwest::Client, url: &str) -> bool {
	let request = client.head(url).timeout(PROBE_TIMEOUT).send();
	match request.await {
		Ok(response) => {
			let code = response.status().as_u16();
			(200..400).contains(&code)
		}
		Err(err) => {
			debug!("connectivity probe failed: {err}");
			false
		}
	}
}
