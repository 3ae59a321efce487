//! Sector download orchestration.
//!
//! A single worker drains a queue of sector identifiers. Each sector is
//! extracted into a dot-prefixed in-progress directory, one source at a
//! time, by spawning the external `pmtiles` utility; on success the
//! directory is committed with an atomic rename, so a sector is never
//! listed half-extracted.

use crate::sources::Sources;
use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use parking_lot::Mutex;
use regex::Regex;
use seamap_core::TileCoord;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Extraction stops at this zoom; deeper tiles are produced by overzooming.
const EXTRACT_MAX_ZOOM: u8 = 14;

/// Current transfer progress of the running extraction.
#[derive(Clone, Debug, Serialize)]
pub struct Progress {
	pub sector: String,
	pub source: String,
	pub transferred: String,
}

/// Status report returned by the HTTP layer.
#[derive(Clone, Debug, Serialize)]
pub struct Status {
	pub active: bool,
	pub total: usize,
	pub done: usize,
	pub progress: Option<Progress>,
}

#[derive(Default)]
struct DownloadState {
	active: bool,
	queue: VecDeque<TileCoord>,
	done: Vec<TileCoord>,
	failed: Vec<TileCoord>,
	progress: Option<Progress>,
	/// Pid of the live extraction subprocess, for cancellation.
	child_pid: Option<u32>,
	/// 1-based index of the source being extracted.
	current_source_index: usize,
	/// Bumped on cancel; a worker holding an older epoch stops touching the
	/// state, so a cancel-then-enqueue never ends up with two live workers.
	epoch: u64,
}

pub struct DownloadManager {
	pmtiles_path: PathBuf,
	sources: Arc<Sources>,
	utility: String,
	state: Mutex<DownloadState>,
}

impl DownloadManager {
	pub fn new(pmtiles_path: PathBuf, sources: Arc<Sources>, utility: String) -> DownloadManager {
		DownloadManager {
			pmtiles_path,
			sources,
			utility,
			state: Mutex::new(DownloadState::default()),
		}
	}

	pub fn utility_available(&self) -> bool {
		utility_available(&self.utility)
	}

	/// Validates and enqueues sector identifiers; starts the worker when
	/// idle. Identifiers already queued are skipped.
	pub fn enqueue(self: &Arc<Self>, sectors: Vec<TileCoord>) -> Result<()> {
		if !self.utility_available() {
			bail!("extraction utility '{}' is not available", self.utility);
		}

		let start_worker = {
			let mut state = self.state.lock();
			for sector in sectors {
				if !state.queue.contains(&sector) {
					state.queue.push_back(sector);
				}
			}
			if !state.active && !state.queue.is_empty() {
				state.active = true;
				Some(state.epoch)
			} else {
				None
			}
		};

		if let Some(epoch) = start_worker {
			let this = Arc::clone(self);
			tokio::spawn(async move { this.run_queue(epoch).await });
		}
		Ok(())
	}

	/// Terminates the running subprocess, wipes the queue and removes the
	/// in-progress directory.
	pub async fn cancel(&self) {
		let (pid, current) = {
			let mut state = self.state.lock();
			state.epoch += 1;
			let pid = state.child_pid.take();
			let current = state.queue.front().copied();
			state.queue.clear();
			state.done.clear();
			state.failed.clear();
			state.progress = None;
			state.current_source_index = 0;
			state.active = false;
			(pid, current)
		};

		if let Some(pid) = pid {
			// tokio's kill() delivers SIGKILL; the utility handles SIGTERM
			// by cleaning up partial output, so send that instead
			unsafe {
				libc::kill(pid as i32, libc::SIGTERM);
			}
		}

		if let Some(sector) = current {
			let in_progress = self.pmtiles_path.join(format!(".{}", sector.sector_dir_name()));
			if let Err(err) = tokio::fs::remove_dir_all(&in_progress).await {
				if err.kind() != std::io::ErrorKind::NotFound {
					warn!("failed to remove in-progress directory {in_progress:?}: {err}");
				}
			}
		}
		info!("sector downloads cancelled");
	}

	pub fn status(&self) -> Status {
		let state = self.state.lock();
		let per_sector = self.sources.len();
		let sectors = state.queue.len() + state.done.len() + state.failed.len();
		let done_units = (state.done.len() + state.failed.len()) * per_sector
			+ state.current_source_index.saturating_sub(1);
		Status {
			active: state.active,
			total: sectors * per_sector,
			done: done_units,
			progress: state.progress.clone(),
		}
	}

	/// Lists committed sector directories; dot-prefixed (in-progress)
	/// entries stay invisible.
	pub async fn list_sectors(&self) -> Result<Vec<String>> {
		let mut sectors = Vec::new();
		let mut entries = tokio::fs::read_dir(&self.pmtiles_path)
			.await
			.with_context(|| format!("failed to list {:?}", self.pmtiles_path))?;
		while let Some(entry) = entries.next_entry().await? {
			let name = entry.file_name().to_string_lossy().to_string();
			if name.starts_with('.') || !entry.file_type().await?.is_dir() {
				continue;
			}
			sectors.push(name);
		}
		sectors.sort();
		Ok(sectors)
	}

	pub fn is_queued(&self, sector: &TileCoord) -> bool {
		self.state.lock().queue.contains(sector)
	}

	/// Removes a committed sector directory. Refused while the sector is
	/// queued or downloading.
	pub async fn delete_sector(&self, sector: &TileCoord) -> Result<()> {
		{
			let state = self.state.lock();
			if state.queue.contains(sector) {
				bail!("sector {sector} is queued for download");
			}
		}
		let dir = self.pmtiles_path.join(sector.sector_dir_name());
		ensure_contained(&self.pmtiles_path, &dir)?;
		match tokio::fs::remove_dir_all(&dir).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err).with_context(|| format!("failed to remove sector {dir:?}")),
		}
	}

	async fn run_queue(self: Arc<Self>, epoch: u64) {
		loop {
			let sector = {
				let mut state = self.state.lock();
				// a cancel bumped the epoch: this worker is superseded and
				// must not touch the (possibly re-populated) state
				if state.epoch != epoch {
					return;
				}
				if state.queue.is_empty() {
					state.active = false;
					state.progress = None;
					state.current_source_index = 0;
					return;
				}
				*state.queue.front().unwrap()
			};

			let succeeded = match self.process_sector(&sector, epoch).await {
				Ok(succeeded) => succeeded,
				Err(err) => {
					warn!("sector {sector} failed: {err:#}");
					false
				}
			};

			let mut state = self.state.lock();
			if state.epoch != epoch {
				return;
			}
			state.queue.pop_front();
			state.progress = None;
			state.current_source_index = 0;
			if succeeded {
				state.done.push(sector);
			} else {
				state.failed.push(sector);
			}
		}
	}

	/// Extracts all sources of one sector. Returns whether every source
	/// succeeded; the in-progress directory is committed or removed
	/// accordingly.
	async fn process_sector(&self, sector: &TileCoord, epoch: u64) -> Result<bool> {
		let dir_name = sector.sector_dir_name();
		let in_progress = self.pmtiles_path.join(format!(".{dir_name}"));
		let target = self.pmtiles_path.join(&dir_name);
		ensure_contained(&self.pmtiles_path, &target)?;

		tokio::fs::create_dir_all(&in_progress)
			.await
			.with_context(|| format!("failed to create {in_progress:?}"))?;

		let bbox = sector.as_geo_bbox();
		let mut all_ok = true;

		for (index, source) in self.sources.iter().enumerate() {
			let cancelled = {
				let mut state = self.state.lock();
				if state.epoch != epoch {
					true
				} else {
					state.current_source_index = index + 1;
					state.progress = Some(Progress {
						sector: sector.to_string(),
						source: source.name.to_string(),
						transferred: String::new(),
					});
					false
				}
			};
			if cancelled {
				tokio::fs::remove_dir_all(&in_progress).await.ok();
				return Ok(false);
			}

			let out = in_progress.join(source.output);
			match self
				.extract_source(sector, source.url, &out, &bbox.as_bbox_arg(), source.maxzoom, epoch)
				.await
			{
				Ok(()) => debug!("extracted {} for sector {sector}", source.name),
				Err(err) => {
					// keep going so the user can see which sources broke
					warn!("extraction of {} for sector {sector} failed: {err:#}", source.name);
					all_ok = false;
				}
			}
		}

		if self.state.lock().epoch != epoch {
			tokio::fs::remove_dir_all(&in_progress).await.ok();
			return Ok(false);
		}

		if all_ok {
			// atomic publish: the sector becomes visible only when complete
			if target.exists() {
				tokio::fs::remove_dir_all(&target).await.ok();
			}
			tokio::fs::rename(&in_progress, &target)
				.await
				.with_context(|| format!("failed to commit sector {dir_name}"))?;
			info!("sector {sector} committed");
		} else {
			tokio::fs::remove_dir_all(&in_progress).await.ok();
		}

		Ok(all_ok)
	}

	async fn extract_source(
		&self,
		sector: &TileCoord,
		url: &str,
		out: &Path,
		bbox: &str,
		source_maxzoom: u8,
		epoch: u64,
	) -> Result<()> {
		let mut command = Command::new(&self.utility);
		command
			.arg("extract")
			.arg(url)
			.arg(out)
			.arg(format!("--bbox={bbox}"));
		if source_maxzoom < EXTRACT_MAX_ZOOM {
			command.arg(format!("--maxzoom={source_maxzoom}"));
		}
		command.stdout(Stdio::null()).stderr(Stdio::piped());

		let mut child = command.spawn().with_context(|| format!("failed to spawn '{}'", self.utility))?;
		{
			let mut state = self.state.lock();
			if state.epoch == epoch {
				state.child_pid = child.id();
			}
		}

		// the utility reports transfer progress on stderr
		if let Some(stderr) = child.stderr.take() {
			let mut lines = BufReader::new(stderr).lines();
			while let Ok(Some(line)) = lines.next_line().await {
				if let Some(pair) = parse_progress(&line) {
					let mut state = self.state.lock();
					if state.epoch == epoch {
						if let Some(progress) = &mut state.progress {
							progress.transferred = pair;
						}
					}
				}
			}
		}

		let status = child.wait().await.context("failed to wait for extraction utility")?;
		{
			let mut state = self.state.lock();
			if state.epoch == epoch {
				state.child_pid = None;
			}
		}

		if !status.success() {
			bail!("extraction of {sector} exited with {status}");
		}
		Ok(())
	}
}

/// Extracts the last "downloaded / total" size pair from a line of utility
/// output.
pub fn parse_progress(line: &str) -> Option<String> {
	lazy_static! {
		static ref RE_SIZES: Regex =
			Regex::new(r"([0-9][0-9.,]*\s*[KMGT]?i?B)\s*/\s*([0-9][0-9.,]*\s*[KMGT]?i?B)").unwrap();
	}
	RE_SIZES
		.captures_iter(line)
		.last()
		.map(|caps| format!("{} / {}", &caps[1], &caps[2]))
}

/// Checks that the extraction utility can be spawned: an explicit path must
/// be an executable file, a bare name must be found on `$PATH`.
pub fn utility_available(utility: &str) -> bool {
	use std::os::unix::fs::PermissionsExt;

	let is_executable = |path: &Path| {
		path
			.metadata()
			.map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
			.unwrap_or(false)
	};

	if utility.contains('/') {
		return is_executable(Path::new(utility));
	}
	let Some(path_var) = std::env::var_os("PATH") else {
		return false;
	};
	std::env::split_paths(&path_var).any(|dir| is_executable(&dir.join(utility)))
}

/// Rejects paths that escape `root` after symlink resolution.
pub fn ensure_contained(root: &Path, candidate: &Path) -> Result<()> {
	let canonical_root = root
		.canonicalize()
		.with_context(|| format!("failed to resolve {root:?}"))?;
	// the candidate may not exist yet; resolve the deepest existing ancestor
	let mut existing = candidate.to_path_buf();
	let mut suffix = PathBuf::new();
	while !existing.exists() {
		let file_name = existing
			.file_name()
			.ok_or_else(|| anyhow!("path {candidate:?} has no containing directory"))?
			.to_owned();
		suffix = PathBuf::from(&file_name).join(suffix);
		existing = existing
			.parent()
			.ok_or_else(|| anyhow!("path {candidate:?} has no containing directory"))?
			.to_path_buf();
	}
	let resolved = existing.canonicalize()?.join(suffix);
	if !resolved.starts_with(&canonical_root) {
		bail!("path {candidate:?} escapes {root:?}");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	/// Writes a stub extraction utility. It creates its output file, prints
	/// a size pair to stderr, and exits with the code found in
	/// `$FAIL_MARKER`-named files next to the output, if any.
	fn write_stub_utility(dir: &Path, fail_for_output: Option<&str>) -> String {
		let path = dir.join("pmtiles-stub");
		let fail = fail_for_output.unwrap_or("");
		let script = format!(
			"#!/bin/sh\n\
			 # args: extract <url> <out> --bbox=... [--maxzoom=...]\n\
			 out=\"$3\"\n\
			 echo '12.5 MB / 50 MB' >&2\n\
			 case \"$out\" in *{fail}*) [ -n \"{fail}\" ] && exit 3 ;; esac\n\
			 echo data > \"$out\"\n\
			 exit 0\n"
		);
		std::fs::write(&path, script).unwrap();
		let mut perms = std::fs::metadata(&path).unwrap().permissions();
		use std::os::unix::fs::PermissionsExt;
		perms.set_mode(0o755);
		std::fs::set_permissions(&path, perms).unwrap();
		path.to_string_lossy().to_string()
	}

	fn manager(root: &Path, utility: String) -> Arc<DownloadManager> {
		Arc::new(DownloadManager::new(
			root.to_path_buf(),
			Arc::new(Sources::default()),
			utility,
		))
	}

	async fn wait_until_idle(manager: &DownloadManager) {
		for _ in 0..300 {
			if !manager.status().active {
				return;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		panic!("download worker did not finish");
	}

	#[test]
	fn progress_parsing() {
		assert_eq!(parse_progress("12.5 MB / 50 MB downloaded"), Some("12.5 MB / 50 MB".to_string()));
		assert_eq!(parse_progress("fetching 100 KiB / 2.5 GiB"), Some("100 KiB / 2.5 GiB".to_string()));
		assert_eq!(parse_progress("no sizes here"), None);
		// the last pair on the line wins
		assert_eq!(parse_progress("1 MB / 2 MB then 3 MB / 4 MB"), Some("3 MB / 4 MB".to_string()));
	}

	#[test]
	fn utility_lookup() {
		assert!(utility_available("sh"));
		assert!(!utility_available("definitely-not-a-real-utility"));
		assert!(!utility_available("/nonexistent/path/to/tool"));
	}

	#[test]
	fn containment() -> Result<()> {
		let dir = tempfile::tempdir()?;
		ensure_contained(dir.path(), &dir.path().join("6_34_22"))?;
		ensure_contained(dir.path(), &dir.path().join(".6_34_22").join("osm.pmtiles"))?;
		assert!(ensure_contained(dir.path(), &dir.path().join("..").join("etc")).is_err());
		assert!(ensure_contained(dir.path(), Path::new("/etc/passwd")).is_err());
		Ok(())
	}

	#[tokio::test]
	async fn successful_download_commits_atomically() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let utility = write_stub_utility(dir.path(), None);
		let manager = manager(dir.path(), utility);

		let sector: TileCoord = "6/34/22".parse()?;
		manager.enqueue(vec![sector])?;
		wait_until_idle(&manager).await;

		// committed, with one archive per source, and no in-progress leftover
		let committed = dir.path().join("6_34_22");
		assert!(committed.is_dir());
		for source in Sources::default().iter() {
			assert!(committed.join(source.output).is_file(), "missing {}", source.output);
		}
		assert!(!dir.path().join(".6_34_22").exists());
		assert_eq!(manager.list_sectors().await?, vec!["6_34_22".to_string()]);

		let status = manager.status();
		assert!(!status.active);
		assert_eq!(status.total, 5);
		assert_eq!(status.done, 5);
		Ok(())
	}

	#[tokio::test]
	async fn failing_source_fails_the_sector_but_tries_the_rest() -> Result<()> {
		let dir = tempfile::tempdir()?;
		// the stub exits non-zero for the gebco output only
		let utility = write_stub_utility(dir.path(), Some("gebco"));
		let manager = manager(dir.path(), utility);

		let sector: TileCoord = "6/34/22".parse()?;
		manager.enqueue(vec![sector])?;
		wait_until_idle(&manager).await;

		assert!(!dir.path().join("6_34_22").exists(), "failed sector must not be committed");
		assert!(!dir.path().join(".6_34_22").exists(), "in-progress dir must be removed");
		assert!(manager.list_sectors().await?.is_empty());

		let status = manager.status();
		assert_eq!(status.total, 5);
		assert_eq!(status.done, 5, "all sources were attempted");
		assert_eq!(manager.state.lock().failed, vec![sector]);
		Ok(())
	}

	#[tokio::test]
	async fn queue_deduplicates_and_processes_in_order() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let utility = write_stub_utility(dir.path(), None);
		let manager = manager(dir.path(), utility);

		let a: TileCoord = "6/34/22".parse()?;
		let b: TileCoord = "6/35/22".parse()?;
		manager.enqueue(vec![a, b, a])?;
		wait_until_idle(&manager).await;

		assert_eq!(
			manager.list_sectors().await?,
			vec!["6_34_22".to_string(), "6_35_22".to_string()]
		);
		assert_eq!(manager.state.lock().done.len(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn cancel_resets_the_state() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let utility = write_stub_utility(dir.path(), None);
		let manager = manager(dir.path(), utility);

		manager.enqueue(vec!["6/34/22".parse()?, "6/35/22".parse()?])?;
		manager.cancel().await;

		let status = manager.status();
		assert!(!status.active);
		assert_eq!(status.total, 0);
		assert_eq!(status.done, 0);
		assert!(status.progress.is_none());

		// the superseded worker removes its in-progress directory on its
		// next cancellation check
		for _ in 0..300 {
			if !dir.path().join(".6_34_22").exists() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		assert!(!dir.path().join(".6_34_22").exists());
		Ok(())
	}

	#[tokio::test]
	async fn enqueue_without_utility_is_refused() {
		let dir = tempfile::tempdir().unwrap();
		let manager = manager(dir.path(), "definitely-not-a-real-utility".to_string());
		assert!(manager.enqueue(vec!["6/34/22".parse().unwrap()]).is_err());
	}

	#[tokio::test]
	async fn delete_sector_refuses_queued_and_removes_committed() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let utility = write_stub_utility(dir.path(), None);
		let manager = manager(dir.path(), utility);

		let sector: TileCoord = "6/34/22".parse()?;
		manager.enqueue(vec![sector])?;
		wait_until_idle(&manager).await;
		assert!(dir.path().join("6_34_22").is_dir());

		manager.delete_sector(&sector).await?;
		assert!(!dir.path().join("6_34_22").exists());
		// deleting a missing sector is idempotent
		manager.delete_sector(&sector).await?;
		Ok(())
	}
}
