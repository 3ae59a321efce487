//! Reading byte ranges from a local file.
//!
//! Reads are positional (`pread`), so a single open file handle serves
//! concurrent requests without seeking shared state.

use super::DataReaderTrait;
use crate::{Blob, ByteRange};
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Positional reads from a local file.
#[derive(Debug)]
pub struct DataReaderFile {
	name: String,
	file: File,
	size: u64,
}

impl DataReaderFile {
	pub fn open(path: &Path) -> Result<DataReaderFile> {
		ensure!(path.is_file(), "path {path:?} must be an existing file");

		let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
		let size = file.metadata()?.len();

		Ok(DataReaderFile {
			name: path.to_string_lossy().to_string(),
			file,
			size,
		})
	}

	pub fn size(&self) -> u64 {
		self.size
	}
}

#[async_trait]
impl DataReaderTrait for DataReaderFile {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		ensure!(
			range.offset + range.length <= self.size,
			"range {range} exceeds file size {} of '{}'",
			self.size,
			self.name
		);
		let mut buffer = vec![0u8; range.length as usize];
		self
			.file
			.read_exact_at(&mut buffer, range.offset)
			.with_context(|| format!("failed to read {range} from '{}'", self.name))?;
		Ok(Blob::from(buffer))
	}

	fn get_name(&self) -> &str {
		&self.name
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[tokio::test]
	async fn reads_ranges_positionally() -> Result<()> {
		let mut file = tempfile::NamedTempFile::new()?;
		file.write_all(b"0123456789")?;
		let reader = DataReaderFile::open(file.path())?;

		assert_eq!(reader.read_range(&ByteRange::new(0, 3)).await?.as_slice(), b"012");
		assert_eq!(reader.read_range(&ByteRange::new(7, 3)).await?.as_slice(), b"789");
		// reads do not disturb each other
		assert_eq!(reader.read_range(&ByteRange::new(2, 2)).await?.as_slice(), b"23");
		Ok(())
	}

	#[tokio::test]
	async fn rejects_out_of_bounds() -> Result<()> {
		let mut file = tempfile::NamedTempFile::new()?;
		file.write_all(b"abc")?;
		let reader = DataReaderFile::open(file.path())?;
		assert!(reader.read_range(&ByteRange::new(2, 5)).await.is_err());
		Ok(())
	}

	#[test]
	fn open_missing_file_fails() {
		assert!(DataReaderFile::open(Path::new("/nonexistent/archive.pmtiles")).is_err());
	}
}
