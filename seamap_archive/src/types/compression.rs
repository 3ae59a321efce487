use anyhow::{bail, Result};
use flate2::read::GzDecoder;
use seamap_core::Blob;
use std::io::Read;

/// Internal compression of archive directories and metadata.
///
/// The numeric values are fixed by the archive format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveCompression {
	Unknown = 0,
	None = 1,
	Gzip = 2,
	Brotli = 3,
	Zstd = 4,
}

impl ArchiveCompression {
	pub fn from_u8(value: u8) -> Result<ArchiveCompression> {
		Ok(match value {
			0 => ArchiveCompression::Unknown,
			1 => ArchiveCompression::None,
			2 => ArchiveCompression::Gzip,
			3 => ArchiveCompression::Brotli,
			4 => ArchiveCompression::Zstd,
			_ => bail!("unknown compression value {value}"),
		})
	}

	/// Decompresses `blob` according to this compression.
	///
	/// Only gzip and identity are produced by the tooling this server
	/// consumes archives from; the other variants are rejected.
	pub fn decompress(&self, blob: Blob) -> Result<Blob> {
		match self {
			ArchiveCompression::None => Ok(blob),
			ArchiveCompression::Gzip => {
				let mut decoder = GzDecoder::new(blob.as_slice());
				let mut buffer = Vec::new();
				decoder.read_to_end(&mut buffer)?;
				Ok(Blob::from(buffer))
			}
			_ => bail!("unsupported internal compression {self:?}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flate2::{write::GzEncoder, Compression};
	use std::io::Write;

	#[test]
	fn from_u8() {
		assert_eq!(ArchiveCompression::from_u8(1).unwrap(), ArchiveCompression::None);
		assert_eq!(ArchiveCompression::from_u8(2).unwrap(), ArchiveCompression::Gzip);
		assert!(ArchiveCompression::from_u8(9).is_err());
	}

	#[test]
	fn gzip_round_trip() -> Result<()> {
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(b"some directory bytes")?;
		let compressed = Blob::from(encoder.finish()?);

		let decompressed = ArchiveCompression::Gzip.decompress(compressed)?;
		assert_eq!(decompressed.as_slice(), b"some directory bytes");
		Ok(())
	}

	#[test]
	fn none_is_passthrough() -> Result<()> {
		let blob = Blob::from("plain");
		assert_eq!(ArchiveCompression::None.decompress(blob)?.as_slice(), b"plain");
		Ok(())
	}

	#[test]
	fn unsupported_variants_error() {
		assert!(ArchiveCompression::Zstd.decompress(Blob::from("x")).is_err());
		assert!(ArchiveCompression::Brotli.decompress(Blob::from("x")).is_err());
	}
}
