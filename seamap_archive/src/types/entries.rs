//! Archive directory entries.
//!
//! A directory is a sorted run of entries, serialized column-wise: entry
//! count, delta-encoded tile ids, run lengths, byte lengths, then offsets
//! (`0` marks an offset contiguous with the previous entry, any other value
//! is the real offset plus one).

use anyhow::{ensure, Context, Result};
use seamap_core::{
	io::{ValueReaderSlice, ValueWriterBlob},
	Blob, ByteRange,
};
use std::cmp::Ordering;

/// One directory entry.
///
/// `run_length > 0` addresses `run_length` consecutive tile ids sharing the
/// same bytes; `run_length == 0` marks a pointer into the leaf-directory
/// section.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Entry {
	pub tile_id: u64,
	pub range: ByteRange,
	pub run_length: u32,
}

/// Parses a decompressed directory into its entries.
pub fn parse_directory(blob: &Blob) -> Result<Vec<Entry>> {
	let mut reader = ValueReaderSlice::new(blob.as_slice());

	let num_entries = reader.read_varint().context("failed to read entry count")? as usize;
	ensure!(num_entries < 10_000_000, "directory claims {num_entries} entries");

	let mut entries = Vec::with_capacity(num_entries);

	let mut last_id: u64 = 0;
	for _ in 0..num_entries {
		last_id += reader.read_varint().context("failed to read tile id delta")?;
		entries.push(Entry {
			tile_id: last_id,
			range: ByteRange::empty(),
			run_length: 0,
		});
	}

	for entry in &mut entries {
		entry.run_length = reader.read_varint().context("failed to read run length")? as u32;
	}

	for entry in &mut entries {
		entry.range.length = reader.read_varint().context("failed to read length")?;
	}

	for i in 0..num_entries {
		let value = reader.read_varint().context("failed to read offset")?;
		if i > 0 && value == 0 {
			entries[i].range.offset = entries[i - 1].range.offset + entries[i - 1].range.length;
		} else {
			ensure!(value > 0, "first entry must carry an explicit offset");
			entries[i].range.offset = value - 1;
		}
	}

	Ok(entries)
}

/// Serializes entries into the column-wise directory format.
pub fn serialize_directory(entries: &[Entry]) -> Result<Blob> {
	let mut writer = ValueWriterBlob::new();
	writer.write_varint(entries.len() as u64)?;

	let mut last_id: u64 = 0;
	for entry in entries {
		writer.write_varint(entry.tile_id - last_id)?;
		last_id = entry.tile_id;
	}
	for entry in entries {
		writer.write_varint(u64::from(entry.run_length))?;
	}
	for entry in entries {
		writer.write_varint(entry.range.length)?;
	}
	for (i, entry) in entries.iter().enumerate() {
		if i > 0 && entry.range.offset == entries[i - 1].range.offset + entries[i - 1].range.length {
			writer.write_varint(0)?;
		} else {
			writer.write_varint(entry.range.offset + 1)?;
		}
	}

	Ok(writer.into_blob())
}

/// Finds the entry covering `tile_id`, honoring run lengths and leaf
/// pointers. Returns `None` when no entry can cover the id.
pub fn find_tile(entries: &[Entry], tile_id: u64) -> Option<Entry> {
	let mut m: i64 = 0;
	let mut n: i64 = entries.len() as i64 - 1;

	while m <= n {
		let k = (n + m) >> 1;
		match tile_id.cmp(&entries[k as usize].tile_id) {
			Ordering::Greater => m = k + 1,
			Ordering::Less => n = k - 1,
			Ordering::Equal => return Some(entries[k as usize]),
		}
	}

	// at this point m > n; the entry at n (if any) is the last one at or
	// before the id
	if n >= 0 {
		let entry = entries[n as usize];
		if entry.run_length == 0 {
			return Some(entry);
		}
		if tile_id - entry.tile_id < u64::from(entry.run_length) {
			return Some(entry);
		}
	}

	None
}
