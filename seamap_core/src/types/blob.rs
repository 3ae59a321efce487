//! The [`Blob`] struct is a thin wrapper around a `Vec<u8>` used for all tile
//! and archive payloads in this workspace.

use crate::ByteRange;
use anyhow::{ensure, Result};
use std::fmt::Debug;
use std::ops::Range;

/// An owned byte buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Creates a zero-filled `Blob` of the given length.
	pub fn new_sized(length: usize) -> Blob {
		Blob(vec![0u8; length])
	}

	/// Returns the bytes of the given range.
	///
	/// Panics if the range exceeds the buffer; use [`Blob::read_range`] for a
	/// checked variant.
	pub fn range(&self, range: Range<usize>) -> &[u8] {
		&self.0[range]
	}

	/// Returns a new `Blob` containing the bytes of `range`, or an error if
	/// the range exceeds the buffer.
	pub fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let end = range.offset + range.length;
		ensure!(
			end <= self.0.len() as u64,
			"byte range {range} exceeds blob length {}",
			self.0.len()
		);
		Ok(Blob::from(&self.0[range.as_range_usize()]))
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.0
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Interprets the content as UTF-8, lossily.
	pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.0)
	}

	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(item: Vec<u8>) -> Self {
		Blob(item)
	}
}

impl From<&[u8]> for Blob {
	fn from(item: &[u8]) -> Self {
		Blob(item.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(item: &[u8; N]) -> Self {
		Blob(item.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(item: &str) -> Self {
		Blob(item.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(item: String) -> Self {
		Blob(item.into_bytes())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Blob").field("len", &self.0.len()).finish()
	}
}

impl Default for Blob {
	fn default() -> Self {
		Self::new_empty()
	}
}
