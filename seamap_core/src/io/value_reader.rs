//! Reading little-endian scalars, varints and protobuf fields from a byte
//! slice.

use crate::{Blob, ByteRange};
use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A cursor over a byte slice with value-level read methods.
pub struct ValueReaderSlice<'a> {
	cursor: Cursor<&'a [u8]>,
	len: u64,
}

impl<'a> ValueReaderSlice<'a> {
	pub fn new(slice: &'a [u8]) -> ValueReaderSlice<'a> {
		ValueReaderSlice {
			len: slice.len() as u64,
			cursor: Cursor::new(slice),
		}
	}

	pub fn len(&self) -> u64 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn position(&self) -> u64 {
		self.cursor.position()
	}

	pub fn set_position(&mut self, position: u64) -> Result<()> {
		ensure!(position <= self.len, "position {position} beyond length {}", self.len);
		self.cursor.set_position(position);
		Ok(())
	}

	pub fn remaining(&self) -> u64 {
		self.len - self.cursor.position()
	}

	pub fn has_remaining(&self) -> bool {
		self.remaining() > 0
	}

	/// Reads a variable-length unsigned integer.
	pub fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0;
		let mut shift = 0;
		loop {
			let byte = self.cursor.read_u8()?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
			if shift >= 70 {
				bail!("varint too long");
			}
		}
		Ok(value)
	}

	/// Reads a zigzag-encoded signed varint.
	pub fn read_svarint(&mut self) -> Result<i64> {
		let value = self.read_varint()? as i64;
		Ok((value >> 1) ^ -(value & 1))
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.cursor.read_u8()?)
	}

	pub fn read_u16(&mut self) -> Result<u16> {
		Ok(self.cursor.read_u16::<LittleEndian>()?)
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		Ok(self.cursor.read_u32::<LittleEndian>()?)
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		Ok(self.cursor.read_u64::<LittleEndian>()?)
	}

	pub fn read_i32(&mut self) -> Result<i32> {
		Ok(self.cursor.read_i32::<LittleEndian>()?)
	}

	pub fn read_f32(&mut self) -> Result<f32> {
		Ok(self.cursor.read_f32::<LittleEndian>()?)
	}

	pub fn read_f64(&mut self) -> Result<f64> {
		Ok(self.cursor.read_f64::<LittleEndian>()?)
	}

	/// Reads two `u64` values as a `ByteRange` (offset, length).
	pub fn read_range(&mut self) -> Result<ByteRange> {
		Ok(ByteRange::new(self.read_u64()?, self.read_u64()?))
	}

	pub fn read_blob(&mut self, length: u64) -> Result<Blob> {
		let mut blob = Blob::new_sized(length as usize);
		std::io::Read::read_exact(&mut self.cursor, blob.as_mut_slice())?;
		Ok(blob)
	}

	pub fn read_string(&mut self, length: u64) -> Result<String> {
		let mut vec = vec![0u8; length as usize];
		std::io::Read::read_exact(&mut self.cursor, &mut vec)?;
		Ok(String::from_utf8(vec)?)
	}

	/// Reads a protobuf key, returning `(field_number, wire_type)`.
	pub fn read_pbf_key(&mut self) -> Result<(u32, u8)> {
		let value = self.read_varint().context("failed to read varint for PBF key")?;
		Ok(((value >> 3) as u32, (value & 0x07) as u8))
	}

	/// Returns a sub-reader over the next `length` bytes, advancing this
	/// reader past them.
	pub fn get_sub_reader(&mut self, length: u64) -> Result<ValueReaderSlice<'a>> {
		let start = self.cursor.position();
		ensure!(
			start + length <= self.len,
			"sub-reader of length {length} at position {start} exceeds length {}",
			self.len
		);
		self.cursor.set_position(start + length);
		let slice = *self.cursor.get_ref();
		Ok(ValueReaderSlice::new(&slice[start as usize..(start + length) as usize]))
	}

	/// Reads a length-delimited protobuf field as a sub-reader.
	pub fn get_pbf_sub_reader(&mut self) -> Result<ValueReaderSlice<'a>> {
		let length = self.read_varint().context("failed to read sub-reader length")?;
		self.get_sub_reader(length)
	}

	pub fn read_pbf_packed_uint32(&mut self) -> Result<Vec<u32>> {
		let mut reader = self.get_pbf_sub_reader().context("failed to read packed uint32 field")?;
		let mut values = Vec::new();
		while reader.has_remaining() {
			values.push(reader.read_varint()? as u32);
		}
		Ok(values)
	}

	pub fn read_pbf_string(&mut self) -> Result<String> {
		let length = self.read_varint().context("failed to read string length")?;
		self.read_string(length)
	}

	pub fn read_pbf_blob(&mut self) -> Result<Blob> {
		let length = self.read_varint().context("failed to read blob length")?;
		self.read_blob(length)
	}
}
