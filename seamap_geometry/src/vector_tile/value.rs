//! Property values and their protobuf representation.

use anyhow::{anyhow, bail, Context, Result};
use seamap_core::io::{ValueReaderSlice, ValueWriterBlob};
use seamap_core::Blob;

/// A property value of a vector-tile feature.
#[derive(Clone, Debug, PartialEq)]
pub enum TileValue {
	String(String),
	Float(f32),
	Double(f64),
	Int(i64),
	UInt(u64),
	Bool(bool),
}

impl TileValue {
	pub fn read(reader: &mut ValueReaderSlice) -> Result<TileValue> {
		let mut value: Option<TileValue> = None;

		while reader.has_remaining() {
			value = Some(match reader.read_pbf_key().context("failed to read PBF key")? {
				(1, 2) => TileValue::String(reader.read_pbf_string()?),
				(2, 5) => TileValue::Float(reader.read_f32()?),
				(3, 1) => TileValue::Double(reader.read_f64()?),
				(4, 0) => TileValue::Int(reader.read_varint()? as i64),
				(5, 0) => TileValue::UInt(reader.read_varint()?),
				(6, 0) => TileValue::Int(reader.read_svarint()?),
				(7, 0) => TileValue::Bool(reader.read_varint()? != 0),
				(f, w) => bail!("unexpected field number ({f}) / wire type ({w}) in value"),
			});
		}

		value.ok_or_else(|| anyhow!("value message contains no value"))
	}

	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new();

		match self {
			TileValue::String(s) => {
				writer.write_pbf_key(1, 2)?;
				writer.write_pbf_string(s)?;
			}
			TileValue::Float(f) => {
				writer.write_pbf_key(2, 5)?;
				writer.write_f32(*f)?;
			}
			TileValue::Double(f) => {
				writer.write_pbf_key(3, 1)?;
				writer.write_f64(*f)?;
			}
			TileValue::Int(i) => {
				writer.write_pbf_key(6, 0)?;
				writer.write_svarint(*i)?;
			}
			TileValue::UInt(u) => {
				writer.write_pbf_key(5, 0)?;
				writer.write_varint(*u)?;
			}
			TileValue::Bool(b) => {
				writer.write_pbf_key(7, 0)?;
				writer.write_varint(u64::from(*b))?;
			}
		}

		Ok(writer.into_blob())
	}

	/// Whether downstream consumers accept this value: integers must fit
	/// into a signed 32-bit range.
	pub fn is_representable(&self) -> bool {
		match self {
			TileValue::Int(i) => i64::from(i32::MIN) <= *i && *i <= i64::from(i32::MAX),
			TileValue::UInt(u) => *u <= i32::MAX as u64,
			_ => true,
		}
	}
}

impl std::hash::Hash for TileValue {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		match self {
			TileValue::String(s) => s.hash(state),
			TileValue::Float(f) => f.to_bits().hash(state),
			TileValue::Double(f) => f.to_bits().hash(state),
			TileValue::Int(i) => i.hash(state),
			TileValue::UInt(u) => u.hash(state),
			TileValue::Bool(b) => b.hash(state),
		}
	}
}

impl Eq for TileValue {}

impl From<&str> for TileValue {
	fn from(value: &str) -> Self {
		TileValue::String(value.to_string())
	}
}

impl From<f64> for TileValue {
	fn from(value: f64) -> Self {
		TileValue::Double(value)
	}
}

impl From<i64> for TileValue {
	fn from(value: i64) -> Self {
		TileValue::Int(value)
	}
}

impl From<bool> for TileValue {
	fn from(value: bool) -> Self {
		TileValue::Bool(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(value: TileValue) -> Result<()> {
		let blob = value.to_blob()?;
		let mut reader = ValueReaderSlice::new(blob.as_slice());
		assert_eq!(TileValue::read(&mut reader)?, value);
		Ok(())
	}

	#[test]
	fn round_trips() -> Result<()> {
		round_trip(TileValue::from("hello"))?;
		round_trip(TileValue::Float(1.5))?;
		round_trip(TileValue::Double(-17.25))?;
		round_trip(TileValue::Int(-75))?;
		round_trip(TileValue::UInt(150))?;
		round_trip(TileValue::Bool(true))?;
		Ok(())
	}

	#[test]
	fn string_wire_format() -> Result<()> {
		let blob = TileValue::from("hello").to_blob()?;
		assert_eq!(blob.as_slice(), &[0x0A, 0x05, b'h', b'e', b'l', b'l', b'o']);
		Ok(())
	}

	#[test]
	fn representability_is_i32_bounded() {
		assert!(TileValue::Int(i64::from(i32::MAX)).is_representable());
		assert!(TileValue::Int(i64::from(i32::MIN)).is_representable());
		assert!(!TileValue::Int(i64::from(i32::MAX) + 1).is_representable());
		assert!(!TileValue::UInt(u64::MAX).is_representable());
		assert!(TileValue::Double(1e300).is_representable());
	}

	#[test]
	fn empty_message_is_an_error() {
		let mut reader = ValueReaderSlice::new(&[]);
		assert!(TileValue::read(&mut reader).is_err());
	}
}
