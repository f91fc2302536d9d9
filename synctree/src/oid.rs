use std::io::Cursor;

use crate::codec::binary::{read_u16, read_u64, read_u8};
use crate::error::{ModelError, UnpackError};

/// The value of a record's identity field. Any primitive type may back an
/// `oid` field; this enum lets `DecodeContext`/`IdMap` work with the value
/// without needing to be generic over the concrete oid type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OidValue {
	Int(i64),
	UInt(u64),
	Str(String),
}

/// Which primitive family a type's declared `oid` field belongs to, so a
/// bare string key (from the structural format) can be parsed back into the
/// right `OidValue` variant. Generated by `#[derive(Record)]` as
/// `T::oid_kind()` for any type that declares an `oid` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidKind {
	Int,
	UInt,
	Str,
}

impl OidValue {
	pub fn parse(kind: OidKind, s: &str) -> Result<Self, ModelError> {
		match kind {
			OidKind::Int => s
				.parse::<i64>()
				.map(OidValue::Int)
				.map_err(|_| ModelError::Unpack(UnpackError::TypeMismatch { expected: "integer oid", found: "string key" })),
			OidKind::UInt => s
				.parse::<u64>()
				.map(OidValue::UInt)
				.map_err(|_| ModelError::Unpack(UnpackError::TypeMismatch { expected: "unsigned oid", found: "string key" })),
			OidKind::Str => Ok(OidValue::Str(s.to_owned())),
		}
	}

	/// Uniform tagged wire encoding for oid values used as `IdMap` keys:
	/// 1-byte kind tag, then the value. This is deliberately independent of
	/// the child's declared oid primitive *width* (an `i16` oid and an `i64`
	/// oid both serialize as `Int` with 8 bytes) since the wire format (§6)
	/// only fixes codecs for a record's own declared scalar fields, not a
	/// cross-type identifier shape — see DESIGN.md.
	pub fn bin_encode(&self, buf: &mut Vec<u8>) {
		match self {
			OidValue::Int(v) => {
				buf.push(0);
				buf.extend_from_slice(&v.to_be_bytes());
			},
			OidValue::UInt(v) => {
				buf.push(1);
				buf.extend_from_slice(&v.to_be_bytes());
			},
			OidValue::Str(v) => {
				buf.push(2);
				buf.extend_from_slice(&(v.len() as u16).to_be_bytes());
				buf.extend_from_slice(v.as_bytes());
			},
		}
	}

	/// Same as `bin_encode`, but rejects a `Str` oid whose length does not
	/// fit the `uint16` length prefix instead of silently truncating it.
	pub fn checked_bin_encode(&self, buf: &mut Vec<u8>) -> Result<(), ModelError> {
		if let OidValue::Str(v) = self {
			crate::codec::check_string_len(v)?;
		}
		self.bin_encode(buf);
		Ok(())
	}

	pub fn bin_decode(cur: &mut Cursor<&[u8]>) -> Result<Self, ModelError> {
		match read_u8(cur)? {
			0 => Ok(OidValue::Int(read_u64(cur)? as i64)),
			1 => Ok(OidValue::UInt(read_u64(cur)?)),
			2 => {
				let len = read_u16(cur)? as usize;
				let mut bytes = vec![0u8; len];
				std::io::Read::read_exact(cur, &mut bytes).map_err(|_| ModelError::Unpack(UnpackError::UnexpectedEof))?;
				String::from_utf8(bytes)
					.map(OidValue::Str)
					.map_err(|_| ModelError::Unpack(UnpackError::TypeMismatch { expected: "utf-8 oid", found: "invalid bytes" }))
			},
			_ => Err(ModelError::Unpack(UnpackError::TypeMismatch { expected: "oid tag 0/1/2", found: "unknown tag byte" })),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bin_round_trip_str() {
		let v = OidValue::Str("abc".to_owned());
		let mut buf = Vec::new();
		v.bin_encode(&mut buf);
		let mut cur = Cursor::new(buf.as_slice());
		assert_eq!(OidValue::bin_decode(&mut cur).unwrap(), v);
	}

	#[test]
	fn bin_round_trip_int() {
		let v = OidValue::Int(-42);
		let mut buf = Vec::new();
		v.bin_encode(&mut buf);
		let mut cur = Cursor::new(buf.as_slice());
		assert_eq!(OidValue::bin_decode(&mut cur).unwrap(), v);
	}

	#[test]
	fn parse_roundtrips_display() {
		let v = OidValue::UInt(7);
		assert_eq!(OidValue::parse(OidKind::UInt, &v.to_string()).unwrap(), v);
	}
}

impl From<i8> for OidValue {
	fn from(v: i8) -> Self {
		OidValue::Int(v as i64)
	}
}
impl From<i16> for OidValue {
	fn from(v: i16) -> Self {
		OidValue::Int(v as i64)
	}
}
impl From<i32> for OidValue {
	fn from(v: i32) -> Self {
		OidValue::Int(v as i64)
	}
}
impl From<i64> for OidValue {
	fn from(v: i64) -> Self {
		OidValue::Int(v)
	}
}
impl From<u8> for OidValue {
	fn from(v: u8) -> Self {
		OidValue::UInt(v as u64)
	}
}
impl From<u16> for OidValue {
	fn from(v: u16) -> Self {
		OidValue::UInt(v as u64)
	}
}
impl From<u32> for OidValue {
	fn from(v: u32) -> Self {
		OidValue::UInt(v as u64)
	}
}
impl From<u64> for OidValue {
	fn from(v: u64) -> Self {
		OidValue::UInt(v)
	}
}
impl From<String> for OidValue {
	fn from(v: String) -> Self {
		OidValue::Str(v)
	}
}
impl From<&str> for OidValue {
	fn from(v: &str) -> Self {
		OidValue::Str(v.to_owned())
	}
}

impl std::fmt::Display for OidValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OidValue::Int(v) => write!(f, "{v}"),
			OidValue::UInt(v) => write!(f, "{v}"),
			OidValue::Str(v) => write!(f, "{v}"),
		}
	}
}
