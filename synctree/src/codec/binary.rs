use std::io::{Cursor, Read};

use crate::error::{ModelError, UnpackError};

/// Container head tags, placed ahead of a `u32` element count (§ wire format).
pub const TAG_ARRAY: u8 = 0xD0;
pub const TAG_MAP: u8 = 0xD1;
pub const TAG_ID_MAP: u8 = 0xD2;

pub fn read_exact<const N: usize>(cur: &mut Cursor<&[u8]>) -> Result<[u8; N], ModelError> {
	let mut buf = [0u8; N];
	cur.read_exact(&mut buf).map_err(|_| ModelError::Unpack(UnpackError::UnexpectedEof))?;
	Ok(buf)
}

pub fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8, ModelError> {
	Ok(read_exact::<1>(cur)?[0])
}

pub fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, ModelError> {
	Ok(u16::from_be_bytes(read_exact::<2>(cur)?))
}

pub fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, ModelError> {
	Ok(u32::from_be_bytes(read_exact::<4>(cur)?))
}

pub fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64, ModelError> {
	Ok(u64::from_be_bytes(read_exact::<8>(cur)?))
}

/// Implements `WireCodec` once per fixed-width numeric type, reading and
/// writing big-endian ("network order") bytes.
macro_rules! impl_big_endian_codec {
	($($t:ty),+ $(,)?) => {
		$(
			impl crate::codec::WireCodec for $t {
				fn dict_encode(&self) -> serde_json::Value {
					serde_json::json!(*self)
				}

				fn dict_decode(v: &serde_json::Value) -> Result<Self, ModelError> {
					serde_json::from_value(v.clone()).map_err(|_| {
						ModelError::Unpack(UnpackError::TypeMismatch {
							expected: stringify!($t),
							found: "json value",
						})
					})
				}

				fn dict_key_encode(&self) -> String {
					self.to_string()
				}

				fn dict_key_decode(s: &str) -> Result<Self, ModelError> {
					s.parse().map_err(|_| {
						ModelError::Unpack(UnpackError::TypeMismatch { expected: stringify!($t), found: "string key" })
					})
				}

				fn bin_encode(&self, buf: &mut Vec<u8>) {
					buf.extend_from_slice(&self.to_be_bytes());
				}

				fn bin_decode(cur: &mut Cursor<&[u8]>) -> Result<Self, ModelError> {
					let mut bytes = [0u8; std::mem::size_of::<$t>()];
					cur.read_exact(&mut bytes).map_err(|_| ModelError::Unpack(UnpackError::UnexpectedEof))?;
					Ok(<$t>::from_be_bytes(bytes))
				}
			}
		)+
	};
}

impl_big_endian_codec!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);
