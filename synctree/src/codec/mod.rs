use std::io::{Cursor, Read};

use crate::error::{ModelError, UnpackError};

pub mod binary;

/// One implementation per primitive type provides both codec directions for
/// both wire formats. Dispatch is monomorphized: the derive macro calls the
/// right `WireCodec` method directly for each field, rather than looking up a
/// function pointer on a dynamic descriptor.
pub trait WireCodec: Sized {
	fn dict_encode(&self) -> serde_json::Value;
	fn dict_decode(v: &serde_json::Value) -> Result<Self, ModelError>;
	fn dict_key_encode(&self) -> String;
	fn dict_key_decode(s: &str) -> Result<Self, ModelError>;
	fn bin_encode(&self, buf: &mut Vec<u8>);
	fn bin_decode(cur: &mut Cursor<&[u8]>) -> Result<Self, ModelError>;
}

impl WireCodec for bool {
	fn dict_encode(&self) -> serde_json::Value {
		serde_json::Value::Bool(*self)
	}

	fn dict_decode(v: &serde_json::Value) -> Result<Self, ModelError> {
		v.as_bool()
			.ok_or(ModelError::Unpack(UnpackError::TypeMismatch { expected: "bool", found: "json value" }))
	}

	fn dict_key_encode(&self) -> String {
		self.to_string()
	}

	fn dict_key_decode(s: &str) -> Result<Self, ModelError> {
		match s {
			"true" => Ok(true),
			"false" => Ok(false),
			_ => Err(ModelError::Unpack(UnpackError::TypeMismatch { expected: "bool", found: "string key" })),
		}
	}

	fn bin_encode(&self, buf: &mut Vec<u8>) {
		buf.push(if *self { 1 } else { 0 });
	}

	fn bin_decode(cur: &mut Cursor<&[u8]>) -> Result<Self, ModelError> {
		Ok(binary::read_u8(cur)? != 0)
	}
}

impl WireCodec for String {
	fn dict_encode(&self) -> serde_json::Value {
		serde_json::Value::String(self.clone())
	}

	fn dict_decode(v: &serde_json::Value) -> Result<Self, ModelError> {
		v.as_str()
			.map(str::to_owned)
			.ok_or(ModelError::Unpack(UnpackError::TypeMismatch { expected: "string", found: "json value" }))
	}

	fn dict_key_encode(&self) -> String {
		self.clone()
	}

	fn dict_key_decode(s: &str) -> Result<Self, ModelError> {
		Ok(s.to_owned())
	}

	fn bin_encode(&self, buf: &mut Vec<u8>) {
		let bytes = self.as_bytes();
		debug_assert!(bytes.len() <= u16::MAX as usize, "caller must check_string_len before encoding");
		buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
		buf.extend_from_slice(bytes);
	}

	fn bin_decode(cur: &mut Cursor<&[u8]>) -> Result<Self, ModelError> {
		let len = binary::read_u16(cur)? as usize;
		let mut bytes = vec![0u8; len];
		cur.read_exact(&mut bytes).map_err(|_| ModelError::Unpack(UnpackError::UnexpectedEof))?;
		String::from_utf8(bytes).map_err(|_| ModelError::Unpack(UnpackError::TypeMismatch { expected: "utf-8 string", found: "invalid bytes" }))
	}
}

/// Validates a string's wire length before it is handed to `bin_encode`,
/// raising the `StringTooLong` guard from the error taxonomy rather than
/// silently truncating.
pub fn check_string_len(s: &str) -> Result<(), ModelError> {
	if s.len() > u16::MAX as usize {
		Err(ModelError::StringTooLong(s.len()))
	} else {
		Ok(())
	}
}
