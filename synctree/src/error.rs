use std::fmt::{Display, Formatter};

/// Every fallible operation in this crate returns one flat error type: a
/// plain enum with hand-written `Display`/`From` impls, no `thiserror`.
#[derive(Debug)]
pub enum ModelError {
	Define(DefineError),
	Operate(&'static str),
	NoField(String),
	OverflowLower,
	StringTooLong(usize),
	Pack(PackError),
	Unpack(UnpackError),
	Io(std::io::Error),
}

#[derive(Debug)]
pub enum DefineError {
	UnsupportedType(&'static str),
	InvalidIndex(u32),
	ConflictingContainerFlags,
	RefOnNonRecord,
	ArithmOnNonNumber,
	DuplicateName(&'static str),
	DuplicateIndex(u16),
}

#[derive(Debug)]
pub enum PackError {
	UnknownFormat(&'static str),
	UnknownFieldIndex(u16),
	MalformedContainerHead(u8),
}

#[derive(Debug)]
pub enum UnpackError {
	TypeMismatch { expected: &'static str, found: &'static str },
	UnexpectedEof,
}

impl Display for ModelError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ModelError::Define(e) => write!(f, "schema definition error: {:?}", e),
			ModelError::Operate(msg) => write!(f, "invalid operation: {}", msg),
			ModelError::NoField(name) => write!(f, "no such field: {}", name),
			ModelError::OverflowLower => write!(f, "arithmetic operation would underflow the field's lower bound"),
			ModelError::StringTooLong(len) => write!(f, "string of {} bytes exceeds the 65535 byte wire limit", len),
			ModelError::Pack(e) => write!(f, "pack error: {:?}", e),
			ModelError::Unpack(e) => write!(f, "unpack error: {:?}", e),
			ModelError::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for ModelError {}

impl From<std::io::Error> for ModelError {
	fn from(value: std::io::Error) -> Self {
		ModelError::Io(value)
	}
}

impl From<DefineError> for ModelError {
	fn from(value: DefineError) -> Self {
		ModelError::Define(value)
	}
}

impl From<PackError> for ModelError {
	fn from(value: PackError) -> Self {
		ModelError::Pack(value)
	}
}

impl From<UnpackError> for ModelError {
	fn from(value: UnpackError) -> Self {
		ModelError::Unpack(value)
	}
}
