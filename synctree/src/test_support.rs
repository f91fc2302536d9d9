//! Minimal record types shared by unit tests across this crate. Not part of
//! the public API; gated `#[cfg(test)]` from `lib.rs`.

use crate::dirty::DirtySet;
use synctree_derive::Record;

#[derive(Debug, Clone, Default, Record)]
pub struct TestChild {
	_dirty: DirtySet,
	#[field(index = 1, oid)]
	_id: String,
	#[field(index = 2)]
	_value: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
pub struct Point {
	_dirty: DirtySet,
	#[field(index = 1)]
	_x: i32,
	#[field(index = 2)]
	_y: i32,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Rect {
	_dirty: DirtySet,
	#[field(index = 1)]
	_lt: Point,
	#[field(index = 2)]
	_rb: Point,
}
