use std::io::Cursor;

use crate::context::DecodeContext;
use crate::dirty::DirtySet;
use crate::error::ModelError;
use crate::oid::OidValue;
use crate::protocol::Protocol;

/// A predicate over field name/index used to restrict which fields a pack
/// call visits. Boxed rather than generic so `PackOptions` stays nameable.
pub struct FieldFilter(Box<dyn Fn(&str, u16) -> bool>);

impl FieldFilter {
	pub fn new(f: impl Fn(&str, u16) -> bool + 'static) -> Self {
		FieldFilter(Box::new(f))
	}

	pub fn allows(&self, name: &str, index: u16) -> bool {
		(self.0)(name, index)
	}
}

impl std::fmt::Debug for FieldFilter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("FieldFilter(..)")
	}
}

/// Options governing one `pack_dict`/`pack_bin` call.
#[derive(Debug, Default)]
pub struct PackOptions {
	pub recursive: bool,
	pub only_changed: bool,
	pub clear_changed: bool,
	pub field_filter: Option<FieldFilter>,
	pub fields: Option<Vec<String>>,
	pub exclude_oid: bool,
}

impl PackOptions {
	pub fn new() -> Self {
		PackOptions { recursive: true, only_changed: false, clear_changed: false, field_filter: None, fields: None, exclude_oid: false }
	}

	pub fn only_changed(mut self) -> Self {
		self.only_changed = true;
		self
	}

	pub fn clear_changed(mut self) -> Self {
		self.clear_changed = true;
		self
	}

	pub fn exclude_oid(mut self) -> Self {
		self.exclude_oid = true;
		self
	}

	pub fn with_fields(mut self, fields: Vec<String>) -> Self {
		self.fields = Some(fields);
		self
	}

	pub fn with_field_filter(mut self, filter: FieldFilter) -> Self {
		self.field_filter = Some(filter);
		self
	}

	pub(crate) fn should_visit(&self, name: &str, index: u16) -> bool {
		if let Some(fields) = &self.fields {
			if !fields.iter().any(|f| f == name) {
				return false;
			}
		}
		if let Some(filter) = &self.field_filter {
			if !filter.allows(name, index) {
				return false;
			}
		}
		true
	}
}

/// Decode strategy for containers and nested records (§4.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnpackMode {
	/// Rebuild containers/sub-records wholesale; a `null` element is absent,
	/// not a deletion.
	#[default]
	Override,
	/// Update containers/sub-records in place; a `null` map/id-map entry
	/// deletes that key.
	Sync,
}

/// Options governing one `unpack_dict`/`unpack_bin` call.
#[derive(Default)]
pub struct UnpackOptions {
	pub mode: UnpackMode,
	pub mark_change: bool,
}

impl UnpackOptions {
	pub fn new() -> Self {
		UnpackOptions { mode: UnpackMode::Override, mark_change: false }
	}

	pub fn sync(mut self) -> Self {
		self.mode = UnpackMode::Sync;
		self
	}

	pub fn mark_change(mut self) -> Self {
		self.mark_change = true;
		self
	}
}

/// The common surface every `#[derive(Record)]` type implements. The derive
/// macro generates the body of every method here; the trait itself is the
/// stable seam the codecs and containers program against.
pub trait Record: std::fmt::Debug {
	fn protocol(&self) -> &'static Protocol;
	fn dirty(&self) -> &DirtySet;
	fn dirty_mut(&mut self) -> &mut DirtySet;
	fn oid(&self) -> Option<OidValue>;

	/// Which `OidValue` variant this type's `oid` field parses into, so a
	/// bare string id (e.g. an `IdMap` key read back from the structural
	/// format) can be turned back into the right variant. Panics if the
	/// type declares no `oid` field; only ever called on types that do.
	fn oid_kind() -> crate::oid::OidKind
	where
		Self: Sized;

	/// Takes `&mut self`, not `&self`: when `opts.clear_changed` is set,
	/// packing also clears the `DirtySet` and every container `changed`/
	/// `removed` flag touched during the walk. Mirroring that in an `&self`
	/// signature would mean threading `Cell`s through every dirty-tracking
	/// primitive in the crate for the sake of one call mode; taking `&mut
	/// self` here is the ordinary Rust shape for "this call may mutate".
	fn pack_dict(&mut self, opts: &PackOptions) -> serde_json::Value;
	/// Unlike `pack_dict`, this can fail: a `string` field whose length does
	/// not fit the wire format's `uint16` length prefix raises `StringTooLong`
	/// instead of silently truncating.
	fn pack_bin(&mut self, opts: &PackOptions, buf: &mut Vec<u8>) -> Result<(), ModelError>;
	fn unpack_dict(&mut self, src: &serde_json::Value, opts: &UnpackOptions, ctx: &mut DecodeContext) -> Result<(), ModelError>;
	fn unpack_bin(&mut self, cur: &mut Cursor<&[u8]>, opts: &UnpackOptions, ctx: &mut DecodeContext) -> Result<(), ModelError>;

	fn has_changed(&self, name: Option<&str>, recursive: bool) -> bool;
	fn clear_changed(&mut self, names: &[&str], recursive: bool);
	fn set_changed(&mut self, names: &[&str]);
	fn clear_data(&mut self);

	/// Appends every nested record reachable from `self` (direct sub-record
	/// fields, and elements of `Array`/`Map`/`IdMap` fields of record type)
	/// that currently reports changed. Used by callers that want to walk a
	/// changed subtree without re-deriving it from `has_changed` paths.
	fn collect_changed_records<'a>(&'a self, out: &mut Vec<&'a dyn Record>);
}
