use bitflags::bitflags;

bitflags! {
	/// Per-field behavior flags: container shape, arithmetic helpers, oid
	/// identity, and the other bits a generated accessor needs to know about
	/// a field at codec time.
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct FieldFlags: u32 {
		const ARRAY        = 0x0001;
		const MAP          = 0x0002;
		const ID_MAP       = 0x0004;
		const REF          = 0x0008;
		const ARITHM       = 0x0010;
		const SKIP_CHANGED = 0x0020;
		const OID          = 0x0040;
		const HAS_MIN_VALUE = 0x0080;
		const HAS_CREATE   = 0x0100;
	}
}

impl FieldFlags {
	pub fn is_container(self) -> bool {
		self.intersects(FieldFlags::ARRAY | FieldFlags::MAP | FieldFlags::ID_MAP)
	}
}

/// Immutable metadata for one declared field of a record type. Built once by
/// the `#[derive(Record)]` expansion and stored in the type's `FieldsDefine`.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
	pub index: u16,
	pub name: &'static str,
	pub storage_key: &'static str,
	pub rust_type: &'static str,
	pub key_type: Option<&'static str>,
	pub flags: FieldFlags,
	pub min_value: Option<i64>,
	pub desc: &'static str,
}

impl FieldDescriptor {
	pub const fn new(index: u16, name: &'static str, storage_key: &'static str, rust_type: &'static str) -> Self {
		FieldDescriptor {
			index,
			name,
			storage_key,
			rust_type,
			key_type: None,
			flags: FieldFlags::empty(),
			min_value: None,
			desc: "",
		}
	}

	pub const fn with_flags(mut self, flags: FieldFlags) -> Self {
		self.flags = flags;
		self
	}

	pub const fn with_key_type(mut self, key_type: &'static str) -> Self {
		self.key_type = Some(key_type);
		self
	}

	pub const fn with_min_value(mut self, min_value: i64) -> Self {
		self.min_value = Some(min_value);
		self.flags = FieldFlags::from_bits_truncate(self.flags.bits() | FieldFlags::HAS_MIN_VALUE.bits());
		self
	}

	pub const fn with_desc(mut self, desc: &'static str) -> Self {
		self.desc = desc;
		self
	}

	pub fn is_array(&self) -> bool {
		self.flags.contains(FieldFlags::ARRAY)
	}
	pub fn is_map(&self) -> bool {
		self.flags.contains(FieldFlags::MAP)
	}
	pub fn is_id_map(&self) -> bool {
		self.flags.contains(FieldFlags::ID_MAP)
	}
	pub fn is_ref(&self) -> bool {
		self.flags.contains(FieldFlags::REF)
	}
	pub fn is_arithm(&self) -> bool {
		self.flags.contains(FieldFlags::ARITHM)
	}
	pub fn is_skip_changed(&self) -> bool {
		self.flags.contains(FieldFlags::SKIP_CHANGED)
	}
	pub fn is_oid(&self) -> bool {
		self.flags.contains(FieldFlags::OID)
	}
}
