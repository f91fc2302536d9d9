use fxhash::FxHashMap;

use crate::error::{DefineError, ModelError};
use crate::field::FieldDescriptor;

/// The field table for one record type, plus lookup indexes by wire index,
/// name and storage key.
#[derive(Debug, Clone)]
pub struct FieldsDefine {
	fields: Vec<FieldDescriptor>,
	by_index: FxHashMap<u16, usize>,
	by_name: FxHashMap<&'static str, usize>,
}

impl FieldsDefine {
	/// Builds a field table from this type's own declared fields.
	pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, DefineError> {
		Self::merge(Vec::new(), fields)
	}

	/// Builds a field table by prepending an ancestor's fields ahead of this
	/// type's own declared fields ("first match wins" on name/index conflicts
	/// is enforced as a hard duplicate error instead, since a silently shadowed
	/// wire index would make the binary format ambiguous).
	pub fn merge(ancestor_fields: Vec<FieldDescriptor>, own_fields: Vec<FieldDescriptor>) -> Result<Self, DefineError> {
		let mut fields = ancestor_fields;
		fields.extend(own_fields);

		let mut by_index = FxHashMap::default();
		let mut by_name = FxHashMap::default();

		for (i, field) in fields.iter().enumerate() {
			if field.index == 0 {
				return Err(DefineError::InvalidIndex(field.index as u32));
			}
			if by_index.insert(field.index, i).is_some() {
				return Err(DefineError::DuplicateIndex(field.index));
			}
			if by_name.insert(field.name, i).is_some() {
				return Err(DefineError::DuplicateName(field.name));
			}
			let container_flags = [field.is_array(), field.is_map(), field.is_id_map()]
				.into_iter()
				.filter(|b| *b)
				.count();
			if container_flags > 1 {
				return Err(DefineError::ConflictingContainerFlags);
			}
		}

		Ok(FieldsDefine { fields, by_index, by_name })
	}

	pub fn fields(&self) -> &[FieldDescriptor] {
		&self.fields
	}

	pub fn by_index(&self, index: u16) -> Option<&FieldDescriptor> {
		self.by_index.get(&index).map(|&i| &self.fields[i])
	}

	pub fn by_name(&self, name: &str) -> Option<&FieldDescriptor> {
		self.by_name.get(name).map(|&i| &self.fields[i])
	}

	/// Same lookup as [`Self::by_name`], but for the programmatic-access
	/// callers that need a hard error (rather than a silent no-op) when asked
	/// about a name the schema never declared.
	pub fn require_by_name(&self, name: &str) -> Result<&FieldDescriptor, ModelError> {
		self.by_name(name).ok_or_else(|| ModelError::NoField(name.to_owned()))
	}

	pub fn oid_field(&self) -> Option<&FieldDescriptor> {
		self.fields.iter().find(|f| f.is_oid())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::field::FieldFlags;

	fn f(index: u16, name: &'static str) -> FieldDescriptor {
		FieldDescriptor::new(index, name, "_x", "i32")
	}

	#[test]
	fn rejects_duplicate_index() {
		let err = FieldsDefine::new(vec![f(1, "a"), f(1, "b")]).unwrap_err();
		assert!(matches!(err, DefineError::DuplicateIndex(1)));
	}

	#[test]
	fn rejects_duplicate_name() {
		let err = FieldsDefine::new(vec![f(1, "a"), f(2, "a")]).unwrap_err();
		assert!(matches!(err, DefineError::DuplicateName("a")));
	}

	#[test]
	fn rejects_conflicting_container_flags() {
		let bad = f(1, "a").with_flags(FieldFlags::ARRAY | FieldFlags::MAP);
		let err = FieldsDefine::new(vec![bad]).unwrap_err();
		assert!(matches!(err, DefineError::ConflictingContainerFlags));
	}

	#[test]
	fn merge_prepends_ancestor_fields() {
		let define = FieldsDefine::merge(vec![f(1, "parent_field")], vec![f(2, "own_field")]).unwrap();
		assert_eq!(define.fields().len(), 2);
		assert_eq!(define.by_name("parent_field").unwrap().index, 1);
		assert_eq!(define.by_index(2).unwrap().name, "own_field");
	}

	#[test]
	fn require_by_name_raises_no_field_for_unknown_name() {
		let define = FieldsDefine::new(vec![f(1, "a")]).unwrap();
		assert!(define.require_by_name("a").is_ok());
		let err = define.require_by_name("missing").unwrap_err();
		assert!(matches!(err, crate::error::ModelError::NoField(name) if name == "missing"));
	}
}
