use std::collections::{BTreeMap, BTreeSet};

use crate::oid::OidValue;
use crate::record::Record;

/// A map of child records keyed by each child's own `oid` field, rather than
/// an explicitly supplied key. On encode, the child's `oid` field is omitted
/// from its own payload (it's already the map key); on decode, the child's
/// `oid` field is set from the key.
#[derive(Debug, Clone, Default)]
pub struct IdMap<T: Record> {
	items: BTreeMap<OidValue, T>,
	changed: bool,
	removed: BTreeSet<OidValue>,
}

impl<T: Record> IdMap<T> {
	pub fn new() -> Self {
		IdMap { items: BTreeMap::new(), changed: false, removed: BTreeSet::new() }
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn changed(&self) -> bool {
		self.changed
	}

	pub fn removed_keys(&self) -> &BTreeSet<OidValue> {
		&self.removed
	}

	pub fn clear_changed(&mut self) {
		self.changed = false;
		self.removed.clear();
	}

	pub fn get(&self, oid: &OidValue) -> Option<&T> {
		self.items.get(oid)
	}

	pub fn get_mut(&mut self, oid: &OidValue) -> Option<&mut T> {
		self.changed = true;
		self.items.get_mut(oid)
	}

	pub fn contains(&self, oid: &OidValue) -> bool {
		self.items.contains_key(oid)
	}

	pub fn iter(&self) -> std::collections::btree_map::Iter<'_, OidValue, T> {
		self.items.iter()
	}

	/// Inserts a child keyed by its own `oid()`. Panics (a programmer error,
	/// not a runtime data error) if the child has no oid set.
	pub fn add(&mut self, obj: T) -> Option<T> {
		let oid = obj.oid().expect("IdMap element must have its oid field set before insertion");
		self.changed = true;
		self.removed.remove(&oid);
		self.items.insert(oid, obj)
	}

	pub fn remove(&mut self, oid: &OidValue) -> Option<T> {
		let removed = self.items.remove(oid);
		if removed.is_some() {
			self.changed = true;
			self.removed.insert(oid.clone());
		}
		removed
	}

	pub fn raw_set(&mut self, oid: OidValue, value: T) {
		self.items.insert(oid, value);
	}

	/// Mutable lookup that does not mark the container changed, for
	/// `Sync`-mode decode splicing into an existing child in place.
	pub fn raw_get_mut(&mut self, oid: &OidValue) -> Option<&mut T> {
		self.items.get_mut(oid)
	}

	pub fn raw_remove(&mut self, oid: &OidValue) -> Option<T> {
		self.items.remove(oid)
	}

	pub fn reset_decoded(&mut self) {
		self.items.clear();
	}

	/// Mutable iteration that does not mark the container changed. Used by
	/// generated `clear_changed`/`has_changed` recursion to reach each
	/// child's own nested state.
	pub fn iter_mut_unmarked(&mut self) -> std::collections::btree_map::IterMut<'_, OidValue, T> {
		self.items.iter_mut()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::oid::OidValue;
	use crate::test_support::TestChild;

	#[test]
	fn add_keys_by_oid() {
		let mut m: IdMap<TestChild> = IdMap::new();
		let mut child = TestChild::default();
		child.set_id("a".to_owned());
		m.add(child);
		assert!(m.contains(&OidValue::Str("a".to_owned())));
		assert!(m.changed());
	}

	#[test]
	fn remove_adds_tombstone() {
		let mut m: IdMap<TestChild> = IdMap::new();
		let mut child = TestChild::default();
		child.set_id("a".to_owned());
		m.add(child);
		m.clear_changed();
		m.remove(&OidValue::Str("a".to_owned()));
		assert!(m.removed_keys().contains(&OidValue::Str("a".to_owned())));
	}
}
