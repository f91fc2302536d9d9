use fxhash::{FxHashMap, FxHashSet};

use crate::oid::OidValue;

/// Describes where an unresolved reference was found, so the caller can
/// decide what to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLocator {
	pub record_type: &'static str,
	pub field_name: &'static str,
	/// Set when the reference was found inside an `Array`/`Map`/`IdMap`
	/// element rather than directly on a scalar field.
	pub element_key: Option<String>,
}

impl RefLocator {
	pub fn field(record_type: &'static str, field_name: &'static str) -> Self {
		RefLocator { record_type, field_name, element_key: None }
	}

	pub fn element(record_type: &'static str, field_name: &'static str, key: impl Into<String>) -> Self {
		RefLocator { record_type, field_name, element_key: Some(key.into()) }
	}
}

/// A caller-supplied resolver, authoritative over `DecodeContext::known_objects`
/// when present: checked first, with the context's own registry of objects
/// seen so far as the fallback.
pub trait ResolveRef {
	fn resolve(&self, oid: &OidValue) -> bool;
}

impl<F: Fn(&OidValue) -> bool> ResolveRef for F {
	fn resolve(&self, oid: &OidValue) -> bool {
		self(oid)
	}
}

/// Accumulates decoded object identities and pending reference sites across
/// one top-level `unpack_dict`/`unpack_bin` call tree, then performs the
/// second pass that resolves (or reports unresolved) every reference.
#[derive(Default)]
pub struct DecodeContext {
	known_objects: FxHashSet<OidValue>,
	resolver: Option<Box<dyn ResolveRef>>,
	pending: Vec<(RefLocator, OidValue)>,
}

impl DecodeContext {
	pub fn new() -> Self {
		DecodeContext::default()
	}

	pub fn with_resolver(resolver: impl ResolveRef + 'static) -> Self {
		DecodeContext { known_objects: FxHashSet::default(), resolver: Some(Box::new(resolver)), pending: Vec::new() }
	}

	/// Registers a record's oid as known, as soon as it is constructed during
	/// decode — called by generated `unpack_*` bodies for every record that
	/// declares an `oid` field.
	pub fn register_known(&mut self, oid: OidValue) {
		self.known_objects.insert(oid);
	}

	pub fn is_known(&self, oid: &OidValue) -> bool {
		self.known_objects.contains(oid)
	}

	/// Records a reference site to resolve once the whole call tree has run.
	pub fn register_pending(&mut self, locator: RefLocator, oid: OidValue) {
		self.pending.push((locator, oid));
	}

	/// Resolves every pending reference, preferring the caller-supplied
	/// resolver when present and falling back to `known_objects` otherwise.
	/// Consumes `self`; whatever remains unresolved is returned keyed by oid.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(pending = self.pending.len())))]
	pub fn into_unsolved(mut self) -> FxHashMap<OidValue, Vec<RefLocator>> {
		let mut unsolved: FxHashMap<OidValue, Vec<RefLocator>> = FxHashMap::default();
		for (locator, oid) in self.pending.drain(..) {
			let resolved = match &self.resolver {
				Some(resolver) => resolver.resolve(&oid),
				None => self.known_objects.contains(&oid),
			};
			if !resolved {
				#[cfg(feature = "tracing")]
				tracing::debug!(?oid, record_type = locator.record_type, field = locator.field_name, "unresolved reference");
				unsolved.entry(oid).or_default().push(locator);
			}
		}
		#[cfg(feature = "tracing")]
		tracing::debug!(unsolved = unsolved.len(), "reference resolution pass complete");
		unsolved
	}
}

impl std::fmt::Debug for DecodeContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DecodeContext")
			.field("known_objects", &self.known_objects.len())
			.field("pending", &self.pending.len())
			.field("has_resolver", &self.resolver.is_some())
			.finish()
	}
}
