use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Expr, Field, Fields, GenericArgument, LitInt, LitStr, Path, PathArguments, Type};

const PRIMITIVES: &[&str] = &["i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64", "f32", "f64", "bool", "String"];

enum Kind {
	Scalar,
	Record,
	Ref,
	Array(Type),
	Map(Type, Type),
	IdMap(Type),
}

struct Spec {
	ident: syn::Ident,
	name: String,
	ty: Type,
	index: u16,
	kind: Kind,
	min_value: Option<i64>,
	arithm: bool,
	skip_changed: bool,
	is_oid: bool,
	ref_type: Option<Path>,
	create: Option<Path>,
	desc: String,
	default: Option<Expr>,
}

fn last_ident(ty: &Type) -> Option<&syn::Ident> {
	match ty {
		Type::Path(p) => p.path.segments.last().map(|s| &s.ident),
		_ => None,
	}
}

fn is_primitive_type(ty: &Type) -> bool {
	matches!(last_ident(ty).map(|i| i.to_string()).as_deref(), Some(name) if PRIMITIVES.contains(&name))
}

fn generic_args(ty: &Type) -> Vec<Type> {
	let Type::Path(p) = ty else { return Vec::new() };
	let Some(seg) = p.path.segments.last() else { return Vec::new() };
	let PathArguments::AngleBracketed(args) = &seg.arguments else { return Vec::new() };
	args.args
		.iter()
		.filter_map(|a| match a {
			GenericArgument::Type(t) => Some(t.clone()),
			_ => None,
		})
		.collect()
}

fn classify(ty: &Type, forced_ref: bool) -> Kind {
	if forced_ref {
		return Kind::Ref;
	}
	match last_ident(ty).map(|i| i.to_string()).as_deref() {
		Some("Array") => {
			let args = generic_args(ty);
			Kind::Array(args.into_iter().next().expect("Array<T> field requires one generic argument"))
		},
		Some("Map") => {
			let mut args = generic_args(ty).into_iter();
			let k = args.next().expect("Map<K, V> field requires a key type");
			let v = args.next().expect("Map<K, V> field requires a value type");
			Kind::Map(k, v)
		},
		Some("IdMap") => {
			let args = generic_args(ty);
			Kind::IdMap(args.into_iter().next().expect("IdMap<T> field requires one generic argument"))
		},
		Some(name) if PRIMITIVES.contains(&name) => Kind::Scalar,
		_ => Kind::Record,
	}
}

fn has_meta_key(field: &Field, key: &str) -> bool {
	field.attrs.iter().any(|attr| {
		if !attr.path().is_ident("field") {
			return false;
		}
		let mut found = false;
		let _ = attr.parse_nested_meta(|meta| {
			if meta.path.is_ident(key) {
				found = true;
			}
			Ok(())
		});
		found
	})
}

/// Reads `#[field(...)]` off one struct field. Fields without a `#[field]`
/// attribute are not schema fields: either the `DirtySet` storage slot
/// (conventionally named `_dirty`) or an embedded base record tagged
/// `#[field(base)]`, both filtered out by the caller before this runs.
fn parse_field(field: &Field) -> Option<Spec> {
	let ident = field.ident.clone()?;
	if !field.attrs.iter().any(|a| a.path().is_ident("field")) {
		return None;
	}

	let mut index = None;
	let mut min_value = None;
	let mut arithm = false;
	let mut skip_changed = false;
	let mut is_oid = false;
	let mut is_ref = false;
	let mut ref_type = None;
	let mut create = None;
	let mut desc = String::new();
	let mut rename = None;
	let mut default = None;

	for attr in &field.attrs {
		if !attr.path().is_ident("field") {
			continue;
		}
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("index") {
				let lit: LitInt = meta.value()?.parse()?;
				index = Some(lit.base10_parse::<u16>()?);
			} else if meta.path.is_ident("min_value") {
				let lit: LitInt = meta.value()?.parse()?;
				min_value = Some(lit.base10_parse::<i64>()?);
			} else if meta.path.is_ident("arithm") {
				arithm = true;
			} else if meta.path.is_ident("skip_changed") {
				skip_changed = true;
			} else if meta.path.is_ident("oid") {
				is_oid = true;
			} else if meta.path.is_ident("ref") {
				is_ref = true;
			} else if meta.path.is_ident("ref_type") {
				let lit: LitStr = meta.value()?.parse()?;
				ref_type = Some(syn::parse_str::<Path>(&lit.value())?);
			} else if meta.path.is_ident("create") {
				let lit: LitStr = meta.value()?.parse()?;
				create = Some(syn::parse_str::<Path>(&lit.value())?);
			} else if meta.path.is_ident("desc") {
				let lit: LitStr = meta.value()?.parse()?;
				desc = lit.value();
			} else if meta.path.is_ident("rename") {
				let lit: LitStr = meta.value()?.parse()?;
				rename = Some(lit.value());
			} else if meta.path.is_ident("default") {
				default = Some(meta.value()?.parse::<Expr>()?);
			} else if meta.path.is_ident("base") {
				// handled by the caller, before `parse_field` ever sees this field
			} else {
				return Err(meta.error("unrecognized #[field(...)] key"));
			}
			Ok(())
		})
		.expect("malformed #[field(...)] attribute");
	}

	let index = index.expect("#[field(index = N)] is required");
	let name = rename.unwrap_or_else(|| {
		ident
			.to_string()
			.strip_prefix('_')
			.expect("schema fields must be named `_<name>` (the storage-key convention)")
			.to_owned()
	});

	if is_ref && ref_type.is_none() {
		panic!("field `{}` is declared `ref` but has no `#[field(ref_type = \"...\")]`", name);
	}

	let kind = classify(&field.ty, is_ref);
	if arithm && !matches!(kind, Kind::Scalar) {
		panic!("field `{}` is declared `arithm` but is not a numeric scalar field", name);
	}
	if arithm {
		let scalar_name = last_ident(&field.ty).map(|i| i.to_string());
		if matches!(scalar_name.as_deref(), Some("bool") | Some("String") | None) {
			panic!("field `{}` is declared `arithm` but its type is not a number", name);
		}
	}

	Some(Spec {
		kind,
		ident,
		name,
		ty: field.ty.clone(),
		index,
		min_value,
		arithm,
		skip_changed,
		is_oid,
		ref_type,
		create,
		desc,
		default,
	})
}

fn flags_tokens(s: &Spec) -> TokenStream {
	let mut flags = Vec::new();
	match &s.kind {
		Kind::Array(_) => flags.push(quote!(::synctree::FieldFlags::ARRAY)),
		Kind::Map(_, _) => flags.push(quote!(::synctree::FieldFlags::MAP)),
		Kind::IdMap(_) => flags.push(quote!(::synctree::FieldFlags::ID_MAP)),
		Kind::Ref => flags.push(quote!(::synctree::FieldFlags::REF)),
		Kind::Scalar | Kind::Record => {},
	}
	if s.arithm {
		flags.push(quote!(::synctree::FieldFlags::ARITHM));
	}
	if s.skip_changed {
		flags.push(quote!(::synctree::FieldFlags::SKIP_CHANGED));
	}
	if s.is_oid {
		flags.push(quote!(::synctree::FieldFlags::OID));
	}
	if flags.is_empty() {
		quote!(::synctree::FieldFlags::empty())
	} else {
		quote!(#(#flags)|*)
	}
}

fn rust_type_name(ty: &Type) -> String {
	quote!(#ty).to_string().replace(' ', "")
}

fn field_descriptor_tokens(s: &Spec) -> TokenStream {
	let name = &s.name;
	let storage_key = format!("_{name}");
	let rust_type = rust_type_name(&s.ty);
	let flags = flags_tokens(s);
	let desc = &s.desc;
	let key_type = match &s.kind {
		Kind::Map(k, _) => {
			let kt = rust_type_name(k);
			quote!(.with_key_type(#kt))
		},
		Kind::IdMap(_) => quote!(.with_key_type("oid")),
		_ => quote!(),
	};
	let min_value = match s.min_value {
		Some(v) => quote!(.with_min_value(#v)),
		None => quote!(),
	};
	let index = s.index;
	quote! {
		::synctree::FieldDescriptor::new(#index, #name, #storage_key, #rust_type)
			.with_flags(#flags)
			#key_type
			#min_value
			.with_desc(#desc)
	}
}

fn field_accessors(s: &Spec, dirty: &syn::Ident) -> TokenStream {
	let field_ident = &s.ident;
	let name = format_ident!("{}", s.name);
	let set_name = format_ident!("set_{}", s.name);
	let index = s.index;
	// `skip_changed` fields never enter the DirtySet (§4.3): they must
	// always report "not changed", which only holds if nothing ever sets
	// their bit in the first place.
	let mark_dirty = if s.skip_changed { quote!() } else { quote!(self.#dirty.set_dirty(#index);) };

	match &s.kind {
		Kind::Scalar => {
			let ty = &s.ty;
			let default_expr = s.default.clone().map(|e| quote!(#e)).unwrap_or_else(|| quote!(<#ty as ::std::default::Default>::default()));
			let mut out = quote! {
				pub fn #name(&self) -> #ty {
					self.#field_ident.clone()
				}

				pub fn #set_name(&mut self, value: #ty) {
					if self.#field_ident != value {
						self.#field_ident = value;
						#mark_dirty
					}
				}

				/// Resets this field to its declared default and marks it
				/// dirty. A struct field cannot be "unset" the way a dynamic
				/// attribute slot can be dropped; resetting to default plus
				/// dirtying is the closest equivalent.
				pub fn clear_field(&mut self) {
					self.#field_ident = #default_expr;
					#mark_dirty
				}
			};
			if s.arithm {
				let add_name = format_ident!("add_{}", s.name);
				let sub_name = format_ident!("sub_{}", s.name);
				let type_name = last_ident(&s.ty).map(|i| i.to_string());
				let is_unsigned = matches!(type_name.as_deref(), Some("u8") | Some("u16") | Some("u32") | Some("u64"));
				let is_float = matches!(type_name.as_deref(), Some("f32") | Some("f64"));
				// Floats have no `wrapping_add`/`wrapping_sub`; plain arithmetic
				// is the only sensible "checked" story for them anyway, since
				// there's no representable-range floor to wrap around.
				let (add_expr, sub_expr) =
					if is_float { (quote!(old + value), quote!(old - value)) } else { (quote!(old.wrapping_add(value)), quote!(old.wrapping_sub(value))) };
				let min_check = match s.min_value {
					Some(min) => quote! {
						let min: #ty = (#min) as #ty;
						if new < min {
							return Err(::synctree::ModelError::OverflowLower);
						}
					},
					None if is_unsigned => quote! {
						if new < <#ty as ::std::default::Default>::default() {
							return Err(::synctree::ModelError::OverflowLower);
						}
					},
					// Signed types (and floats) with no declared lower bound:
					// plain checked arithmetic, no floor.
					None => quote!(),
				};
				out.extend(quote! {
					pub fn #add_name(&mut self, value: #ty) -> (#ty, #ty) {
						let old = self.#field_ident;
						let new = #add_expr;
						self.#set_name(new);
						(value, new)
					}

					pub fn #sub_name(&mut self, value: #ty) -> Result<(#ty, #ty), ::synctree::ModelError> {
						let old = self.#field_ident;
						let new = #sub_expr;
						#min_check
						self.#set_name(new);
						Ok((value, new))
					}
				});
			}
			out
		},
		Kind::Ref => quote! {
			pub fn #name(&self) -> Option<&::synctree::OidValue> {
				self.#field_ident.as_ref()
			}

			pub fn #set_name(&mut self, value: Option<::synctree::OidValue>) {
				if self.#field_ident != value {
					self.#field_ident = value;
					#mark_dirty
				}
			}
		},
		Kind::Record => {
			let ty = &s.ty;
			let mut_name = format_ident!("{}_mut", s.name);
			quote! {
				pub fn #name(&self) -> &#ty {
					&self.#field_ident
				}

				/// Does not mark this field dirty on its own: in-place
				/// mutation through the returned reference is tracked by the
				/// sub-record's own `DirtySet`, which recursive delta encode
				/// already descends into.
				pub fn #mut_name(&mut self) -> &mut #ty {
					&mut self.#field_ident
				}

				pub fn #set_name(&mut self, value: #ty) {
					self.#field_ident = value;
					#mark_dirty
				}
			}
		},
		Kind::Array(elem) => {
			let mut_name = format_ident!("{}_mut", s.name);
			quote! {
				pub fn #name(&self) -> &::synctree::Array<#elem> {
					&self.#field_ident
				}

				pub fn #mut_name(&mut self) -> &mut ::synctree::Array<#elem> {
					&mut self.#field_ident
				}

				pub fn #set_name(&mut self, value: impl ::std::convert::Into<::synctree::Array<#elem>>) {
					self.#field_ident = value.into();
					#mark_dirty
				}
			}
		},
		Kind::Map(k, v) => {
			let mut_name = format_ident!("{}_mut", s.name);
			quote! {
				pub fn #name(&self) -> &::synctree::Map<#k, #v> {
					&self.#field_ident
				}

				pub fn #mut_name(&mut self) -> &mut ::synctree::Map<#k, #v> {
					&mut self.#field_ident
				}

				pub fn #set_name(&mut self, value: impl ::std::convert::Into<::synctree::Map<#k, #v>>) {
					self.#field_ident = value.into();
					#mark_dirty
				}
			}
		},
		Kind::IdMap(elem) => {
			let mut_name = format_ident!("{}_mut", s.name);
			quote! {
				pub fn #name(&self) -> &::synctree::IdMap<#elem> {
					&self.#field_ident
				}

				pub fn #mut_name(&mut self) -> &mut ::synctree::IdMap<#elem> {
					&mut self.#field_ident
				}

				pub fn #set_name(&mut self, value: ::synctree::IdMap<#elem>) {
					self.#field_ident = value;
					#mark_dirty
				}
			}
		},
	}
}

fn encode_dict_stmt(s: &Spec, dirty: &syn::Ident) -> TokenStream {
	let field_ident = &s.ident;
	let name = &s.name;
	let index = s.index;
	let oid_guard = if s.is_oid { quote!(!opts.exclude_oid &&) } else { quote!() };

	match &s.kind {
		Kind::Scalar => quote! {
			if #oid_guard opts.should_visit(#name, #index) && (!opts.only_changed || self.#dirty.is_dirty(#index)) {
				out.insert(#name.to_string(), ::synctree::WireCodec::dict_encode(&self.#field_ident));
			}
		},
		Kind::Ref => quote! {
			if opts.should_visit(#name, #index) && (!opts.only_changed || self.#dirty.is_dirty(#index)) {
				let value = match &self.#field_ident {
					Some(oid) => ::synctree::serde_json::Value::String(oid.to_string()),
					None => ::synctree::serde_json::Value::Null,
				};
				out.insert(#name.to_string(), value);
			}
		},
		Kind::Record => quote! {
			if opts.should_visit(#name, #index) {
				let nested = ::synctree::Record::pack_dict(&mut self.#field_ident, opts);
				let keep = !opts.only_changed
					|| self.#dirty.is_dirty(#index)
					|| nested.as_object().map(|o| !o.is_empty()).unwrap_or(true);
				if keep {
					out.insert(#name.to_string(), nested);
				}
			}
		},
		Kind::Array(elem) => {
			let encode_elem = if is_primitive_type(elem) {
				quote!(::synctree::WireCodec::dict_encode(item))
			} else {
				quote!(::synctree::Record::pack_dict(item, opts))
			};
			quote! {
				if opts.should_visit(#name, #index) {
					let container_changed = self.#field_ident.changed();
					if !opts.only_changed || container_changed {
						let items: ::std::vec::Vec<_> = self.#field_ident.iter_mut_unmarked().map(|item| #encode_elem).collect();
						out.insert(#name.to_string(), ::synctree::serde_json::Value::Array(items));
					}
				}
				if opts.clear_changed {
					self.#field_ident.clear_changed();
				}
			}
		},
		Kind::Map(_k, v) => {
			let value_is_record = !is_primitive_type(v);
			let encode_val = if value_is_record {
				quote!(::synctree::Record::pack_dict(val, opts))
			} else {
				quote!(::synctree::WireCodec::dict_encode(val))
			};
			let include_check = if value_is_record {
				quote!(!opts.only_changed || container_changed || ::synctree::Record::has_changed(val, None, true))
			} else {
				quote!(!opts.only_changed || container_changed)
			};
			quote! {
				if opts.should_visit(#name, #index) {
					let container_changed = self.#field_ident.changed();
					let has_removed = !self.#field_ident.removed_keys().is_empty();
					if !opts.only_changed || container_changed || has_removed {
						let mut obj = ::synctree::serde_json::Map::new();
						for (key, val) in self.#field_ident.iter_mut_unmarked() {
							if #include_check {
								obj.insert(::synctree::WireCodec::dict_key_encode(key), #encode_val);
							}
						}
						if opts.only_changed {
							for key in self.#field_ident.removed_keys() {
								obj.insert(::synctree::WireCodec::dict_key_encode(key), ::synctree::serde_json::Value::Null);
							}
						}
						out.insert(#name.to_string(), ::synctree::serde_json::Value::Object(obj));
					}
				}
				if opts.clear_changed {
					self.#field_ident.clear_changed();
				}
			}
		},
		Kind::IdMap(_elem) => quote! {
			if opts.should_visit(#name, #index) {
				let container_changed = self.#field_ident.changed();
				let has_removed = !self.#field_ident.removed_keys().is_empty();
				if !opts.only_changed || container_changed || has_removed {
					let mut obj = ::synctree::serde_json::Map::new();
					let mut child_opts = ::synctree::PackOptions::new();
					child_opts.recursive = opts.recursive;
					child_opts.only_changed = opts.only_changed;
					child_opts.exclude_oid = true;
					for (key, val) in self.#field_ident.iter_mut_unmarked() {
						if !opts.only_changed || container_changed || ::synctree::Record::has_changed(val, None, true) {
							obj.insert(key.to_string(), ::synctree::Record::pack_dict(val, &child_opts));
						}
					}
					if opts.only_changed {
						for key in self.#field_ident.removed_keys() {
							obj.insert(key.to_string(), ::synctree::serde_json::Value::Null);
						}
					}
					out.insert(#name.to_string(), ::synctree::serde_json::Value::Object(obj));
				}
			}
			if opts.clear_changed {
				self.#field_ident.clear_changed();
			}
		},
	}
}

fn is_string_type(ty: &Type) -> bool {
	matches!(last_ident(ty).map(|i| i.to_string()).as_deref(), Some("String"))
}

fn encode_bin_stmt(s: &Spec, _dirty: &syn::Ident) -> TokenStream {
	let field_ident = &s.ident;
	let name = &s.name;
	let index = s.index;
	let oid_guard = if s.is_oid { quote!(!opts.exclude_oid &&) } else { quote!() };
	let visit_guard = quote!(opts.should_visit(#name, #index) &&);

	match &s.kind {
		Kind::Scalar => {
			let len_check = if is_string_type(&s.ty) {
				quote!(::synctree::codec::check_string_len(&self.#field_ident)?;)
			} else {
				quote!()
			};
			quote! {
				if #oid_guard #visit_guard (!opts.only_changed || self.dirty().is_dirty(#index)) {
					#len_check
					buf.extend_from_slice(&(#index as u16).to_be_bytes());
					::synctree::WireCodec::bin_encode(&self.#field_ident, buf);
				}
			}
		},
		Kind::Ref => quote! {
			if #visit_guard (!opts.only_changed || self.dirty().is_dirty(#index)) {
				if let Some(oid) = &self.#field_ident {
					buf.extend_from_slice(&(#index as u16).to_be_bytes());
					oid.checked_bin_encode(buf)?;
				}
			}
		},
		Kind::Record => quote! {
			if #visit_guard (!opts.only_changed || self.dirty().is_dirty(#index) || ::synctree::Record::has_changed(&self.#field_ident, None, true)) {
				buf.extend_from_slice(&(#index as u16).to_be_bytes());
				::synctree::Record::pack_bin(&mut self.#field_ident, opts, buf)?;
			}
		},
		Kind::Array(elem) => {
			let write_elem = if is_string_type(elem) {
				quote! {
					::synctree::codec::check_string_len(item)?;
					::synctree::WireCodec::bin_encode(item, buf);
				}
			} else if is_primitive_type(elem) {
				quote!(::synctree::WireCodec::bin_encode(item, buf);)
			} else {
				quote!(::synctree::Record::pack_bin(item, opts, buf)?;)
			};
			quote! {
				if #visit_guard (!opts.only_changed || self.#field_ident.changed()) {
					buf.extend_from_slice(&(#index as u16).to_be_bytes());
					buf.push(::synctree::codec::binary::TAG_ARRAY);
					buf.extend_from_slice(&(self.#field_ident.len() as u32).to_be_bytes());
					for item in self.#field_ident.iter_mut_unmarked() {
						#write_elem
					}
				}
				if opts.clear_changed {
					self.#field_ident.clear_changed();
				}
			}
		},
		Kind::Map(k, v) => {
			let write_key = if is_string_type(k) {
				quote! {
					::synctree::codec::check_string_len(key)?;
					::synctree::WireCodec::bin_encode(key, buf);
				}
			} else {
				quote!(::synctree::WireCodec::bin_encode(key, buf);)
			};
			let write_val = if is_string_type(v) {
				quote! {
					::synctree::codec::check_string_len(val)?;
					::synctree::WireCodec::bin_encode(val, buf);
				}
			} else if is_primitive_type(v) {
				quote!(::synctree::WireCodec::bin_encode(val, buf);)
			} else {
				quote!(::synctree::Record::pack_bin(val, opts, buf)?;)
			};
			quote! {
				if #visit_guard (!opts.only_changed || self.#field_ident.changed() || !self.#field_ident.removed_keys().is_empty()) {
					buf.extend_from_slice(&(#index as u16).to_be_bytes());
					buf.push(::synctree::codec::binary::TAG_MAP);
					buf.extend_from_slice(&(self.#field_ident.len() as u32).to_be_bytes());
					for (key, val) in self.#field_ident.iter_mut_unmarked() {
						#write_key
						#write_val
					}
				}
				if opts.clear_changed {
					self.#field_ident.clear_changed();
				}
			}
		},
		Kind::IdMap(_elem) => quote! {
			if #visit_guard (!opts.only_changed || self.#field_ident.changed() || !self.#field_ident.removed_keys().is_empty()) {
				buf.extend_from_slice(&(#index as u16).to_be_bytes());
				buf.push(::synctree::codec::binary::TAG_ID_MAP);
				buf.extend_from_slice(&(self.#field_ident.len() as u32).to_be_bytes());
				let mut child_opts = ::synctree::PackOptions::new();
				child_opts.recursive = opts.recursive;
				child_opts.only_changed = opts.only_changed;
				child_opts.exclude_oid = true;
				for (key, val) in self.#field_ident.iter_mut_unmarked() {
					key.checked_bin_encode(buf)?;
					::synctree::Record::pack_bin(val, &child_opts, buf)?;
				}
			}
			if opts.clear_changed {
				self.#field_ident.clear_changed();
			}
		},
	}
}

fn decode_dict_arm(s: &Spec, dirty: &syn::Ident, type_name: &str) -> TokenStream {
	let field_ident = &s.ident;
	let name = &s.name;
	let index = s.index;

	let body = match &s.kind {
		Kind::Scalar => quote! {
			self.#field_ident = ::synctree::WireCodec::dict_decode(value)?;
			if opts.mark_change {
				self.#dirty.set_dirty(#index);
			}
		},
		Kind::Ref => {
			let ref_ty = s.ref_type.as_ref().unwrap();
			quote! {
				let oid_str = value.as_str().ok_or(::synctree::ModelError::Unpack(::synctree::UnpackError::TypeMismatch {
					expected: "string oid",
					found: "non-string json value",
				}))?;
				let oid = ::synctree::OidValue::parse(<#ref_ty as ::synctree::Record>::oid_kind(), oid_str)?;
				self.#field_ident = Some(oid.clone());
				ctx.register_pending(::synctree::RefLocator::field(#type_name, #name), oid);
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Record => {
			let ty = &s.ty;
			let construct = match &s.create {
				Some(path) => quote!(#path(value)?),
				None => quote!(<#ty as ::std::default::Default>::default()),
			};
			quote! {
				match opts.mode {
					::synctree::UnpackMode::Sync => {
						::synctree::Record::unpack_dict(&mut self.#field_ident, value, opts, ctx)?;
					},
					::synctree::UnpackMode::Override => {
						let mut fresh = #construct;
						::synctree::Record::unpack_dict(&mut fresh, value, opts, ctx)?;
						self.#field_ident = fresh;
					},
				}
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Array(elem) => {
			let decode_elem = if is_primitive_type(elem) {
				quote!(::synctree::WireCodec::dict_decode(item)?)
			} else {
				quote! {{
					let mut e = <#elem as ::std::default::Default>::default();
					::synctree::Record::unpack_dict(&mut e, item, opts, ctx)?;
					e
				}}
			};
			quote! {
				let arr = value.as_array().ok_or(::synctree::ModelError::Unpack(::synctree::UnpackError::TypeMismatch {
					expected: "array",
					found: "non-array json value",
				}))?;
				let mut fresh = ::synctree::Array::<#elem>::new();
				for item in arr {
					if item.is_null() {
						continue;
					}
					fresh.append_decoded(#decode_elem);
				}
				self.#field_ident = fresh;
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Map(_k, v) => {
			let value_is_record = !is_primitive_type(v);
			let decode_new_val = if value_is_record {
				quote! {{
					let mut fresh = <#v as ::std::default::Default>::default();
					::synctree::Record::unpack_dict(&mut fresh, entry_value, opts, ctx)?;
					fresh
				}}
			} else {
				quote!(::synctree::WireCodec::dict_decode(entry_value)?)
			};
			let sync_existing = if value_is_record {
				quote! {
					if let Some(existing) = self.#field_ident.raw_get_mut(&key) {
						::synctree::Record::unpack_dict(existing, entry_value, opts, ctx)?;
						continue;
					}
				}
			} else {
				quote!()
			};
			quote! {
				let obj = value.as_object().ok_or(::synctree::ModelError::Unpack(::synctree::UnpackError::TypeMismatch {
					expected: "object",
					found: "non-object json value",
				}))?;
				match opts.mode {
					::synctree::UnpackMode::Override => {
						self.#field_ident.reset_decoded();
						for (raw_key, entry_value) in obj {
							if entry_value.is_null() {
								continue;
							}
							let key = ::synctree::WireCodec::dict_key_decode(raw_key)?;
							let decoded = #decode_new_val;
							self.#field_ident.raw_set(key, decoded);
						}
					},
					::synctree::UnpackMode::Sync => {
						for (raw_key, entry_value) in obj {
							let key = ::synctree::WireCodec::dict_key_decode(raw_key)?;
							if entry_value.is_null() {
								self.#field_ident.raw_remove(&key);
								continue;
							}
							#sync_existing
							let decoded = #decode_new_val;
							self.#field_ident.raw_set(key, decoded);
						}
					},
				}
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::IdMap(elem) => quote! {
			let obj = value.as_object().ok_or(::synctree::ModelError::Unpack(::synctree::UnpackError::TypeMismatch {
				expected: "object",
				found: "non-object json value",
			}))?;
			match opts.mode {
				::synctree::UnpackMode::Override => {
					self.#field_ident.reset_decoded();
					for (raw_key, entry_value) in obj {
						if entry_value.is_null() {
							continue;
						}
						let oid = ::synctree::OidValue::parse(<#elem as ::synctree::Record>::oid_kind(), raw_key)?;
						let mut fresh = <#elem as ::std::default::Default>::default();
						::synctree::Record::unpack_dict(&mut fresh, entry_value, opts, ctx)?;
						self.#field_ident.raw_set(oid, fresh);
					}
				},
				::synctree::UnpackMode::Sync => {
					for (raw_key, entry_value) in obj {
						let oid = ::synctree::OidValue::parse(<#elem as ::synctree::Record>::oid_kind(), raw_key)?;
						if entry_value.is_null() {
							self.#field_ident.raw_remove(&oid);
							continue;
						}
						if let Some(existing) = self.#field_ident.raw_get_mut(&oid) {
							::synctree::Record::unpack_dict(existing, entry_value, opts, ctx)?;
							continue;
						}
						let mut fresh = <#elem as ::std::default::Default>::default();
						::synctree::Record::unpack_dict(&mut fresh, entry_value, opts, ctx)?;
						self.#field_ident.raw_set(oid, fresh);
					}
				},
			}
			if opts.mark_change {
				self.#dirty.set_dirty(#index);
			}
		},
	};

	quote! {
		#name => {
			#body
			Ok(true)
		},
	}
}

fn decode_bin_arm(s: &Spec, dirty: &syn::Ident, type_name: &str) -> TokenStream {
	let field_ident = &s.ident;
	let name = &s.name;
	let index = s.index;

	let body = match &s.kind {
		Kind::Scalar => quote! {
			self.#field_ident = ::synctree::WireCodec::bin_decode(cur)?;
			if opts.mark_change {
				self.#dirty.set_dirty(#index);
			}
		},
		Kind::Ref => {
			let ref_ty = s.ref_type.as_ref().unwrap();
			let _ = ref_ty;
			quote! {
				let oid = ::synctree::OidValue::bin_decode(cur)?;
				self.#field_ident = Some(oid.clone());
				ctx.register_pending(::synctree::RefLocator::field(#type_name, #name), oid);
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Record => {
			let ty = &s.ty;
			quote! {
				match opts.mode {
					::synctree::UnpackMode::Sync => {
						::synctree::Record::unpack_bin(&mut self.#field_ident, cur, opts, ctx)?;
					},
					::synctree::UnpackMode::Override => {
						let mut fresh = <#ty as ::std::default::Default>::default();
						::synctree::Record::unpack_bin(&mut fresh, cur, opts, ctx)?;
						self.#field_ident = fresh;
					},
				}
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Array(elem) => {
			let decode_elem = if is_primitive_type(elem) {
				quote!(::synctree::WireCodec::bin_decode(cur)?)
			} else {
				quote! {{
					let mut e = <#elem as ::std::default::Default>::default();
					::synctree::Record::unpack_bin(&mut e, cur, opts, ctx)?;
					e
				}}
			};
			quote! {
				let tag = ::synctree::codec::binary::read_u8(cur)?;
				if tag != ::synctree::codec::binary::TAG_ARRAY {
					return Err(::synctree::ModelError::Pack(::synctree::PackError::MalformedContainerHead(tag)));
				}
				let len = ::synctree::codec::binary::read_u32(cur)? as usize;
				let mut fresh = ::synctree::Array::<#elem>::new();
				for _ in 0..len {
					fresh.append_decoded(#decode_elem);
				}
				self.#field_ident = fresh;
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::Map(_k, v) => {
			let value_is_record = !is_primitive_type(v);
			let decode_new_val = if value_is_record {
				quote! {{
					let mut fresh = <#v as ::std::default::Default>::default();
					::synctree::Record::unpack_bin(&mut fresh, cur, opts, ctx)?;
					fresh
				}}
			} else {
				quote!(::synctree::WireCodec::bin_decode(cur)?)
			};
			let sync_existing = if value_is_record {
				quote! {
					if let Some(existing) = self.#field_ident.raw_get_mut(&key) {
						::synctree::Record::unpack_bin(existing, cur, opts, ctx)?;
						continue;
					}
				}
			} else {
				quote!()
			};
			quote! {
				let tag = ::synctree::codec::binary::read_u8(cur)?;
				if tag != ::synctree::codec::binary::TAG_MAP {
					return Err(::synctree::ModelError::Pack(::synctree::PackError::MalformedContainerHead(tag)));
				}
				let len = ::synctree::codec::binary::read_u32(cur)? as usize;
				match opts.mode {
					::synctree::UnpackMode::Override => {
						self.#field_ident.reset_decoded();
						for _ in 0..len {
							let key = ::synctree::WireCodec::bin_decode(cur)?;
							let decoded = #decode_new_val;
							self.#field_ident.raw_set(key, decoded);
						}
					},
					::synctree::UnpackMode::Sync => {
						for _ in 0..len {
							let key = ::synctree::WireCodec::bin_decode(cur)?;
							#sync_existing
							let decoded = #decode_new_val;
							self.#field_ident.raw_set(key, decoded);
						}
					},
				}
				if opts.mark_change {
					self.#dirty.set_dirty(#index);
				}
			}
		},
		Kind::IdMap(elem) => quote! {
			let tag = ::synctree::codec::binary::read_u8(cur)?;
			if tag != ::synctree::codec::binary::TAG_ID_MAP {
				return Err(::synctree::ModelError::Pack(::synctree::PackError::MalformedContainerHead(tag)));
			}
			let len = ::synctree::codec::binary::read_u32(cur)? as usize;
			match opts.mode {
				::synctree::UnpackMode::Override => {
					self.#field_ident.reset_decoded();
					for _ in 0..len {
						let oid = ::synctree::OidValue::bin_decode(cur)?;
						let mut fresh = <#elem as ::std::default::Default>::default();
						::synctree::Record::unpack_bin(&mut fresh, cur, opts, ctx)?;
						self.#field_ident.raw_set(oid, fresh);
					}
				},
				::synctree::UnpackMode::Sync => {
					for _ in 0..len {
						let oid = ::synctree::OidValue::bin_decode(cur)?;
						if let Some(existing) = self.#field_ident.raw_get_mut(&oid) {
							::synctree::Record::unpack_bin(existing, cur, opts, ctx)?;
							continue;
						}
						let mut fresh = <#elem as ::std::default::Default>::default();
						::synctree::Record::unpack_bin(&mut fresh, cur, opts, ctx)?;
						self.#field_ident.raw_set(oid, fresh);
					}
				},
			}
			if opts.mark_change {
				self.#dirty.set_dirty(#index);
			}
		},
	};

	quote! {
		#index => {
			#body
			Ok(true)
		},
	}
}

fn has_changed_name_arm(s: &Spec, dirty: &syn::Ident) -> TokenStream {
	let name = &s.name;
	let index = s.index;
	if s.skip_changed {
		return quote!(#name => false,);
	}
	let recurse = recursive_changed_expr(s);
	quote! {
		#name => {
			if self.#dirty.is_dirty(#index) {
				true
			} else if recursive {
				#recurse
			} else {
				false
			}
		},
	}
}

/// Expression checking whether a field's own substructure (container flags,
/// nested record DirtySets) reports changed, independent of whether the
/// field's top-level index bit is set. `false`/no-op for scalar/ref fields,
/// which have no substructure beyond the index bit already checked above.
fn recursive_changed_expr(s: &Spec) -> TokenStream {
	let field_ident = &s.ident;
	match &s.kind {
		Kind::Scalar | Kind::Ref => quote!(false),
		Kind::Record => quote!(::synctree::Record::has_changed(&self.#field_ident, None, true)),
		Kind::Array(elem) if !is_primitive_type(elem) => quote! {
			self.#field_ident.changed() || self.#field_ident.iter().any(|it| ::synctree::Record::has_changed(it, None, true))
		},
		Kind::Array(_) => quote!(self.#field_ident.changed()),
		Kind::Map(_k, v) if !is_primitive_type(v) => quote! {
			self.#field_ident.changed() || !self.#field_ident.removed_keys().is_empty()
				|| self.#field_ident.iter().any(|(_, v)| ::synctree::Record::has_changed(v, None, true))
		},
		Kind::Map(_, _) => quote! {
			self.#field_ident.changed() || !self.#field_ident.removed_keys().is_empty()
		},
		Kind::IdMap(_) => quote! {
			self.#field_ident.changed() || !self.#field_ident.removed_keys().is_empty()
				|| self.#field_ident.iter().any(|(_, v)| ::synctree::Record::has_changed(v, None, true))
		},
	}
}

fn recursive_any_changed_stmt(s: &Spec) -> TokenStream {
	if s.skip_changed {
		return quote!();
	}
	let recurse = recursive_changed_expr(s);
	match &s.kind {
		Kind::Scalar | Kind::Ref => quote!(),
		_ => quote! {
			if #recurse {
				return true;
			}
		},
	}
}

fn clear_changed_stmt(s: &Spec) -> TokenStream {
	if s.skip_changed {
		return quote!();
	}
	let field_ident = &s.ident;
	let name = &s.name;
	let inner = match &s.kind {
		Kind::Scalar | Kind::Ref => return quote!(),
		Kind::Record => quote!(::synctree::Record::clear_changed(&mut self.#field_ident, &[], true);),
		Kind::Array(elem) if !is_primitive_type(elem) => quote! {
			self.#field_ident.clear_changed();
			for item in self.#field_ident.iter_mut_unmarked() {
				::synctree::Record::clear_changed(item, &[], true);
			}
		},
		Kind::Array(_) => quote!(self.#field_ident.clear_changed();),
		Kind::Map(_k, v) if !is_primitive_type(v) => quote! {
			self.#field_ident.clear_changed();
			for (_, val) in self.#field_ident.iter_mut_unmarked() {
				::synctree::Record::clear_changed(val, &[], true);
			}
		},
		Kind::Map(_, _) => quote!(self.#field_ident.clear_changed();),
		Kind::IdMap(_) => quote! {
			self.#field_ident.clear_changed();
			for (_, val) in self.#field_ident.iter_mut_unmarked() {
				::synctree::Record::clear_changed(val, &[], true);
			}
		},
	};
	quote! {
		if recursive && (all || names.contains(&#name)) {
			#inner
		}
	}
}

/// Marks this field's own index dirty. Used only for the no-name branch of
/// `set_changed`, which must touch this type's own declared fields and leave
/// inherited base fields to `#base_set_changed`.
fn set_changed_own_stmt(s: &Spec, dirty: &syn::Ident) -> TokenStream {
	if s.skip_changed {
		return quote!();
	}
	let index = s.index;
	quote!(self.#dirty.set_dirty(#index);)
}

fn clear_data_stmt(s: &Spec) -> TokenStream {
	let field_ident = &s.ident;
	let ty = &s.ty;
	match &s.kind {
		Kind::Scalar => {
			let default_expr = s.default.clone().map(|e| quote!(#e)).unwrap_or_else(|| quote!(<#ty as ::std::default::Default>::default()));
			quote!(self.#field_ident = #default_expr;)
		},
		Kind::Ref => quote!(self.#field_ident = None;),
		_ => quote!(self.#field_ident = <#ty as ::std::default::Default>::default();),
	}
}

fn collect_changed_stmt(s: &Spec) -> TokenStream {
	if s.skip_changed {
		return quote!();
	}
	let field_ident = &s.ident;
	match &s.kind {
		Kind::Record => quote! {
			if ::synctree::Record::has_changed(&self.#field_ident, None, true) {
				out.push(&self.#field_ident);
				::synctree::Record::collect_changed_records(&self.#field_ident, out);
			}
		},
		Kind::Array(elem) if !is_primitive_type(elem) => quote! {
			for item in self.#field_ident.iter() {
				if ::synctree::Record::has_changed(item, None, true) {
					out.push(item);
					::synctree::Record::collect_changed_records(item, out);
				}
			}
		},
		Kind::Map(_k, v) if !is_primitive_type(v) => quote! {
			for (_, item) in self.#field_ident.iter() {
				if ::synctree::Record::has_changed(item, None, true) {
					out.push(item);
					::synctree::Record::collect_changed_records(item, out);
				}
			}
		},
		Kind::IdMap(_) => quote! {
			for (_, item) in self.#field_ident.iter() {
				if ::synctree::Record::has_changed(item, None, true) {
					out.push(item);
					::synctree::Record::collect_changed_records(item, out);
				}
			}
		},
		_ => quote!(),
	}
}

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let input: DeriveInput = syn::parse(tokens).unwrap();
	let ident = input.ident;

	let Data::Struct(data) = input.data else {
		panic!("#[derive(Record)] only supports structs");
	};
	let Fields::Named(named) = data.fields else {
		panic!("#[derive(Record)] requires named fields");
	};

	let dirty_field = named
		.named
		.iter()
		.find(|f| matches!(last_ident(&f.ty), Some(i) if i == "DirtySet"))
		.and_then(|f| f.ident.clone())
		.expect("a #[derive(Record)] struct must have one `_dirty: DirtySet` field");

	let base_field = named.named.iter().find(|f| has_meta_key(f, "base"));
	let base_ident = base_field.and_then(|f| f.ident.clone());
	let base_ty = base_field.map(|f| f.ty.clone());

	let specs: Vec<Spec> = named
		.named
		.iter()
		.filter(|f| f.ident.as_ref() != Some(&dirty_field) && !has_meta_key(f, "base"))
		.filter_map(parse_field)
		.collect();

	let oid_spec = specs.iter().find(|s| s.is_oid);
	let type_name_str = ident.to_string();
	let descriptors = specs.iter().map(field_descriptor_tokens);

	let ancestor_expr = match &base_ty {
		Some(bt) => quote!(<#bt as ::synctree::Record>::protocol().fields_define().fields().to_vec()),
		None => quote!(::std::vec::Vec::new()),
	};

	let accessors = specs.iter().map(|s| field_accessors(s, &dirty_field));
	let encode_dict_stmts = specs.iter().map(|s| encode_dict_stmt(s, &dirty_field));
	let encode_bin_stmts = specs.iter().map(|s| encode_bin_stmt(s, &dirty_field));
	let decode_dict_arms = specs.iter().map(|s| decode_dict_arm(s, &dirty_field, &type_name_str));
	let decode_bin_arms = specs.iter().map(|s| decode_bin_arm(s, &dirty_field, &type_name_str));
	let has_changed_arms = specs.iter().map(|s| has_changed_name_arm(s, &dirty_field));
	let any_changed_stmts = specs.iter().map(recursive_any_changed_stmt);
	let clear_changed_stmts = specs.iter().map(clear_changed_stmt);
	let clear_data_stmts = specs.iter().map(clear_data_stmt);
	let collect_changed_stmts = specs.iter().map(collect_changed_stmt);
	let set_changed_own_stmts = specs.iter().map(|s| set_changed_own_stmt(s, &dirty_field));

	let oid_expr = match oid_spec {
		Some(s) => {
			let field_ident = &s.ident;
			quote!(Some(::synctree::OidValue::from(self.#field_ident.clone())))
		},
		None => match &base_ident {
			Some(b) => quote!(::synctree::Record::oid(&self.#b)),
			None => quote!(None),
		},
	};

	let oid_kind_expr = match oid_spec {
		Some(s) => {
			let kind = match last_ident(&s.ty).map(|i| i.to_string()).as_deref() {
				Some("String") => quote!(::synctree::oid::OidKind::Str),
				Some(t) if t.starts_with('u') => quote!(::synctree::oid::OidKind::UInt),
				_ => quote!(::synctree::oid::OidKind::Int),
			};
			quote!(#kind)
		},
		None => match &base_ty {
			Some(bt) => quote!(<#bt as ::synctree::Record>::oid_kind()),
			None => quote!(panic!("{} declares no oid field", #type_name_str)),
		},
	};

	let base_pack_dict = base_ident.as_ref().map(|b| {
		quote! {
			if let ::synctree::serde_json::Value::Object(base_map) = ::synctree::Record::pack_dict(&mut self.#b, opts) {
				map.extend(base_map);
			}
		}
	});
	let base_pack_bin = base_ident.as_ref().map(|b| {
		quote! {
			self.#b.encode_own_fields_bin(opts, buf)?;
		}
	});
	let base_unpack_dict = base_ident.as_ref().map(|b| {
		quote! {
			self.#b.decode_own_field_dict(key, value, opts, ctx)?;
		}
	});
	let base_unpack_bin_arm = base_ident.as_ref().map(|b| {
		quote! {
			handled_by_base = self.#b.decode_own_field_bin(index, cur, opts, ctx)?;
		}
	});
	let base_has_changed = base_ident.as_ref().map(|b| {
		quote! {
			if ::synctree::Record::has_changed(&self.#b, Some(n), recursive) {
				return true;
			}
		}
	});
	let base_has_changed_none = base_ident.as_ref().map(|b| {
		quote! {
			if ::synctree::Record::has_changed(&self.#b, None, recursive) {
				return true;
			}
		}
	});
	let base_clear_changed = base_ident.as_ref().map(|b| {
		quote! {
			::synctree::Record::clear_changed(&mut self.#b, names, recursive);
		}
	});
	let base_set_changed = base_ident.as_ref().map(|b| {
		quote! {
			::synctree::Record::set_changed(&mut self.#b, names);
		}
	});
	let base_clear_data = base_ident.as_ref().map(|b| {
		quote! {
			::synctree::Record::clear_data(&mut self.#b);
		}
	});
	let base_collect_changed = base_ident.as_ref().map(|b| {
		quote! {
			::synctree::Record::collect_changed_records(&self.#b, out);
		}
	});

	quote! {
		impl #ident {
			pub fn fields_define() -> &'static ::synctree::FieldsDefine {
				static DEFINE: ::std::sync::OnceLock<::synctree::FieldsDefine> = ::std::sync::OnceLock::new();
				DEFINE.get_or_init(|| {
					let ancestor: ::std::vec::Vec<::synctree::FieldDescriptor> = #ancestor_expr;
					let own: ::std::vec::Vec<::synctree::FieldDescriptor> = ::std::vec![#(#descriptors),*];
					::synctree::FieldsDefine::merge(ancestor, own)
						.unwrap_or_else(|e| panic!("invalid field table for {}: {:?}", #type_name_str, e))
				})
			}

			pub fn protocol() -> &'static ::synctree::Protocol {
				static PROTOCOL: ::std::sync::OnceLock<::synctree::Protocol> = ::std::sync::OnceLock::new();
				PROTOCOL.get_or_init(|| ::synctree::Protocol::new(#type_name_str, Self::fields_define().clone()))
			}

			/// Programmatic-access lookup by name (§3's "name: ... used for
			/// programmatic access"): unlike the typed accessors, this is for
			/// callers that only have a field name at hand, e.g. introspection
			/// or a field filter built from user input. Fails with `NoField`
			/// rather than silently doing nothing.
			pub fn field_descriptor(name: &str) -> Result<&'static ::synctree::FieldDescriptor, ::synctree::ModelError> {
				Self::fields_define().require_by_name(name)
			}

			#(#accessors)*

			/// Encodes this type's own declared fields (excluding any
			/// embedded base record) into `out`. Exposed so a subtype's
			/// generated `pack_dict` can merge a base record's fields ahead
			/// of its own.
			pub fn encode_own_fields_dict(&mut self, opts: &::synctree::PackOptions, out: &mut ::synctree::serde_json::Map<String, ::synctree::serde_json::Value>) {
				#(#encode_dict_stmts)*
			}

			/// Binary counterpart of `encode_own_fields_dict`: writes this
			/// type's own `<index, payload>` entries without the trailing
			/// `0x0000` terminator, so a subtype can append its own fields
			/// after a base record's before writing one shared terminator.
			pub fn encode_own_fields_bin(&mut self, opts: &::synctree::PackOptions, buf: &mut ::std::vec::Vec<u8>) -> Result<(), ::synctree::ModelError> {
				#(#encode_bin_stmts)*
				Ok(())
			}

			/// Attempts to decode one structural key into this type's own
			/// fields. Returns `Ok(false)` when `key` names no field of this
			/// type, so a subtype can then try its embedded base record.
			pub fn decode_own_field_dict(
				&mut self,
				key: &str,
				value: &::synctree::serde_json::Value,
				opts: &::synctree::UnpackOptions,
				ctx: &mut ::synctree::DecodeContext,
			) -> Result<bool, ::synctree::ModelError> {
				match key {
					#(#decode_dict_arms)*
					_ => Ok(false),
				}
			}

			/// Binary counterpart of `decode_own_field_dict`, dispatching on
			/// wire field index instead of structural key.
			pub fn decode_own_field_bin(
				&mut self,
				index: u16,
				cur: &mut ::std::io::Cursor<&[u8]>,
				opts: &::synctree::UnpackOptions,
				ctx: &mut ::synctree::DecodeContext,
			) -> Result<bool, ::synctree::ModelError> {
				match index {
					#(#decode_bin_arms)*
					_ => Ok(false),
				}
			}

			/// Bulk-assigns fields by name from a structural map without marking
			/// anything dirty: the same field-name-keyed write `unpack_dict`
			/// already performs, just with the default, quiet `UnpackOptions`
			/// (`mark_change: false`, `mode: Override`) and a throwaway
			/// `DecodeContext`, since a bulk load has no use for ref-resolution
			/// bookkeeping that outlives the call.
			pub fn set_data(&mut self, src: &::synctree::serde_json::Value) -> Result<(), ::synctree::ModelError> {
				let mut ctx = ::synctree::DecodeContext::new();
				<Self as ::synctree::Record>::unpack_dict(self, src, &::synctree::UnpackOptions::new(), &mut ctx)
			}
		}

		impl ::synctree::Record for #ident {
			fn protocol(&self) -> &'static ::synctree::Protocol {
				Self::protocol()
			}

			fn dirty(&self) -> &::synctree::DirtySet {
				&self.#dirty_field
			}

			fn dirty_mut(&mut self) -> &mut ::synctree::DirtySet {
				&mut self.#dirty_field
			}

			fn oid(&self) -> Option<::synctree::OidValue> {
				#oid_expr
			}

			fn oid_kind() -> ::synctree::oid::OidKind
			where
				Self: Sized,
			{
				#oid_kind_expr
			}

			#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(ty = #type_name_str)))]
			fn pack_dict(&mut self, opts: &::synctree::PackOptions) -> ::synctree::serde_json::Value {
				let mut map = ::synctree::serde_json::Map::new();
				#base_pack_dict
				self.encode_own_fields_dict(opts, &mut map);
				if opts.clear_changed {
					self.#dirty_field.clear_all();
				}
				::synctree::serde_json::Value::Object(map)
			}

			#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(ty = #type_name_str)))]
			fn pack_bin(&mut self, opts: &::synctree::PackOptions, buf: &mut ::std::vec::Vec<u8>) -> Result<(), ::synctree::ModelError> {
				#base_pack_bin
				self.encode_own_fields_bin(opts, buf)?;
				if opts.clear_changed {
					self.#dirty_field.clear_all();
				}
				buf.extend_from_slice(&0u16.to_be_bytes());
				Ok(())
			}

			#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(ty = #type_name_str)))]
			fn unpack_dict(
				&mut self,
				src: &::synctree::serde_json::Value,
				opts: &::synctree::UnpackOptions,
				ctx: &mut ::synctree::DecodeContext,
			) -> Result<(), ::synctree::ModelError> {
				let obj = src.as_object().ok_or(::synctree::ModelError::Unpack(::synctree::UnpackError::TypeMismatch {
					expected: "object",
					found: "non-object json value",
				}))?;
				for (key, value) in obj {
					if value.is_null() {
						continue;
					}
					let handled = self.decode_own_field_dict(key, value, opts, ctx)?;
					if !handled {
						#base_unpack_dict
					}
				}
				if let Some(oid) = ::synctree::Record::oid(self) {
					ctx.register_known(oid);
				}
				Ok(())
			}

			#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(ty = #type_name_str)))]
			fn unpack_bin(
				&mut self,
				cur: &mut ::std::io::Cursor<&[u8]>,
				opts: &::synctree::UnpackOptions,
				ctx: &mut ::synctree::DecodeContext,
			) -> Result<(), ::synctree::ModelError> {
				loop {
					let index = ::synctree::codec::binary::read_u16(cur)?;
					if index == 0 {
						if let Some(oid) = ::synctree::Record::oid(self) {
							ctx.register_known(oid);
						}
						return Ok(());
					}
					let handled = self.decode_own_field_bin(index, cur, opts, ctx)?;
					if handled {
						continue;
					}
					#[allow(unused_mut)]
					let mut handled_by_base = false;
					#base_unpack_bin_arm
					if !handled_by_base {
						return Err(::synctree::ModelError::Pack(::synctree::PackError::UnknownFieldIndex(index)));
					}
				}
			}

			fn has_changed(&self, name: Option<&str>, recursive: bool) -> bool {
				match name {
					Some(n) => match n {
						#(#has_changed_arms)*
						_ => {
							#base_has_changed
							false
						},
					},
					None => {
						if self.#dirty_field.has_any_dirty() {
							return true;
						}
						if recursive {
							#(#any_changed_stmts)*
						}
						#base_has_changed_none
						false
					},
				}
			}

			fn clear_changed(&mut self, names: &[&str], recursive: bool) {
				let all = names.is_empty();
				#(#clear_changed_stmts)*
				if all {
					self.#dirty_field.clear_all();
				} else {
					for n in names {
						if let Some(f) = Self::fields_define().by_name(n) {
							self.#dirty_field.clear_dirty(f.index);
						}
					}
				}
				#base_clear_changed
			}

			fn set_changed(&mut self, names: &[&str]) {
				if names.is_empty() {
					#(#set_changed_own_stmts)*
				} else {
					for n in names {
						if let Some(f) = Self::fields_define().by_name(n) {
							if !f.is_skip_changed() {
								self.#dirty_field.set_dirty(f.index);
							}
						}
					}
				}
				#base_set_changed
			}

			fn clear_data(&mut self) {
				#(#clear_data_stmts)*
				self.#dirty_field.clear_all();
				#base_clear_data
			}

			fn collect_changed_records<'a>(&'a self, out: &mut ::std::vec::Vec<&'a dyn ::synctree::Record>) {
				#(#collect_changed_stmts)*
				#base_collect_changed
			}
		}
	}
}
