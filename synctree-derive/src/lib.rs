mod record;

use proc_macro::TokenStream;

/// Expands a `#[derive(Record)]` struct into a full `synctree::Record` impl:
/// field table construction, typed accessors, arithmetic helpers for
/// `#[field(arithm)]` fields, and the four pack/unpack bodies.
///
/// Recognized field attributes: `index`, `array`/`map`/`id_map` (inferred
/// from the field's `Array<T>`/`Map<K, V>`/`IdMap<T>` type), `ref`,
/// `ref_type`, `oid`, `arithm`, `min_value`, `skip_changed`, `create`,
/// `desc`, `rename`, `default`, `base`.
#[proc_macro_derive(Record, attributes(field))]
pub fn derive_record(input: TokenStream) -> TokenStream {
	record::derive(input).into()
}
