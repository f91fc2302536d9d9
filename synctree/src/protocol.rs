use crate::fields_define::FieldsDefine;

/// Binds a record type to its field table. Built once per type behind a
/// `OnceLock`, since the type itself is the key and there's no need for a
/// runtime registry keyed by name.
#[derive(Debug)]
pub struct Protocol {
	pub type_name: &'static str,
	pub fields_define: FieldsDefine,
}

impl Protocol {
	pub fn new(type_name: &'static str, fields_define: FieldsDefine) -> Self {
		Protocol { type_name, fields_define }
	}

	pub fn fields_define(&self) -> &FieldsDefine {
		&self.fields_define
	}
}
