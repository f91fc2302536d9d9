pub mod codec;
pub mod container;
pub mod context;
pub mod dirty;
pub mod error;
pub mod field;
pub mod fields_define;
pub mod oid;
pub mod protocol;
pub mod record;

#[cfg(test)]
mod test_support;

pub use codec::WireCodec;
pub use container::{Array, IdMap, Map};
pub use context::{DecodeContext, RefLocator, ResolveRef};
pub use dirty::DirtySet;
pub use error::{DefineError, ModelError, PackError, UnpackError};
pub use field::{FieldDescriptor, FieldFlags};
pub use fields_define::FieldsDefine;
pub use oid::OidValue;
pub use protocol::Protocol;
pub use record::{FieldFilter, PackOptions, Record, UnpackMode, UnpackOptions};

pub use synctree_derive::Record;

/// Re-exported so `#[derive(Record)]`-expanded code can reach
/// `serde_json::{Value, Map}` through `::synctree::serde_json::...` without
/// requiring every downstream crate to depend on `serde_json` directly.
pub use serde_json;
