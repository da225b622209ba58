#![deny(missing_docs)]
#![doc = "Shared error, serialization and hashing primitives for the expman workspace."]

pub mod codec;
pub mod errors;
pub mod hash;

pub use codec::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_pretty_json_bytes};
pub use errors::{ErrorInfo, ExpError};
pub use hash::{short_hash, stable_hash_string};
