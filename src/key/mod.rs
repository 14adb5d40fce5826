mod codec;
mod shape;
mod value;

pub use codec::{DEFAULT_SEPARATOR, KeyPart, composite_key, entity_key, parse_composite_key};
pub(crate) use shape::ShapeMismatch;
pub use shape::{IndexShape, KeyAttribute, MAX_KEY_ATTRIBUTES, decode_key, encode_key};
pub use value::{ItemKey, Key, KeyType, KeyValue};
