//! OData `$batch` support: request serialization and response parsing

pub mod parser;
pub mod serializer;

pub use parser::{BatchItem, parse_batch_response};
pub use serializer::{BatchEnvelope, BatchOptions, convert_to_batch};
