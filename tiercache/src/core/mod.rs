pub mod error;
pub mod pattern;
pub mod types;

pub use error::{CacheError, LayerError, LayerResult, Result};
pub use pattern::KeyPattern;
pub use types::{
    CacheEntry, LayerDescriptor, LayerKind, MAX_TTL, Operation, OperationRecord, Outcome,
};
