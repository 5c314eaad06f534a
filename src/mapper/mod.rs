//! Operation Mapping Module
//!
//! Translates raw chain operations into the canonical FunctionCall entity
//! published downstream:
//!
//! - `operations`: One pure mapping function per operation variant, with an exhaustive dispatch and a sentinel for unknown variants.
//! - `function_call`: The immutable output entity and its deterministic content hash.
//! - `enrich`: The secondary queries (operations, effects, accounts, assets) a mapping needs, with dedup and degrade-on-failure semantics.

/// Secondary queries needed to complete a mapping
pub mod enrich;
/// The canonical output entity
pub mod function_call;
/// Per-variant mapping functions and dispatch
pub mod operations;

pub use enrich::EntityEnricher;
pub use function_call::{content_hash, FunctionArgument, FunctionCall};
pub use operations::{assets_of, map_operation, referenced_accounts, METADATA_DATA_INTEGRITY};
