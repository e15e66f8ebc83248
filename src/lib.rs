//! Structured data extraction from HTML without a language model in the loop
//!
//! Provides:
//! - Schema extraction: CSS/XPath schemas turned into JSON records
//! - Pattern extraction: built-in and custom regexes over page text
//! - A fallback coordinator that tries strategies in order
//! - A keyed cache and a generation boundary for schemas and pattern sets
//! - FFI interface for C callers

pub mod assembler;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod generation;
pub mod patterns;
pub mod schema;
pub mod selector;
pub mod settings;
pub mod telemetry;
pub mod xpath;

pub use assembler::{assemble_record, Record};
pub use cache::{CacheEntry, CachePayload, FileCache, MemoryCache, SchemaCache};
pub use coordinator::{Attempt, AttemptFailure, Outcome, StrategyCoordinator, StrategySpec, Success};
pub use error::{CacheError, ConfigError, ExtractError, GenerationError};
pub use extractors::*;
pub use ffi::*;
pub use generation::{
    load_or_generate_patterns, load_or_generate_schema, CacheMode, LlmGenerator, PatternRequest, SchemaGenerator,
    SchemaRequest, SchemaTarget,
};
pub use patterns::{BuiltinPattern, Match, PatternSet, PatternSetDefinition};
pub use schema::{CompiledSchema, Field, FieldGroup, NestedGroup, SchemaDefinition, SelectorSpec};
pub use selector::{ExtractMode, Transform};
pub use settings::Settings;
