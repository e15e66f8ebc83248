//! Error types for schema validation, generation, caching and extraction

use thiserror::Error;

/// Problems in a schema or pattern set, reported before any document is touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("unsupported XPath `{expression}`: {reason}")]
    UnsupportedXPath { expression: String, reason: String },

    #[error("duplicate field name `{name}`")]
    DuplicateField { name: String },

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("field `{field}` uses attribute mode without an attribute name")]
    MissingAttribute { field: String },

    #[error("field `{field}` uses regex mode without a pattern")]
    MissingPattern { field: String },

    #[error("invalid pattern for `{label}`: {reason}")]
    InvalidPattern { label: String, reason: String },

    #[error("duplicate pattern label `{label}`")]
    DuplicateLabel { label: String },

    #[error("nested field `{field}` declares no sub-fields")]
    EmptyGroup { field: String },

    #[error("field groups nest deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("unknown field type `{0}`")]
    UnknownFieldType(String),

    #[error("malformed definition: {0}")]
    Malformed(String),
}

/// Failures of the external schema / pattern generation call
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generator not configured: {0}")]
    NotConfigured(String),

    #[error("generation request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation endpoint returned HTTP {0}")]
    Status(u16),

    #[error("unparsable generation result: {0}")]
    Unparsable(String),

    #[error("generated definition is invalid: {0}")]
    InvalidSchema(#[source] ConfigError),

    #[error("generator returned an empty definition")]
    EmptyResult,
}

/// Failures of the cache persistence layer
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry `{key}`: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cache entry `{key}` does not hold a {expected}")]
    PayloadMismatch { key: String, expected: &'static str },

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Umbrella error for callers driving the whole pipeline
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("strategy `{strategy}` failed: {reason}")]
    Strategy { strategy: String, reason: String },

    #[error("no strategy succeeded ({attempts} attempted)")]
    AllStrategiesFailed { attempts: usize },
}
