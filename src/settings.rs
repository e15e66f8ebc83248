//! Layered configuration: defaults, optional config file, environment

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub generator: GeneratorSettings,
    pub cache: CacheSettings,
}

/// Schema / pattern generation endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSettings {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Sample markup longer than this is truncated before sending
    pub max_sample_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub directory: String,
}

impl Settings {
    /// Load settings
    ///
    /// Sources, later ones overriding earlier ones:
    /// - built-in defaults
    /// - `config/structured_extract.{toml,yaml,json}` if present
    /// - `STRUCTURED_EXTRACT__*` environment variables
    ///   (e.g. `STRUCTURED_EXTRACT__GENERATOR__API_KEY`)
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder(Some("config/structured_extract"))?.build()?.try_deserialize()
    }

    /// Load settings from an explicit file on top of the defaults, ignoring the environment
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Self::defaults()?.build()?)
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("generator.api_base_url", "https://api.openai.com/v1")?
            .set_default("generator.model", "gpt-4o-mini")?
            .set_default("generator.timeout_secs", 60)?
            .set_default("generator.max_sample_chars", 20_000)?
            .set_default("cache.directory", "./schema_cache")
    }

    fn builder(file: Option<&str>) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }
        Ok(builder.add_source(Environment::with_prefix("STRUCTURED_EXTRACT").separator("__")))
    }
}
