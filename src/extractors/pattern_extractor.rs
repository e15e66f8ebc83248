//! Pattern-driven extraction
//!
//! Runs a [`PatternSet`] over either the raw page source or its visible text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ExtractionStrategy, Page};
use crate::error::{ConfigError, ExtractError};
use crate::patterns::{Match, PatternSet, PatternSetDefinition};

/// Which text a pattern strategy scans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternInput {
    /// Raw HTML source, markup included
    Html,
    /// Visible text content
    #[default]
    Text,
}

#[derive(Debug, Clone)]
pub struct PatternExtractor {
    name: String,
    definition: PatternSetDefinition,
    set: PatternSet,
    input: PatternInput,
}

impl PatternExtractor {
    pub fn new(name: impl Into<String>, definition: PatternSetDefinition) -> Result<Self, ConfigError> {
        let set = definition.compile()?;
        Ok(Self {
            name: name.into(),
            definition,
            set,
            input: PatternInput::default(),
        })
    }

    pub fn with_input(mut self, input: PatternInput) -> Self {
        self.input = input;
        self
    }

    pub fn definition(&self) -> &PatternSetDefinition {
        &self.definition
    }

    pub fn extract_text(&self, text: &str) -> Vec<Match> {
        let matches = self.set.extract(text);
        debug!(
            strategy = %self.name,
            patterns = self.set.len(),
            matches = matches.len(),
            "pattern extraction finished"
        );
        matches
    }
}

impl ExtractionStrategy for PatternExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, page: &Page) -> Result<Vec<Value>, ExtractError> {
        let matches = match self.input {
            PatternInput::Html => self.extract_text(page.source()),
            PatternInput::Text => self.extract_text(&page.text()),
        };
        matches
            .into_iter()
            .map(|m| {
                serde_json::to_value(m).map_err(|e| ExtractError::Strategy {
                    strategy: self.name.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
