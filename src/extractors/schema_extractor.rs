//! Schema-driven extraction
//!
//! Enumerates container nodes with the schema's base selector and assembles
//! one record per container, in document order.

use scraper::Html;
use serde_json::Value;
use tracing::debug;

use super::{ExtractionStrategy, Page};
use crate::assembler::{assemble, assemble_into, Record};
use crate::error::{ConfigError, ExtractError};
use crate::schema::{CompiledSchema, SchemaDefinition};
use crate::selector::Target;

/// A validated schema ready to run against any number of documents
#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    definition: SchemaDefinition,
    compiled: CompiledSchema,
}

impl SchemaExtractor {
    /// Validates the whole schema; a bad selector fails here, not at match time
    pub fn new(definition: SchemaDefinition) -> Result<Self, ConfigError> {
        let compiled = definition.compile()?;
        debug!(
            schema = %definition.name,
            fields = definition.fields.len(),
            "compiled extraction schema"
        );
        Ok(Self {
            definition,
            compiled,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::new(SchemaDefinition::from_json(json)?)
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    /// Extract records from a parsed document. No containers is an empty
    /// vector, not an error.
    pub fn extract(&self, document: &Html) -> Vec<Record> {
        let root = document.root_element();
        let base = assemble(root, &self.compiled.base_fields);

        let containers = match &self.compiled.base {
            Target::Context => vec![root],
            Target::Select(selector) => document.select(selector).collect(),
        };

        let records: Vec<Record> = containers
            .into_iter()
            .map(|container| {
                let mut record = base.clone();
                assemble_into(container, &self.compiled.fields, &mut record);
                record
            })
            .collect();

        debug!(
            schema = %self.compiled.name(),
            records = records.len(),
            "schema extraction finished"
        );
        records
    }

    pub fn extract_html(&self, html: &str) -> Vec<Record> {
        self.extract(&Html::parse_document(html))
    }
}

impl ExtractionStrategy for SchemaExtractor {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn extract(&self, page: &Page) -> Result<Vec<Value>, ExtractError> {
        Ok(SchemaExtractor::extract(self, page.document())
            .into_iter()
            .map(Value::Object)
            .collect())
    }
}
