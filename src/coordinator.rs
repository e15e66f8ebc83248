//! Fallback chain across extraction strategies
//!
//! Strategies run in order until one produces a non-empty result. A
//! strategy error is recorded and the chain moves on; only exhausting the
//! chain ends in [`Outcome::AllStrategiesFailed`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ExtractError};
use crate::extractors::{ExtractionStrategy, Page, PatternExtractor, PatternInput, SchemaExtractor};
use crate::patterns::PatternSetDefinition;
use crate::schema::SchemaDefinition;

/// Serializable strategy description, so a chain can be plain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    Schema {
        schema: SchemaDefinition,
    },
    Patterns {
        #[serde(default = "default_pattern_name")]
        name: String,
        patterns: PatternSetDefinition,
        #[serde(default)]
        input: PatternInput,
    },
}

fn default_pattern_name() -> String {
    "patterns".to_string()
}

impl StrategySpec {
    pub fn build(&self) -> Result<Box<dyn ExtractionStrategy>, ConfigError> {
        Ok(match self {
            StrategySpec::Schema { schema } => Box::new(SchemaExtractor::new(schema.clone())?),
            StrategySpec::Patterns {
                name,
                patterns,
                input,
            } => Box::new(PatternExtractor::new(name.clone(), patterns.clone())?.with_input(*input)),
        })
    }
}

/// Why a strategy did not win
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptFailure {
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub index: usize,
    pub strategy: String,
    #[serde(flatten)]
    pub failure: AttemptFailure,
}

/// Output of the first strategy that produced something
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Success {
    pub index: usize,
    pub strategy: String,
    pub items: Vec<Value>,
    /// Strategies tried before this one
    pub skipped: Vec<Attempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Extracted(Success),
    AllStrategiesFailed { attempts: Vec<Attempt> },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Extracted(_))
    }

    /// Turn exhaustion into an error for callers that escalate on it
    pub fn into_result(self) -> Result<Success, ExtractError> {
        match self {
            Outcome::Extracted(success) => Ok(success),
            Outcome::AllStrategiesFailed { attempts } => Err(ExtractError::AllStrategiesFailed {
                attempts: attempts.len(),
            }),
        }
    }
}

/// Ordered list of strategies tried against one page at a time
#[derive(Default)]
pub struct StrategyCoordinator {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[StrategySpec]) -> Result<Self, ConfigError> {
        let strategies = specs.iter().map(StrategySpec::build).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { strategies })
    }

    pub fn with_strategy(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn run(&self, page: &Page) -> Outcome {
        let mut attempts = Vec::new();

        for (index, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name().to_string();
            match strategy.extract(page) {
                Ok(items) if !items.is_empty() => {
                    info!(strategy = %name, index, items = items.len(), "strategy succeeded");
                    return Outcome::Extracted(Success {
                        index,
                        strategy: name,
                        items,
                        skipped: attempts,
                    });
                }
                Ok(_) => {
                    debug!(strategy = %name, index, "strategy produced no items");
                    attempts.push(Attempt {
                        index,
                        strategy: name,
                        failure: AttemptFailure::Empty,
                    });
                }
                Err(e) => {
                    warn!(strategy = %name, index, error = %e, "strategy failed");
                    attempts.push(Attempt {
                        index,
                        strategy: name,
                        failure: AttemptFailure::Failed(e.to_string()),
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "no strategy succeeded");
        Outcome::AllStrategiesFailed { attempts }
    }

    pub fn run_html(&self, html: &str) -> Outcome {
        self.run(&Page::parse(html))
    }
}
