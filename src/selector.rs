//! Field location: resolve one value or a list of values under a context node
//!
//! Selectors are compiled once (CSS directly, XPath through [`crate::xpath`])
//! and then evaluated read-only against any number of documents.

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::xpath::{self, Translated};

/// What to read from a located node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    /// Trimmed concatenated text content
    Text,
    /// Named attribute value; absent when the node lacks it
    Attribute(String),
    /// Serialized inner markup
    Html,
    /// First capture group (or whole match) of a regex over the text content
    Regex(String),
}

/// Post-processing applied to every located string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
    ParsePrice,
}

impl Transform {
    pub fn apply(self, value: &str) -> Option<String> {
        match self {
            Transform::Trim => Some(value.trim().to_string()),
            Transform::Lowercase => Some(value.to_lowercase()),
            Transform::Uppercase => Some(value.to_uppercase()),
            Transform::ParsePrice => parse_price(value),
        }
    }
}

/// Numeric part of a price: the first run of digits and separators.
/// The last `.`/`,` is the decimal point when one or two digits follow it;
/// every other separator is grouping.
fn parse_price(value: &str) -> Option<String> {
    let start = value.find(|c: char| c.is_ascii_digit())?;
    let run = &value[start..];
    let end = run
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(run.len());
    let run = run[..end].trim_end_matches(&['.', ','][..]);
    let digits = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();

    match run.rfind(&['.', ','][..]) {
        Some(pos) if (1..=2).contains(&(run.len() - pos - 1)) => {
            Some(format!("{}.{}", digits(&run[..pos]), &run[pos + 1..]))
        }
        _ => Some(digits(run)),
    }
}

/// A compiled selector, relative to a context node
#[derive(Debug, Clone)]
pub enum Target {
    /// The context node itself (empty selector or XPath `.`)
    Context,
    /// Descendants of the context node matching a selector
    Select(Selector),
}

impl Target {
    pub fn compile(expr: &str) -> Result<Self, ConfigError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(Target::Context);
        }

        let css = if xpath::is_xpath(expr) {
            match xpath::translate(expr)? {
                Translated::SelfNode => return Ok(Target::Context),
                Translated::Css(css) => css,
            }
        } else {
            expr.to_string()
        };

        Selector::parse(&css)
            .map(Target::Select)
            .map_err(|e| ConfigError::InvalidSelector {
                selector: expr.to_string(),
                reason: e.to_string(),
            })
    }

    /// Compile a selector evaluated under a container node. Absolute XPath
    /// (`/...` or `//...`) is rejected; use `./` or `.//` instead.
    pub fn compile_scoped(expr: &str) -> Result<Self, ConfigError> {
        let trimmed = expr.trim();
        if trimmed.starts_with('/') {
            return Err(ConfigError::UnsupportedXPath {
                expression: trimmed.to_string(),
                reason: "absolute path under a container; start it with `./` or `.//`".to_string(),
            });
        }
        Self::compile(trimmed)
    }

    /// First descendant match in document order
    pub fn first<'a>(&self, context: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match self {
            Target::Context => Some(context),
            Target::Select(selector) => context.select(selector).find(|el| el.id() != context.id()),
        }
    }

    /// All matches in document order
    pub fn all<'a>(&self, context: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Target::Context => vec![context],
            Target::Select(selector) => context
                .select(selector)
                .filter(|el| el.id() != context.id())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledMode {
    Text,
    Attribute(String),
    Html,
    Regex(Regex),
}

/// Outcome of locating a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    Absent,
    One(String),
    Many(Vec<String>),
}

/// Field Locator: target + extraction mode + cardinality
#[derive(Debug, Clone)]
pub struct Locator {
    target: Target,
    mode: CompiledMode,
    multiple: bool,
    transform: Option<Transform>,
}

impl Locator {
    pub fn compile(
        selector: &str,
        mode: &ExtractMode,
        multiple: bool,
        transform: Option<Transform>,
        field: &str,
    ) -> Result<Self, ConfigError> {
        let mode = match mode {
            ExtractMode::Text => CompiledMode::Text,
            ExtractMode::Html => CompiledMode::Html,
            ExtractMode::Attribute(name) if name.trim().is_empty() => {
                return Err(ConfigError::MissingAttribute {
                    field: field.to_string(),
                })
            }
            ExtractMode::Attribute(name) => CompiledMode::Attribute(name.trim().to_string()),
            ExtractMode::Regex(pattern) => {
                let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    label: field.to_string(),
                    reason: e.to_string(),
                })?;
                CompiledMode::Regex(re)
            }
        };

        Ok(Self {
            target: Target::compile_scoped(selector)?,
            mode,
            multiple,
            transform,
        })
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Resolve against a context node. Never fails: no match is `Absent`
    /// (single) or an empty list (multiple).
    pub fn locate(&self, context: ElementRef<'_>) -> Located {
        if self.multiple {
            let values = self
                .target
                .all(context)
                .into_iter()
                .filter_map(|el| self.read(el))
                .collect();
            return Located::Many(values);
        }

        match self.target.first(context).and_then(|el| self.read(el)) {
            Some(v) => Located::One(v),
            None => Located::Absent,
        }
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.mode {
            CompiledMode::Text => Some(element_text(element)),
            CompiledMode::Html => Some(element.inner_html()),
            CompiledMode::Attribute(name) => element.value().attr(name).map(String::from),
            CompiledMode::Regex(re) => {
                let text = element_text(element);
                re.captures(&text)
                    .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                    .map(|m| m.as_str().to_string())
            }
        }?;

        match self.transform {
            Some(t) => t.apply(&raw),
            None => Some(raw),
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
