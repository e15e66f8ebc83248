//! Schema data model and its JSON wire format
//!
//! A schema is authored by hand or produced by a generator, serialized into
//! the cache, and compiled once into a [`CompiledSchema`] before use. The
//! JSON shape is the persisted cache payload:
//!
//! ```json
//! {
//!   "name": "Products",
//!   "baseSelector": "div.product",
//!   "baseFields": [{"name": "category", "selector": "h1", "type": "text"}],
//!   "fields": [
//!     {"name": "title", "selector": "h2", "type": "text"},
//!     {"name": "link", "selector": "a", "type": "attribute", "attribute": "href"},
//!     {"name": "specs", "selector": "ul.specs li", "type": "nested_list",
//!      "fields": [{"name": "value", "selector": "", "type": "text"}]}
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::selector::{ExtractMode, Locator, Target, Transform};

/// Groups may nest at most this deep
pub const MAX_NESTING_DEPTH: usize = 32;

/// Leaf field: one named value read by a selector
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSpec {
    pub name: String,
    pub selector: String,
    pub mode: ExtractMode,
    pub multiple: bool,
    pub transform: Option<Transform>,
    /// Used when a single-valued field is absent
    pub default: Option<Value>,
}

impl SelectorSpec {
    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::with_mode(name, selector, ExtractMode::Text)
    }

    pub fn attribute(
        name: impl Into<String>,
        selector: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::with_mode(name, selector, ExtractMode::Attribute(attribute.into()))
    }

    pub fn html(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::with_mode(name, selector, ExtractMode::Html)
    }

    pub fn with_mode(name: impl Into<String>, selector: impl Into<String>, mode: ExtractMode) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            mode,
            multiple: false,
            transform: None,
            default: None,
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Sub-group scoped to a sub-selector
#[derive(Debug, Clone, PartialEq)]
pub struct NestedGroup {
    pub name: String,
    pub selector: String,
    pub fields: FieldGroup,
}

/// One entry of a field group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireField", into = "WireField")]
pub enum Field {
    Leaf(SelectorSpec),
    /// First matching sub-container, assembled into a nested record
    Nested(NestedGroup),
    /// Every matching sub-container, assembled into a list of records
    NestedList(NestedGroup),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Leaf(spec) => &spec.name,
            Field::Nested(group) | Field::NestedList(group) => &group.name,
        }
    }

    pub fn nested(name: impl Into<String>, selector: impl Into<String>, fields: FieldGroup) -> Self {
        Field::Nested(NestedGroup {
            name: name.into(),
            selector: selector.into(),
            fields,
        })
    }

    pub fn nested_list(name: impl Into<String>, selector: impl Into<String>, fields: FieldGroup) -> Self {
        Field::NestedList(NestedGroup {
            name: name.into(),
            selector: selector.into(),
            fields,
        })
    }
}

impl From<SelectorSpec> for Field {
    fn from(spec: SelectorSpec) -> Self {
        Field::Leaf(spec)
    }
}

/// Ordered fields; declaration order is record key order
pub type FieldGroup = Vec<Field>;

/// Declarative description of the records on a family of pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub name: String,
    pub base_selector: String,
    /// Resolved once per document and merged into every record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_fields: FieldGroup,
    pub fields: FieldGroup,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, base_selector: impl Into<String>, fields: FieldGroup) -> Self {
        Self {
            name: name.into(),
            base_selector: base_selector.into(),
            base_fields: Vec::new(),
            fields,
        }
    }

    pub fn with_base_fields(mut self, base_fields: FieldGroup) -> Self {
        self.base_fields = base_fields;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings, enums and `Value`s cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate and compile every selector, pattern and name in the schema
    pub fn compile(&self) -> Result<CompiledSchema, ConfigError> {
        let base = Target::compile(&self.base_selector)?;

        let mut names = HashSet::new();
        for field in self.base_fields.iter().chain(self.fields.iter()) {
            if !names.insert(field.name()) {
                return Err(ConfigError::DuplicateField {
                    name: field.name().to_string(),
                });
            }
        }

        Ok(CompiledSchema {
            name: self.name.clone(),
            base,
            base_fields: compile_group(&self.base_fields, 1)?,
            fields: compile_group(&self.fields, 1)?,
        })
    }
}

/// Validated schema with compiled selectors; immutable and shareable across threads
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub(crate) name: String,
    pub(crate) base: Target,
    pub(crate) base_fields: Vec<CompiledField>,
    pub(crate) fields: Vec<CompiledField>,
}

impl CompiledSchema {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CompiledField {
    Leaf {
        name: String,
        locator: Locator,
        default: Option<Value>,
    },
    Nested {
        name: String,
        target: Target,
        fields: Vec<CompiledField>,
    },
    NestedList {
        name: String,
        target: Target,
        fields: Vec<CompiledField>,
    },
}

pub(crate) fn compile_fields(group: &[Field]) -> Result<Vec<CompiledField>, ConfigError> {
    compile_group(group, 1)
}

fn compile_group(group: &[Field], depth: usize) -> Result<Vec<CompiledField>, ConfigError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ConfigError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }

    let mut seen = HashSet::new();
    let mut compiled = Vec::with_capacity(group.len());

    for field in group {
        let name = field.name();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateField {
                name: name.to_string(),
            });
        }

        compiled.push(match field {
            Field::Leaf(spec) => CompiledField::Leaf {
                name: spec.name.clone(),
                locator: Locator::compile(&spec.selector, &spec.mode, spec.multiple, spec.transform, &spec.name)?,
                default: spec.default.clone(),
            },
            Field::Nested(group) | Field::NestedList(group) => {
                if group.fields.is_empty() {
                    return Err(ConfigError::EmptyGroup {
                        field: group.name.clone(),
                    });
                }
                let target = Target::compile_scoped(&group.selector)?;
                let fields = compile_group(&group.fields, depth + 1)?;
                if matches!(field, Field::Nested(_)) {
                    CompiledField::Nested {
                        name: group.name.clone(),
                        target,
                        fields,
                    }
                } else {
                    CompiledField::NestedList {
                        name: group.name.clone(),
                        target,
                        fields,
                    }
                }
            }
        });
    }

    Ok(compiled)
}

/// Flat JSON representation of a [`Field`], tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireField {
    name: String,
    #[serde(default)]
    selector: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<Field>>,
}

impl TryFrom<WireField> for Field {
    type Error = ConfigError;

    fn try_from(wire: WireField) -> Result<Self, Self::Error> {
        if wire.attribute.is_some() && wire.kind != "attribute" {
            return Err(ConfigError::Malformed(format!(
                "field `{}` of type `{}` must not declare an attribute",
                wire.name, wire.kind
            )));
        }

        let mode = match wire.kind.as_str() {
            "text" => ExtractMode::Text,
            "html" => ExtractMode::Html,
            "attribute" => ExtractMode::Attribute(
                wire.attribute
                    .ok_or_else(|| ConfigError::MissingAttribute { field: wire.name.clone() })?,
            ),
            "regex" => ExtractMode::Regex(
                wire.pattern
                    .ok_or_else(|| ConfigError::MissingPattern { field: wire.name.clone() })?,
            ),
            "nested" | "nested_list" => {
                let group = NestedGroup {
                    name: wire.name,
                    selector: wire.selector,
                    fields: wire.fields.unwrap_or_default(),
                };
                return Ok(if wire.kind == "nested" {
                    Field::Nested(group)
                } else {
                    Field::NestedList(group)
                });
            }
            other => return Err(ConfigError::UnknownFieldType(other.to_string())),
        };

        Ok(Field::Leaf(SelectorSpec {
            name: wire.name,
            selector: wire.selector,
            mode,
            multiple: wire.multiple,
            transform: wire.transform,
            default: wire.default,
        }))
    }
}

impl From<Field> for WireField {
    fn from(field: Field) -> Self {
        let empty = |name: String, selector: String, kind: &str| WireField {
            name,
            selector,
            kind: kind.to_string(),
            attribute: None,
            pattern: None,
            multiple: false,
            transform: None,
            default: None,
            fields: None,
        };

        match field {
            Field::Leaf(spec) => {
                let (kind, attribute, pattern) = match spec.mode {
                    ExtractMode::Text => ("text", None, None),
                    ExtractMode::Html => ("html", None, None),
                    ExtractMode::Attribute(a) => ("attribute", Some(a), None),
                    ExtractMode::Regex(p) => ("regex", None, Some(p)),
                };
                WireField {
                    attribute,
                    pattern,
                    multiple: spec.multiple,
                    transform: spec.transform,
                    default: spec.default,
                    ..empty(spec.name, spec.selector, kind)
                }
            }
            Field::Nested(group) => WireField {
                fields: Some(group.fields),
                ..empty(group.name, group.selector, "nested")
            },
            Field::NestedList(group) => WireField {
                fields: Some(group.fields),
                ..empty(group.name, group.selector, "nested_list")
            },
        }
    }
}
