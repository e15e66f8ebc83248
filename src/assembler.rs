//! Record assembly: apply a field group to one container node
//!
//! Missing values never abort a record:
//! - single-valued leaf with no value: key omitted (or `default` when declared)
//! - multi-valued leaf with no matches: `[]`
//! - nested group with no sub-container: `{}`
//! - nested list with no sub-containers: `[]`

use scraper::ElementRef;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::schema::{compile_fields, CompiledField, Field};
use crate::selector::Located;

/// One extracted record; keys follow field declaration order
pub type Record = Map<String, Value>;

/// Validate `fields` and assemble a record from `container`
pub fn assemble_record(container: ElementRef<'_>, fields: &[Field]) -> Result<Record, ConfigError> {
    let compiled = compile_fields(fields)?;
    Ok(assemble(container, &compiled))
}

pub(crate) fn assemble(container: ElementRef<'_>, fields: &[CompiledField]) -> Record {
    let mut record = Record::new();
    assemble_into(container, fields, &mut record);
    record
}

pub(crate) fn assemble_into(container: ElementRef<'_>, fields: &[CompiledField], record: &mut Record) {
    for field in fields {
        match field {
            CompiledField::Leaf {
                name,
                locator,
                default,
            } => match locator.locate(container) {
                Located::One(value) => {
                    record.insert(name.clone(), Value::String(value));
                }
                Located::Many(values) => {
                    let values = values.into_iter().map(Value::String).collect();
                    record.insert(name.clone(), Value::Array(values));
                }
                Located::Absent => {
                    if let Some(default) = default {
                        record.insert(name.clone(), default.clone());
                    }
                }
            },
            CompiledField::Nested { name, target, fields } => {
                let nested = target
                    .first(container)
                    .map(|sub| assemble(sub, fields))
                    .unwrap_or_default();
                record.insert(name.clone(), Value::Object(nested));
            }
            CompiledField::NestedList { name, target, fields } => {
                let items = target
                    .all(container)
                    .into_iter()
                    .map(|sub| Value::Object(assemble(sub, fields)))
                    .collect();
                record.insert(name.clone(), Value::Array(items));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldGroup, SelectorSpec};
    use scraper::{Html, Selector};
    use serde_json::json;

    const HTML: &str = r#"
    <div class="card">
        <span class="price">$5</span>
        <h2 class="title">Lamp</h2>
        <div class="seller"><span class="name">ACME</span></div>
        <ul>
            <li><b>color</b><i>red</i></li>
            <li><b>size</b><i>L</i></li>
            <li><b>weight</b></li>
        </ul>
    </div>
    "#;

    fn card(doc: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("div.card").unwrap();
        doc.select(&sel).next().unwrap()
    }

    #[test]
    fn test_declaration_order_and_nesting() {
        let doc = Html::parse_document(HTML);
        let fields: FieldGroup = vec![
            SelectorSpec::text("title", ".title").into(),
            SelectorSpec::text("price", ".price").into(),
            Field::nested("seller", ".seller", vec![SelectorSpec::text("name", ".name").into()]),
            Field::nested_list(
                "specs",
                "li",
                vec![
                    SelectorSpec::text("key", "b").into(),
                    SelectorSpec::text("value", "i").into(),
                ],
            ),
        ];

        let record = assemble_record(card(&doc), &fields).unwrap();
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        // "price" precedes "title" in the DOM but not in the declaration
        assert_eq!(keys, vec!["title", "price", "seller", "specs"]);

        assert_eq!(
            Value::Object(record),
            json!({
                "title": "Lamp",
                "price": "$5",
                "seller": {"name": "ACME"},
                "specs": [
                    {"key": "color", "value": "red"},
                    {"key": "size", "value": "L"},
                    {"key": "weight"}
                ]
            })
        );
    }

    #[test]
    fn test_missing_values_do_not_abort() {
        let doc = Html::parse_document(HTML);
        let fields: FieldGroup = vec![
            SelectorSpec::text("title", ".title").into(),
            SelectorSpec::text("rating", ".rating").into(),
            SelectorSpec::attribute("image", "img", "src").into(),
            SelectorSpec::text("stock", ".stock")
                .default_value(json!("unknown"))
                .into(),
            SelectorSpec::text("badges", ".badge").multiple().into(),
            Field::nested("brand", ".brand", vec![SelectorSpec::text("name", ".name").into()]),
            Field::nested_list("reviews", ".review", vec![SelectorSpec::text("body", "p").into()]),
        ];

        let record = assemble_record(card(&doc), &fields).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({
                "title": "Lamp",
                "stock": "unknown",
                "badges": [],
                "brand": {},
                "reviews": []
            })
        );
    }

    #[test]
    fn test_invalid_group_is_reported() {
        let doc = Html::parse_document(HTML);
        let fields: FieldGroup = vec![SelectorSpec::text("t", "h2[").into()];
        assert!(assemble_record(card(&doc), &fields).is_err());
    }
}
