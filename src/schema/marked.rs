//! Parse results with an explicit side channel
//!
//! Parsing never hides facts inside the document. Annotated nodes and inline
//! reference placeholders are their own variants, stripped by
//! [`MarkedValue::into_value`].

use serde_json::{Map, Value};

use crate::builder::RefFacts;
use crate::entity_type::EntityType;
use crate::error::{RefError, Result};
use crate::path::{self, PathSegment, ReferencePath};
use crate::types::OnDelete;

/// Reference facts carried by an inline placeholder (its path is wherever it sits)
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMarker {
    pub entity_type: EntityType,
    pub parent_path: Option<ReferencePath>,
    pub on_delete: OnDelete,
}

/// A parsed document node
#[derive(Debug, Clone)]
pub enum MarkedValue {
    /// Leaf, or a subtree the schema did not look into
    Plain(Value),
    Array(Vec<MarkedValue>),
    Object(Vec<(String, MarkedValue)>),
    /// Node with entities/references declared on it
    Annotated {
        value: Box<MarkedValue>,
        facts: RefFacts,
    },
    /// Inline reference placeholder
    Reference {
        value: String,
        marker: ReferenceMarker,
    },
}

impl MarkedValue {
    /// Plain document, side channel dropped
    pub fn into_value(self) -> Value {
        match self {
            Self::Plain(value) => value,
            Self::Array(items) => Value::Array(items.into_iter().map(Self::into_value).collect()),
            Self::Object(entries) => {
                let map: Map<String, Value> = entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into_value()))
                    .collect();
                Value::Object(map)
            }
            Self::Annotated { value, .. } => value.into_value(),
            Self::Reference { value, .. } => Value::String(value),
        }
    }

    /// Strip any annotation wrappers
    pub fn unwrap_annotations(&self) -> &MarkedValue {
        match self {
            Self::Annotated { value, .. } => value.unwrap_annotations(),
            other => other,
        }
    }

    /// Write `value` at `relative`; the final object key may be new
    pub fn set(&mut self, relative: &ReferencePath, value: Value) -> Result<()> {
        set_segments(self, relative.segments(), value).map_err(|_| RefError::PathNotFound {
            path: relative.to_string(),
        })
    }
}

fn set_segments(node: &mut MarkedValue, segments: &[PathSegment], value: Value) -> Result<()> {
    let missing = || RefError::PathNotFound {
        path: ReferencePath::from(segments.to_vec()).to_string(),
    };
    match node {
        MarkedValue::Annotated { value: inner, .. } => return set_segments(inner, segments, value),
        MarkedValue::Plain(json) => return path::set(json, &segments.to_vec().into(), value),
        _ => {}
    }

    let Some((segment, rest)) = segments.split_first() else {
        *node = MarkedValue::Plain(value);
        return Ok(());
    };

    match (segment, node) {
        (PathSegment::Key(key), MarkedValue::Object(entries)) => {
            match entries.iter().position(|(k, _)| k == key) {
                Some(pos) => set_segments(&mut entries[pos].1, rest, value),
                None if rest.is_empty() => {
                    entries.push((key.clone(), MarkedValue::Plain(value)));
                    Ok(())
                }
                None => Err(missing()),
            }
        }
        (PathSegment::Index(i), MarkedValue::Array(items)) => {
            let child = items.get_mut(*i).ok_or_else(missing)?;
            set_segments(child, rest, value)
        }
        _ => Err(missing()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_value_strips_side_channel() {
        let model = EntityType::new("model");
        let marked = MarkedValue::Object(vec![
            (
                "ref".to_string(),
                MarkedValue::Reference {
                    value: "User".to_string(),
                    marker: ReferenceMarker {
                        entity_type: model,
                        parent_path: None,
                        on_delete: OnDelete::Restrict,
                    },
                },
            ),
            (
                "entity".to_string(),
                MarkedValue::Annotated {
                    value: Box::new(MarkedValue::Plain(json!({ "name": "User" }))),
                    facts: RefFacts::default(),
                },
            ),
        ]);
        assert_eq!(
            marked.into_value(),
            json!({ "ref": "User", "entity": { "name": "User" } })
        );
    }

    #[test]
    fn test_set_through_annotations_and_plain() {
        let mut marked = MarkedValue::Array(vec![MarkedValue::Annotated {
            value: Box::new(MarkedValue::Object(vec![(
                "name".to_string(),
                MarkedValue::Plain(json!("User")),
            )])),
            facts: RefFacts::default(),
        }]);
        marked.set(&"0.id".into(), json!("model:1")).unwrap();
        assert_eq!(marked.clone().into_value(), json!([{ "name": "User", "id": "model:1" }]));

        let mut plain = MarkedValue::Plain(json!({ "meta": {} }));
        plain.set(&"meta.id".into(), json!("x")).unwrap();
        assert_eq!(plain.into_value(), json!({ "meta": { "id": "x" } }));

        assert!(marked.set(&"3.id".into(), json!("x")).is_err());
    }
}
