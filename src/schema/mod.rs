//! Schema Annotation Layer
//!
//! A small validated-data schema language over `serde_json::Value`, plus the
//! wrappers that discover entities and references while a document is parsed:
//!
//! - [`with_ent`]: the node declares an entity
//! - [`with_ref`]: the node's value is a reference (inline placeholder)
//! - [`ref_builder`]: arbitrary declarations through a [`RefBuilder`]
//! - [`ref_context`]: opens a scope owning a set of [`ContextSlot`]s
//!
//! Parsing is a single depth-first pass. The scope table flows down into
//! children and forward across object fields in declaration order; array
//! elements, record values and `ref_context` open nested layers whose
//! bindings are dropped on exit.

pub mod marked;

pub use marked::{MarkedValue, ReferenceMarker};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::builder::{resolve_parent_path, EntityInput, RefBuilder, ReferenceInput};
use crate::error::{RefError, Result};
use crate::path::{PathSegment, ReferencePath};
use crate::scope::{ContextSlot, ScopeTable};

type AnnotateFn = dyn Fn(&mut RefBuilder<'_>, &Value) -> Result<()> + Send + Sync;

/// A document schema node
#[derive(Clone)]
pub enum Schema {
    /// Accepts anything, including absence
    Any,
    String,
    Number,
    Boolean,
    Literal(Value),
    Enum(Vec<String>),
    /// Absent or null is accepted
    Optional(Box<Schema>),
    /// Null is accepted
    Nullable(Box<Schema>),
    Array(Box<Schema>),
    /// Fields in declaration order; unknown keys are stripped
    Object(Vec<(String, Schema)>),
    /// Map with arbitrary keys
    Record(Box<Schema>),
    Annotated {
        inner: Box<Schema>,
        annotate: Arc<AnnotateFn>,
    },
    Reference {
        inner: Box<Schema>,
        input: Box<ReferenceInput>,
    },
    Context {
        slots: Vec<ContextSlot>,
        inner: Box<Schema>,
    },
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Literal(v) => write!(f, "Literal({})", v),
            Self::Enum(values) => f.debug_tuple("Enum").field(values).finish(),
            Self::Optional(inner) => f.debug_tuple("Optional").field(inner).finish(),
            Self::Nullable(inner) => f.debug_tuple("Nullable").field(inner).finish(),
            Self::Array(inner) => f.debug_tuple("Array").field(inner).finish(),
            Self::Object(fields) => f.debug_map().entries(fields.iter().map(|(k, v)| (k, v))).finish(),
            Self::Record(inner) => f.debug_tuple("Record").field(inner).finish(),
            Self::Annotated { inner, .. } => f.debug_tuple("Annotated").field(inner).finish(),
            Self::Reference { inner, input } => f
                .debug_struct("Reference")
                .field("type", &input.entity_type.name())
                .field("inner", inner)
                .finish(),
            Self::Context { slots, inner } => f
                .debug_struct("Context")
                .field("slots", &slots.iter().map(|s| s.name()).collect::<Vec<_>>())
                .field("inner", inner)
                .finish(),
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

pub fn any() -> Schema {
    Schema::Any
}

pub fn string() -> Schema {
    Schema::String
}

pub fn number() -> Schema {
    Schema::Number
}

pub fn boolean() -> Schema {
    Schema::Boolean
}

pub fn literal(value: impl Into<Value>) -> Schema {
    Schema::Literal(value.into())
}

pub fn enumeration<I, S>(values: I) -> Schema
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Schema::Enum(values.into_iter().map(Into::into).collect())
}

pub fn array(items: Schema) -> Schema {
    Schema::Array(Box::new(items))
}

pub fn object<I, K>(fields: I) -> Schema
where
    I: IntoIterator<Item = (K, Schema)>,
    K: Into<String>,
{
    Schema::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

pub fn record(values: Schema) -> Schema {
    Schema::Record(Box::new(values))
}

impl Schema {
    pub fn optional(self) -> Schema {
        Schema::Optional(Box::new(self))
    }

    pub fn nullable(self) -> Schema {
        Schema::Nullable(Box::new(self))
    }
}

/// Declare an entity on every node this schema parses.
///
/// Object schemas without a field for a top-level id get an optional string
/// one, so authors never have to supply ids for new entities.
pub fn with_ent(schema: Schema, input: EntityInput) -> Schema {
    let schema = match schema {
        Schema::Object(mut fields) if input.path.is_root() => {
            let id_key = match input.id_path.as_ref().map(ReferencePath::segments) {
                None => Some("id".to_string()),
                Some([PathSegment::Key(key)]) => Some(key.clone()),
                Some(_) => None,
            };
            if let Some(id_key) = id_key {
                if !fields.iter().any(|(k, _)| k == &id_key) {
                    fields.insert(0, (id_key, string().optional()));
                }
            }
            Schema::Object(fields)
        }
        other => other,
    };
    ref_builder(schema, move |builder, _| builder.add_entity(input.clone()).map(|_| ()))
}

/// The node's value is a reference.
///
/// A `ParentRef::Path` on `input` is relative to the object holding the
/// reference field.
pub fn with_ref(schema: Schema, input: ReferenceInput) -> Schema {
    Schema::Reference {
        inner: Box::new(schema),
        input: Box::new(input),
    }
}

/// Run `annotate` against every node this schema parses, before its children
pub fn ref_builder<F>(schema: Schema, annotate: F) -> Schema
where
    F: Fn(&mut RefBuilder<'_>, &Value) -> Result<()> + Send + Sync + 'static,
{
    Schema::Annotated {
        inner: Box::new(schema),
        annotate: Arc::new(annotate),
    }
}

/// Open a scope owning `slots`
pub fn ref_context(slots: impl IntoIterator<Item = ContextSlot>, schema: Schema) -> Schema {
    Schema::Context {
        slots: slots.into_iter().collect(),
        inner: Box::new(schema),
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expected(path: &ReferencePath, what: &str, got: &Value) -> RefError {
    RefError::validation(path, format!("expected {}, got {}", what, type_name(got)))
}

impl Schema {
    /// Validate `input`, returning the marked parse result
    pub fn parse(&self, input: &Value) -> Result<MarkedValue> {
        let (marked, _) = self.parse_node(Some(input), &ReferencePath::root(), ScopeTable::new())?;
        Ok(marked.unwrap_or(MarkedValue::Plain(Value::Null)))
    }

    /// Parse one node. `None` input means the key is absent; `None` output
    /// means the key stays absent. The returned scope is what following
    /// siblings see.
    pub(crate) fn parse_node(
        &self,
        input: Option<&Value>,
        path: &ReferencePath,
        scope: ScopeTable,
    ) -> Result<(Option<MarkedValue>, ScopeTable)> {
        match self {
            Schema::Any => Ok((input.cloned().map(MarkedValue::Plain), scope)),
            Schema::Optional(inner) => match input {
                None => Ok((None, scope)),
                Some(Value::Null) => Ok((Some(MarkedValue::Plain(Value::Null)), scope)),
                Some(_) => inner.parse_node(input, path, scope),
            },
            Schema::Nullable(inner) => match input {
                Some(Value::Null) => Ok((Some(MarkedValue::Plain(Value::Null)), scope)),
                _ => inner.parse_node(input, path, scope),
            },
            Schema::Annotated { inner, annotate } => match input {
                None => inner.parse_node(None, path, scope),
                Some(value) => parse_annotated(inner, annotate.as_ref(), value, path, scope),
            },
            Schema::Reference { inner, input: reference } => {
                parse_reference(inner, reference, input, path, scope)
            }
            Schema::Context { slots, inner } => {
                let (marked, _) = inner.parse_node(input, path, scope.declare(slots.iter()))?;
                Ok((marked, scope))
            }
            _ => {
                let value = input.ok_or_else(|| RefError::validation(path, "required"))?;
                self.parse_value(value, path, scope).map(|(m, s)| (Some(m), s))
            }
        }
    }

    fn parse_value(
        &self,
        value: &Value,
        path: &ReferencePath,
        scope: ScopeTable,
    ) -> Result<(MarkedValue, ScopeTable)> {
        let plain = || MarkedValue::Plain(value.clone());
        match (self, value) {
            (Schema::String, Value::String(_)) => Ok((plain(), scope)),
            (Schema::String, other) => Err(expected(path, "string", other)),
            (Schema::Number, Value::Number(_)) => Ok((plain(), scope)),
            (Schema::Number, other) => Err(expected(path, "number", other)),
            (Schema::Boolean, Value::Bool(_)) => Ok((plain(), scope)),
            (Schema::Boolean, other) => Err(expected(path, "boolean", other)),
            (Schema::Literal(literal), other) => {
                if literal == other {
                    Ok((plain(), scope))
                } else {
                    Err(RefError::validation(path, format!("expected {}", literal)))
                }
            }
            (Schema::Enum(values), Value::String(s)) => {
                if values.iter().any(|v| v == s) {
                    Ok((plain(), scope))
                } else {
                    Err(RefError::validation(
                        path,
                        format!("'{}' is not one of {:?}", s, values),
                    ))
                }
            }
            (Schema::Enum(_), other) => Err(expected(path, "string", other)),
            (Schema::Array(item), Value::Array(items)) => {
                let mut parsed = Vec::with_capacity(items.len());
                for (i, element) in items.iter().enumerate() {
                    let (marked, _) = item.parse_node(Some(element), &path.index(i), scope.child())?;
                    parsed.push(marked.unwrap_or(MarkedValue::Plain(Value::Null)));
                }
                Ok((MarkedValue::Array(parsed), scope))
            }
            (Schema::Array(_), other) => Err(expected(path, "array", other)),
            (Schema::Object(fields), Value::Object(map)) => {
                let mut entries = Vec::with_capacity(fields.len());
                let mut scope = scope;
                for (key, field) in fields {
                    let (marked, next) = field.parse_node(map.get(key), &path.key(key), scope)?;
                    scope = next;
                    if let Some(marked) = marked {
                        entries.push((key.clone(), marked));
                    }
                }
                Ok((MarkedValue::Object(entries), scope))
            }
            (Schema::Object(_), other) => Err(expected(path, "object", other)),
            (Schema::Record(values), Value::Object(map)) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, element) in map {
                    let (marked, _) = values.parse_node(Some(element), &path.key(key), scope.child())?;
                    if let Some(marked) = marked {
                        entries.push((key.clone(), marked));
                    }
                }
                Ok((MarkedValue::Object(entries), scope))
            }
            (Schema::Record(_), other) => Err(expected(path, "object", other)),
            (wrapper, _) => {
                let (marked, scope) = wrapper.parse_node(Some(value), path, scope)?;
                Ok((marked.unwrap_or_else(plain), scope))
            }
        }
    }
}

fn parse_annotated(
    inner: &Schema,
    annotate: &AnnotateFn,
    value: &Value,
    path: &ReferencePath,
    scope: ScopeTable,
) -> Result<(Option<MarkedValue>, ScopeTable)> {
    let mut builder = RefBuilder::new(path.clone(), value, scope);
    annotate(&mut builder, value)?;
    let (facts, scope) = builder.finish();

    let (marked, scope) = inner.parse_node(Some(value), path, scope)?;
    let Some(mut marked) = marked else {
        return Ok((None, scope));
    };

    // the parsed document always carries the (possibly generated) ids
    for entity in &facts.entities {
        let relative = entity
            .id_path
            .strip_prefix(path)
            .ok_or_else(|| RefError::PathNotFound {
                path: entity.id_path.to_string(),
            })?;
        marked
            .set(&relative, Value::String(entity.id.clone()))
            .map_err(|_| RefError::PathNotFound {
                path: entity.id_path.to_string(),
            })?;
    }

    if facts.is_empty() {
        return Ok((Some(marked), scope));
    }
    Ok((
        Some(MarkedValue::Annotated {
            value: Box::new(marked),
            facts,
        }),
        scope,
    ))
}

fn parse_reference(
    inner: &Schema,
    reference: &ReferenceInput,
    input: Option<&Value>,
    path: &ReferencePath,
    scope: ScopeTable,
) -> Result<(Option<MarkedValue>, ScopeTable)> {
    let (marked, scope) = inner.parse_node(input, path, scope)?;
    let value = match marked {
        Some(MarkedValue::Plain(Value::String(value))) => value,
        None => return Ok((None, scope)),
        Some(MarkedValue::Plain(Value::Null)) => {
            return Ok((Some(MarkedValue::Plain(Value::Null)), scope))
        }
        Some(other) => {
            return Err(RefError::validation(
                path,
                format!("reference must be a string, got {}", type_name(&other.into_value())),
            ))
        }
    };

    let holder = path.parent().unwrap_or_default();
    let parent_path =
        resolve_parent_path(&scope, &holder, &reference.entity_type, reference.parent.as_ref())?;

    let scope = match &reference.add_context {
        Some(slot) => scope.provide(slot, path.clone(), &reference.entity_type, path)?,
        None => scope,
    };

    Ok((
        Some(MarkedValue::Reference {
            value,
            marker: marked::ReferenceMarker {
                entity_type: reference.entity_type.clone(),
                parent_path,
                on_delete: reference.on_delete,
            },
        }),
        scope,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_type::EntityType;
    use serde_json::json;

    #[test]
    fn test_plain_validation() {
        let schema = object([
            ("name", string()),
            ("count", number().optional()),
            ("kind", enumeration(["a", "b"])),
            ("tags", array(string())),
        ]);
        let parsed = schema
            .parse(&json!({ "name": "x", "kind": "a", "tags": ["t"], "extra": 1 }))
            .unwrap();
        assert_eq!(parsed.into_value(), json!({ "name": "x", "kind": "a", "tags": ["t"] }));

        let err = schema.parse(&json!({ "name": 1, "kind": "a", "tags": [] })).unwrap_err();
        assert_eq!(
            err,
            RefError::Validation {
                path: "name".to_string(),
                message: "expected string, got number".to_string()
            }
        );

        let err = schema.parse(&json!({ "name": "x", "kind": "c", "tags": [] })).unwrap_err();
        assert!(matches!(err, RefError::Validation { ref path, .. } if path == "kind"));

        let err = schema.parse(&json!({ "kind": "a", "tags": [] })).unwrap_err();
        assert!(matches!(err, RefError::Validation { ref message, .. } if message == "required"));
    }

    #[test]
    fn test_with_ent_substitutes_generated_id() {
        let model = EntityType::new("model");
        let schema = object([(
            "models",
            array(with_ent(
                object([("id", string().optional()), ("name", string())]),
                EntityInput::new(&model),
            )),
        )]);
        let parsed = schema
            .parse(&json!({ "models": [{ "name": "User" }, { "id": "model:2", "name": "Post" }] }))
            .unwrap();
        let data = parsed.into_value();
        assert!(data["models"][0]["id"].as_str().unwrap().starts_with("model:"));
        assert_eq!(data["models"][1]["id"], json!("model:2"));
    }

    #[test]
    fn test_with_ref_marks_value() {
        let model = EntityType::new("model");
        let schema = object([
            ("ref", with_ref(string(), ReferenceInput::new(&model))),
            ("maybe", with_ref(string().optional(), ReferenceInput::new(&model))),
        ]);
        let parsed = schema.parse(&json!({ "ref": "User" })).unwrap();
        let MarkedValue::Object(entries) = parsed else {
            panic!("expected object");
        };
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0].1, MarkedValue::Reference { value, .. } if value == "User"));
    }

    #[test]
    fn test_preceding_sibling_provides_context() {
        let model = EntityType::new("model");
        let field = EntityType::with_parent("field", &model);
        let slot = ContextSlot::new("model", &model);
        let schema = ref_context(
            [slot.clone()],
            object([
                ("modelRef", with_ref(string(), ReferenceInput::new(&model).add_context(&slot))),
                ("fieldRef", with_ref(string(), ReferenceInput::new(&field).parent(&slot))),
            ]),
        );
        let parsed = schema
            .parse(&json!({ "modelRef": "User", "fieldRef": "email" }))
            .unwrap();
        let MarkedValue::Object(entries) = parsed else {
            panic!("expected object");
        };
        match &entries[1].1 {
            MarkedValue::Reference { marker, .. } => {
                assert_eq!(marker.parent_path, Some(ReferencePath::parse("modelRef")));
            }
            other => panic!("expected reference, got {:?}", other),
        }

        // swapped order: the consumer precedes the provider
        let schema = ref_context(
            [slot.clone()],
            object([
                ("fieldRef", with_ref(string(), ReferenceInput::new(&field).parent(&slot))),
                ("modelRef", with_ref(string(), ReferenceInput::new(&model).add_context(&slot))),
            ]),
        );
        let err = schema
            .parse(&json!({ "modelRef": "User", "fieldRef": "email" }))
            .unwrap_err();
        assert!(matches!(err, RefError::UnresolvedContextSlot { .. }));
    }

    #[test]
    fn test_array_elements_get_their_own_scope() {
        let model = EntityType::new("model");
        let slot = ContextSlot::new("model", &model);
        let schema = ref_context(
            [slot.clone()],
            object([(
                "models",
                array(with_ent(
                    object([("id", string().optional()), ("name", string())]),
                    EntityInput::new(&model).add_context(&slot),
                )),
            )]),
        );
        // two models both provide the slot without clashing
        schema
            .parse(&json!({ "models": [{ "name": "A" }, { "name": "B" }] }))
            .unwrap();
    }
}
