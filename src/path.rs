//! Document Paths
//!
//! Typed paths into arbitrary JSON documents:
//! - [`ReferencePath`]: a concrete location (`models.0.fields.2.id`)
//! - [`PathPattern`]: a pattern with wildcards (`models.*.fields.*`)
//!
//! Patterns are validated when they are built, so walking a document can only
//! fail because the document does not have the shape the pattern describes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{RefError, Result};

// =============================================================================
// Concrete Paths
// =============================================================================

/// One step of a concrete path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array element
    Index(usize),
    /// Object field
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        match s.parse::<usize>() {
            Ok(i) => Self::Index(i),
            Err(_) => Self::Key(s.to_string()),
        }
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// A concrete location in a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferencePath(Vec<PathSegment>);

impl ReferencePath {
    /// The document root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path; all-digit segments become indices
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(PathSegment::from).collect())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    pub fn key(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Key(key.to_string()));
        path
    }

    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.0.push(PathSegment::Index(index));
        path
    }

    /// `self ++ other`
    pub fn join(&self, other: &ReferencePath) -> Self {
        let mut path = self.clone();
        path.0.extend(other.0.iter().cloned());
        path
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn starts_with(&self, prefix: &ReferencePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn strip_prefix(&self, prefix: &ReferencePath) -> Option<Self> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|s| Self(s.to_vec()))
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let dotted: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", dotted.join("."))
    }
}

impl From<&str> for ReferencePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<Vec<PathSegment>> for ReferencePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

// =============================================================================
// Path Patterns
// =============================================================================

/// One step of a path pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    /// Object field
    Field(String),
    /// Every element of an array
    Wildcard,
}

/// A path with `*` wildcards over array elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern(Vec<PatternSegment>);

impl TryFrom<String> for PathPattern {
    type Error = RefError;

    fn try_from(pattern: String) -> Result<Self> {
        Self::parse(&pattern)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.to_string()
    }
}

impl PathPattern {
    /// Parse `models.*.fields.*`
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self(Vec::new()));
        }
        let segments = pattern
            .split('.')
            .map(|segment| match segment {
                "" => Err(RefError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: "empty segment".to_string(),
                }),
                "*" => Ok(PatternSegment::Wildcard),
                s if s.contains('*') => Err(RefError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: format!("'{}' mixes a wildcard with a field name", s),
                }),
                s => Ok(PatternSegment::Field(s.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(segments))
    }

    pub fn from_segments(segments: Vec<PatternSegment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.0
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|s| match s {
                PatternSegment::Field(name) => name.as_str(),
                PatternSegment::Wildcard => "*",
            })
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// A value found by [`walk_path`]
#[derive(Debug, Clone)]
pub struct PathMatch<'a> {
    pub value: &'a Value,
    pub path: ReferencePath,
    /// Containers from the root down to the value's direct parent
    pub ancestors: Vec<&'a Value>,
}

/// Find every value matching `pattern` under `root`.
///
/// A `null` node counts as absent, like a missing field: the branch ends
/// without a match under any segment, `*` included. A wildcard over any other
/// non-array, or a field over an array, is a shape error.
pub fn walk_path<'a>(root: &'a Value, pattern: &PathPattern) -> Result<Vec<PathMatch<'a>>> {
    let mut matches = Vec::new();
    walk(root, pattern.segments(), ReferencePath::root(), Vec::new(), &mut matches)?;
    Ok(matches)
}

fn walk<'a>(
    node: &'a Value,
    segments: &[PatternSegment],
    path: ReferencePath,
    ancestors: Vec<&'a Value>,
    out: &mut Vec<PathMatch<'a>>,
) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(PathMatch {
            value: node,
            path,
            ancestors,
        });
        return Ok(());
    };

    match (segment, node) {
        (_, Value::Null) => Ok(()),
        (PatternSegment::Wildcard, Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let mut chain = ancestors.clone();
                chain.push(node);
                walk(item, rest, path.index(i), chain, out)?;
            }
            Ok(())
        }
        (PatternSegment::Wildcard, _) => Err(RefError::PatternMismatch {
            path: path.to_string(),
            expected: "an array for '*'",
        }),
        (PatternSegment::Field(name), Value::Object(map)) => match map.get(name) {
            Some(child) => {
                let mut chain = ancestors;
                chain.push(node);
                walk(child, rest, path.key(name), chain, out)
            }
            None => Ok(()),
        },
        (PatternSegment::Field(_), Value::Array(_)) => Err(RefError::PatternMismatch {
            path: path.to_string(),
            expected: "an object but found an array (use '*')",
        }),
        (PatternSegment::Field(_), _) => Err(RefError::PatternMismatch {
            path: path.to_string(),
            expected: "an object",
        }),
    }
}

// =============================================================================
// Get / Set
// =============================================================================

/// Read the value at `path`; missing intermediate nodes yield `None`
pub fn get<'a>(root: &'a Value, path: &ReferencePath) -> Option<&'a Value> {
    path.segments().iter().try_fold(root, |node, segment| match (segment, node) {
        (PathSegment::Key(key), Value::Object(map)) => map.get(key),
        (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
        (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
        _ => None,
    })
}

/// Read a string at `path`
pub fn get_str<'a>(root: &'a Value, path: &ReferencePath) -> Option<&'a str> {
    get(root, path).and_then(Value::as_str)
}

pub fn get_mut<'a>(root: &'a mut Value, path: &ReferencePath) -> Option<&'a mut Value> {
    path.segments().iter().try_fold(root, |node, segment| match (segment, node) {
        (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key),
        (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
        (PathSegment::Index(i), Value::Object(map)) => map.get_mut(&i.to_string()),
        _ => None,
    })
}

/// Write `value` at `path`.
///
/// The parent container must already exist; only the final object key may be
/// new. Intermediate nodes are never created.
pub fn set(root: &mut Value, path: &ReferencePath, value: Value) -> Result<()> {
    let not_found = || RefError::PathNotFound {
        path: path.to_string(),
    };
    let Some(last) = path.last() else {
        *root = value;
        return Ok(());
    };
    let parent_path = path.parent().ok_or_else(not_found)?;
    let parent = get_mut(root, &parent_path).ok_or_else(not_found)?;

    match (last, parent) {
        (PathSegment::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (PathSegment::Index(i), Value::Object(map)) => {
            map.insert(i.to_string(), value);
            Ok(())
        }
        (PathSegment::Index(i), Value::Array(items)) => {
            let slot = items.get_mut(*i).ok_or_else(not_found)?;
            *slot = value;
            Ok(())
        }
        _ => Err(not_found()),
    }
}

/// Remove an object key at `path`, returning the previous value
pub fn remove(root: &mut Value, path: &ReferencePath) -> Option<Value> {
    let parent = get_mut(root, &path.parent()?)?;
    match (path.last()?, parent) {
        (PathSegment::Key(key), Value::Object(map)) => map.shift_remove(key),
        (PathSegment::Index(i), Value::Object(map)) => map.shift_remove(&i.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        let path = ReferencePath::parse("models.0.fields.12.id");
        assert_eq!(path.len(), 5);
        assert_eq!(path.segments()[1], PathSegment::Index(0));
        assert_eq!(path.to_string(), "models.0.fields.12.id");
        assert_eq!(ReferencePath::root().to_string(), "<root>");
        assert_eq!(ReferencePath::parse("a.b").parent(), Some(ReferencePath::parse("a")));
    }

    #[test]
    fn test_path_serializes_as_segment_array() {
        let path = ReferencePath::parse("refs.1");
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["refs", 1]));
    }

    #[test]
    fn test_invalid_patterns_rejected_at_construction() {
        assert!(PathPattern::parse("models..fields").is_err());
        assert!(PathPattern::parse("models.*x").is_err());
        assert_eq!(
            PathPattern::parse("models.*.name").unwrap().to_string(),
            "models.*.name"
        );
    }

    #[test]
    fn test_walk_wildcards() {
        let doc = json!({
            "models": [
                { "name": "User", "fields": [{ "name": "id" }, { "name": "email" }] },
                { "name": "Post", "fields": [{ "name": "title" }] },
                { "name": "Empty" }
            ]
        });
        let pattern = PathPattern::parse("models.*.fields.*.name").unwrap();
        let matches = walk_path(&doc, &pattern).unwrap();
        let found: Vec<(String, &Value)> =
            matches.iter().map(|m| (m.path.to_string(), m.value)).collect();
        assert_eq!(
            found,
            vec![
                ("models.0.fields.0.name".to_string(), &json!("id")),
                ("models.0.fields.1.name".to_string(), &json!("email")),
                ("models.1.fields.0.name".to_string(), &json!("title")),
            ]
        );
        // root, models array, model, fields array, field
        assert_eq!(matches[0].ancestors.len(), 5);
        assert_eq!(matches[0].ancestors[2]["name"], json!("User"));
    }

    #[test]
    fn test_walk_shape_errors() {
        let doc = json!({ "models": { "a": 1 }, "list": [1, 2] });
        let err = walk_path(&doc, &PathPattern::parse("models.*").unwrap()).unwrap_err();
        assert!(matches!(err, RefError::PatternMismatch { ref path, .. } if path == "models"));

        let err = walk_path(&doc, &PathPattern::parse("list.name").unwrap()).unwrap_err();
        assert!(matches!(err, RefError::PatternMismatch { .. }));
    }

    #[test]
    fn test_walk_treats_null_as_absent() {
        let doc = json!({ "models": null, "fields": [null, { "name": "email" }] });
        assert!(walk_path(&doc, &PathPattern::parse("models.*").unwrap()).unwrap().is_empty());
        let matches = walk_path(&doc, &PathPattern::parse("fields.*.name").unwrap()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path.to_string(), "fields.1.name");
    }

    #[test]
    fn test_get_and_set() {
        let mut doc = json!({ "a": { "b": [10, { "c": "x" }] } });
        assert_eq!(get(&doc, &"a.b.1.c".into()), Some(&json!("x")));
        assert_eq!(get(&doc, &"a.missing.c".into()), None);
        assert_eq!(get(&doc, &"a.b.7".into()), None);

        set(&mut doc, &"a.b.1.c".into(), json!("y")).unwrap();
        set(&mut doc, &"a.b.1.id".into(), json!("new")).unwrap();
        assert_eq!(doc["a"]["b"][1], json!({ "c": "y", "id": "new" }));

        assert!(set(&mut doc, &"a.nope.c".into(), json!(1)).is_err());
        assert!(set(&mut doc, &"a.b.5".into(), json!(1)).is_err());

        assert_eq!(remove(&mut doc, &"a.b.1.id".into()), Some(json!("new")));
        assert_eq!(doc["a"]["b"][1], json!({ "c": "y" }));
    }
}
