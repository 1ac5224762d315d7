//! Document Tree - Generic Mapping/Sequence/Scalar Model
//!
//! Every fragment is converted into this closed model before merging.
//! Anything the YAML parser produces that does not fit is rejected here,
//! so the merge engine only ever sees known kinds.

use std::fmt;

use indexmap::IndexMap;
use serde::de::Deserialize;
use serde::ser::{Serialize, Serializer};
use serde_yaml::Value;
use tracing::error;

use crate::merge::MergeError;

/// Ordered, string-keyed mapping. Overwriting a key keeps its position.
pub type Mapping = IndexMap<String, Node>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Mapping(Mapping),
    Sequence(Vec<Node>),
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Mapping,
    Sequence,
    String,
    Boolean,
    Integer,
    Float,
    Null,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Mapping => "mapping",
            NodeKind::Sequence => "sequence",
            NodeKind::String => "string",
            NodeKind::Boolean => "boolean",
            NodeKind::Integer => "integer",
            NodeKind::Float => "float",
            NodeKind::Null => "null",
        };
        f.write_str(name)
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Mapping(_) => NodeKind::Mapping,
            Node::Sequence(_) => NodeKind::Sequence,
            Node::String(_) => NodeKind::String,
            Node::Bool(_) => NodeKind::Boolean,
            Node::Int(_) => NodeKind::Integer,
            Node::Float(_) => NodeKind::Float,
            Node::Null => NodeKind::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a key when this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Convert a parsed YAML value into a tree.
    ///
    /// `path` is the dotted key path of `value`, used in error messages.
    pub fn from_yaml(value: Value, path: &str) -> Result<Node, MergeError> {
        match value {
            Value::Null => Ok(Node::Null),
            Value::Bool(b) => Ok(Node::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Node::Int(i))
                } else if n.is_f64() {
                    Ok(Node::Float(n.as_f64().unwrap_or(f64::NAN)))
                } else {
                    Err(unsupported(path, format!("integer {} does not fit in 64 bits", n)))
                }
            }
            Value::String(s) => Ok(Node::String(s)),
            Value::Sequence(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    nodes.push(Node::from_yaml(item, &format!("{}[{}]", path, index))?);
                }
                Ok(Node::Sequence(nodes))
            }
            Value::Mapping(entries) => {
                let mut map = Mapping::with_capacity(entries.len());
                for (key, item) in entries {
                    let key = mapping_key(key, path)?;
                    let child = key_path(path, &key);
                    // `200` and `'200'` are distinct YAML keys but the same text.
                    if map.contains_key(&key) {
                        return Err(unsupported(&child, "duplicate mapping key after conversion to text".to_string()));
                    }
                    let node = Node::from_yaml(item, &child)?;
                    map.insert(key, node);
                }
                Ok(Node::Mapping(map))
            }
            Value::Tagged(tagged) => Err(unsupported(path, format!("tagged value {}", tagged.tag))),
        }
    }
}

impl From<Mapping> for Node {
    fn from(map: Mapping) -> Self {
        Node::Mapping(map)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Mapping(map) => serializer.collect_map(map),
            Node::Sequence(items) => serializer.collect_seq(items),
            Node::String(value) => serializer.serialize_str(value),
            Node::Bool(value) => serializer.serialize_bool(*value),
            Node::Int(value) => serializer.serialize_i64(*value),
            Node::Float(value) => serializer.serialize_f64(*value),
            Node::Null => serializer.serialize_unit(),
        }
    }
}

/// Split YAML text into its documents, in order.
pub fn yaml_documents(text: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut documents = vec![];
    for document in serde_yaml::Deserializer::from_str(text) {
        documents.push(Value::deserialize(document)?);
    }
    Ok(documents)
}

/// Dotted path of `key` below `parent`.
pub fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

// Response codes and similar keys are often written unquoted, so plain
// scalar keys are accepted in their text form.
fn mapping_key(key: Value, path: &str) -> Result<String, MergeError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Err(unsupported(path, "null mapping key".to_string())),
        Value::Sequence(_) => Err(unsupported(path, "sequence used as mapping key".to_string())),
        Value::Mapping(_) => Err(unsupported(path, "mapping used as mapping key".to_string())),
        Value::Tagged(tagged) => Err(unsupported(path, format!("tagged mapping key {}", tagged.tag))),
    }
}

fn unsupported(path: &str, kind: String) -> MergeError {
    let key = if path.is_empty() { "<root>" } else { path };
    error!(key, %kind, "cannot merge element of unsupported type");
    MergeError::UnsupportedValueType {
        key: key.to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Node, MergeError> {
        let value: Value = serde_yaml::from_str(text).unwrap();
        Node::from_yaml(value, "")
    }

    #[test]
    fn test_scalar_kinds() {
        let node = parse("s: text\nb: true\ni: 42\nf: 1.5\nn: ~\n").unwrap();
        assert_eq!(node.get("s"), Some(&Node::String("text".into())));
        assert_eq!(node.get("b"), Some(&Node::Bool(true)));
        assert_eq!(node.get("i"), Some(&Node::Int(42)));
        assert_eq!(node.get("f"), Some(&Node::Float(1.5)));
        assert_eq!(node.get("n"), Some(&Node::Null));
    }

    #[test]
    fn test_numeric_keys_are_stringified() {
        let node = parse("responses:\n  200:\n    description: ok\n").unwrap();
        let responses = node.get("responses").unwrap();
        assert!(responses.get("200").is_some());
    }

    #[test]
    fn test_colliding_keys_rejected() {
        let err = parse("r:\n  200: int\n  '200': str\n").unwrap_err();
        match err {
            MergeError::UnsupportedValueType { key, kind } => {
                assert_eq!(key, "r.200");
                assert!(kind.contains("duplicate"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse("flags:\n  true: a\n  'true': b\n").is_err());
    }

    #[test]
    fn test_key_order_preserved() {
        let node = parse("z: 1\na: 2\nm: 3\n").unwrap();
        let keys: Vec<_> = node.as_mapping().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_tagged_value_rejected_with_path() {
        let err = parse("paths:\n  /a: !custom value\n").unwrap_err();
        match err {
            MergeError::UnsupportedValueType { key, kind } => {
                assert_eq!(key, "paths./a");
                assert!(kind.contains("!custom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_oversized_integer_rejected() {
        let err = parse("big: 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, MergeError::UnsupportedValueType { ref key, .. } if key == "big"));
    }

    #[test]
    fn test_sequence_key_rejected() {
        assert!(parse("? [a, b]\n: value\n").is_err());
    }

    #[test]
    fn test_multiple_documents() {
        let docs = yaml_documents("a: 1\n---\nb: 2\n").unwrap();
        assert_eq!(docs.len(), 2);
    }
}
