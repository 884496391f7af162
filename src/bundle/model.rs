//! JSON documents stored inside a pipeline bundle.
//!
//! Attributes are typed values in the bundle's JSON format:
//!
//! ```json
//! {"type": "string", "value": "keep"}
//! {"type": {"type": "list", "base": "string"}, "value": ["HAWT", "VAWT"]}
//! ```

use crate::error::{GearboxError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Contents of `bundle.json` at the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub uid: String,
    pub name: String,
    pub format: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeType {
    Basic(String),
    List {
        #[serde(rename = "type")]
        container: String,
        base: String,
    },
}

impl AttributeType {
    fn list(base: &str) -> Self {
        Self::List {
            container: "list".to_owned(),
            base: base.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub kind: AttributeType,
    pub value: JsonValue,
}

impl Attribute {
    pub fn string(value: &str) -> Self {
        Self {
            kind: AttributeType::Basic("string".to_owned()),
            value: JsonValue::from(value),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            kind: AttributeType::Basic("boolean".to_owned()),
            value: JsonValue::from(value),
        }
    }

    pub fn string_list(values: &[String]) -> Self {
        Self {
            kind: AttributeType::list("string"),
            value: JsonValue::from(values.to_vec()),
        }
    }

    pub fn long_list(values: &[usize]) -> Self {
        Self {
            kind: AttributeType::list("long"),
            value: values.iter().map(|v| JsonValue::from(*v as u64)).collect(),
        }
    }
}

/// A stage's `model.json`: operation name and typed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDoc {
    pub op: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl ModelDoc {
    pub fn new(op: &str) -> Self {
        Self {
            op: op.to_owned(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_owned(), attribute);
        self
    }

    fn attribute(&self, name: &str) -> Result<&JsonValue> {
        self.attributes
            .get(name)
            .map(|a| &a.value)
            .ok_or_else(|| malformed(format!("{} model has no '{name}' attribute", self.op)))
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.attribute(name)?
            .as_str()
            .ok_or_else(|| malformed(format!("attribute '{name}' is not a string")))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.attribute(name)?
            .as_bool()
            .ok_or_else(|| malformed(format!("attribute '{name}' is not a boolean")))
    }

    pub fn get_string_list(&self, name: &str) -> Result<Vec<String>> {
        self.list(name)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| malformed(format!("attribute '{name}' holds a non-string")))
            })
            .collect()
    }

    pub fn get_long_list(&self, name: &str) -> Result<Vec<usize>> {
        self.list(name)?
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| malformed(format!("attribute '{name}' holds a non-integer")))
            })
            .collect()
    }

    fn list(&self, name: &str) -> Result<&Vec<JsonValue>> {
        self.attribute(name)?
            .as_array()
            .ok_or_else(|| malformed(format!("attribute '{name}' is not a list")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socket {
    pub name: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shape {
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
}

/// A stage's `node.json`: node name and the columns it reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDoc {
    pub name: String,
    pub shape: Shape,
}

impl NodeDoc {
    /// Node reading `inputs` and writing a single `output` column.
    pub fn new(name: &str, inputs: &[&str], output: &str) -> Self {
        let sockets = |names: &[&str], port: &str| -> Vec<Socket> {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| Socket {
                    name: (*n).to_owned(),
                    port: if names.len() == 1 {
                        port.to_owned()
                    } else {
                        format!("{port}{i}")
                    },
                })
                .collect()
        };

        Self {
            name: name.to_owned(),
            shape: Shape {
                inputs: sockets(inputs, "input"),
                outputs: sockets(&[output], "output"),
            },
        }
    }

    /// Node with an empty shape, used for the pipeline itself.
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            shape: Shape::default(),
        }
    }

    pub fn input(&self) -> Result<&str> {
        self.shape
            .inputs
            .first()
            .map(|s| s.name.as_str())
            .ok_or_else(|| malformed(format!("node '{}' has no input", self.name)))
    }

    pub fn output(&self) -> Result<&str> {
        self.shape
            .outputs
            .first()
            .map(|s| s.name.as_str())
            .ok_or_else(|| malformed(format!("node '{}' has no output", self.name)))
    }
}

pub(crate) fn malformed(message: String) -> GearboxError {
    GearboxError::BundleExport(format!("malformed bundle: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_attribute_json_shape() {
        let attr = Attribute::string_list(&["HAWT".to_owned(), "VAWT".to_owned()]);
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": {"type": "list", "base": "string"},
                "value": ["HAWT", "VAWT"]
            })
        );

        let back: Attribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn test_model_accessors() {
        let model = ModelDoc::new("one_hot_encoder")
            .with("category_sizes", Attribute::long_list(&[3]))
            .with("drop_last", Attribute::boolean(false))
            .with("handle_invalid", Attribute::string("keep"));

        assert_eq!(model.get_long_list("category_sizes").unwrap(), vec![3]);
        assert!(!model.get_bool("drop_last").unwrap());
        assert_eq!(model.get_str("handle_invalid").unwrap(), "keep");
        assert!(model.get_str("missing").is_err());
        assert!(model.get_bool("handle_invalid").is_err());
    }

    #[test]
    fn test_node_ports() {
        let node = NodeDoc::new("vector_assembler", &["a", "b"], "features");
        assert_eq!(node.shape.inputs[1].port, "input1");
        assert_eq!(node.shape.outputs[0].port, "output");

        let single = NodeDoc::new("string_indexer_x", &["x"], "indexed_x");
        assert_eq!(single.input().unwrap(), "x");
        assert_eq!(single.output().unwrap(), "indexed_x");
    }
}
