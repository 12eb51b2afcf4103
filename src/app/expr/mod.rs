//! Server-side expression graph builder
//!
//! Earth Engine evaluates images lazily from an expression graph submitted with
//! each request. The types in this module only compose that graph: no raster
//! math ever runs locally. Each typed wrapper (`Image`, `ImageCollection`,
//! `FeatureCollection`, `Filter`, `Geometry`) owns a [`Node`] and every builder
//! method returns a new wrapper, so expressions are immutable once built.
//!
//! Serialization follows the REST `Expression` message: a `values` table of
//! `ValueNode`s and a `result` key naming the root. Function bodies passed to
//! `Collection.map` are hoisted into the table because `functionDefinitionValue`
//! refers to its body by key.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Map, Value};

pub mod collection;
pub mod filter;
pub mod geometry;
pub mod image;

pub use collection::{FeatureCollection, ImageCollection};
pub use filter::{CalendarField, Filter};
pub use geometry::Geometry;
pub use image::Image;

/// Source of unique placeholder names for lambda arguments under construction
static PENDING_ARGUMENTS: AtomicUsize = AtomicUsize::new(0);

/// One node of an expression graph
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal JSON value
    Constant(Value),
    /// Array whose items may themselves be computed
    Array(Vec<Node>),
    /// Dictionary whose values may themselves be computed
    Dictionary(BTreeMap<String, Node>),
    /// Call of a named server-side algorithm
    Invocation {
        function: String,
        arguments: BTreeMap<String, Node>,
    },
    /// Lambda passed to higher-order algorithms such as `Collection.map`
    Function {
        arguments: Vec<String>,
        body: Box<Node>,
    },
    /// Reference to an enclosing lambda's argument
    ArgumentRef(String),
}

impl Node {
    /// Literal node from anything serde_json can represent
    pub fn constant(value: impl Into<Value>) -> Self {
        Node::Constant(value.into())
    }

    /// Starts an invocation of `function`; add arguments with [`Invocation::arg`]
    pub fn invoke(function: &str) -> Invocation {
        Invocation {
            function: function.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    /// Builds a one-argument lambda
    ///
    /// The argument name depends on how deeply `build` nests other lambdas, so
    /// nested maps never shadow an outer argument that the inner body uses.
    pub fn lambda(build: impl FnOnce(Node) -> Node) -> Node {
        let pending = format!(
            "__pending_argument_{}",
            PENDING_ARGUMENTS.fetch_add(1, Ordering::Relaxed)
        );
        let body = build(Node::ArgumentRef(pending.clone()));
        let name = format!("_MAPPING_VAR_{}_0", body.lambda_depth());
        let body = body.rename_argument(&pending, &name);
        Node::Function {
            arguments: vec![name],
            body: Box::new(body),
        }
    }

    /// Deepest lambda nesting inside this node
    fn lambda_depth(&self) -> usize {
        match self {
            Node::Constant(_) | Node::ArgumentRef(_) => 0,
            Node::Array(items) => items.iter().map(Node::lambda_depth).max().unwrap_or(0),
            Node::Dictionary(values) => values.values().map(Node::lambda_depth).max().unwrap_or(0),
            Node::Invocation { arguments, .. } => {
                arguments.values().map(Node::lambda_depth).max().unwrap_or(0)
            }
            Node::Function { body, .. } => body.lambda_depth() + 1,
        }
    }

    fn rename_argument(self, from: &str, to: &str) -> Node {
        match self {
            Node::ArgumentRef(name) if name == from => Node::ArgumentRef(to.to_string()),
            Node::Array(items) => Node::Array(
                items
                    .into_iter()
                    .map(|item| item.rename_argument(from, to))
                    .collect(),
            ),
            Node::Dictionary(values) => Node::Dictionary(
                values
                    .into_iter()
                    .map(|(key, value)| (key, value.rename_argument(from, to)))
                    .collect(),
            ),
            Node::Invocation {
                function,
                arguments,
            } => Node::Invocation {
                function,
                arguments: arguments
                    .into_iter()
                    .map(|(key, value)| (key, value.rename_argument(from, to)))
                    .collect(),
            },
            Node::Function { arguments, body } => Node::Function {
                arguments,
                body: Box::new(body.rename_argument(from, to)),
            },
            other => other,
        }
    }

    /// Name of the invoked algorithm, if this node is an invocation
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Node::Invocation { function, .. } => Some(function),
            _ => None,
        }
    }

    /// Argument of an invocation node
    pub fn argument(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Invocation { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }

    /// Serializes the graph rooted at this node into a REST `Expression`
    pub fn to_expression(&self) -> Value {
        let mut encoder = Encoder::default();
        let root = encoder.encode(self);
        encoder.values.insert("0".to_string(), root);
        json!({
            "result": "0",
            "values": Value::Object(encoder.values),
        })
    }
}

/// Builder for invocation nodes
#[derive(Debug)]
pub struct Invocation {
    function: String,
    arguments: BTreeMap<String, Node>,
}

impl Invocation {
    /// Adds a named argument
    pub fn arg(mut self, name: &str, value: impl Into<Node>) -> Self {
        self.arguments.insert(name.to_string(), value.into());
        self
    }

    /// Finishes the node
    pub fn build(self) -> Node {
        Node::Invocation {
            function: self.function,
            arguments: self.arguments,
        }
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::constant(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::constant(value)
    }
}

impl From<u32> for Node {
    fn from(value: u32) -> Self {
        Node::constant(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::constant(value)
    }
}

/// Encodes nodes into `ValueNode` JSON, collecting hoisted function bodies
#[derive(Default)]
struct Encoder {
    values: Map<String, Value>,
    next_key: usize,
}

impl Encoder {
    fn reserve_key(&mut self) -> String {
        self.next_key += 1;
        self.next_key.to_string()
    }

    fn encode(&mut self, node: &Node) -> Value {
        match node {
            Node::Constant(value) => json!({ "constantValue": value }),
            Node::Array(items) => {
                let values: Vec<Value> = items.iter().map(|item| self.encode(item)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            Node::Dictionary(entries) => {
                let values = self.encode_map(entries);
                json!({ "dictionaryValue": { "values": values } })
            }
            Node::Invocation {
                function,
                arguments,
            } => {
                let arguments = self.encode_map(arguments);
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": arguments,
                    }
                })
            }
            Node::Function { arguments, body } => {
                let key = self.reserve_key();
                let body = self.encode(body);
                self.values.insert(key.clone(), body);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": arguments,
                        "body": key,
                    }
                })
            }
            Node::ArgumentRef(name) => json!({ "argumentReference": name }),
        }
    }

    fn encode_map(&mut self, entries: &BTreeMap<String, Node>) -> Map<String, Value> {
        entries
            .iter()
            .map(|(key, value)| (key.clone(), self.encode(value)))
            .collect()
    }
}

/// A computed non-image value, such as a collection size
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedValue(Node);

impl ComputedValue {
    pub(crate) fn new(node: Node) -> Self {
        Self(node)
    }

    /// Underlying graph node
    pub fn node(&self) -> &Node {
        &self.0
    }

    /// REST `Expression` for this value
    pub fn to_expression(&self) -> Value {
        self.0.to_expression()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_root_serialization() {
        let expression = Node::constant(42).to_expression();
        assert_eq!(expression["result"], "0");
        assert_eq!(expression["values"]["0"]["constantValue"], 42);
    }

    #[test]
    fn test_invocation_arguments_are_nested_value_nodes() {
        let node = Node::invoke("Image.load")
            .arg("id", "ESA/WorldCover/v100/2020")
            .build();
        let expression = node.to_expression();
        let invocation = &expression["values"]["0"]["functionInvocationValue"];

        assert_eq!(invocation["functionName"], "Image.load");
        assert_eq!(
            invocation["arguments"]["id"]["constantValue"],
            "ESA/WorldCover/v100/2020"
        );
    }

    #[test]
    fn test_lambda_body_is_hoisted() {
        let mapped = Node::invoke("Collection.map")
            .arg("collection", Node::constant("c"))
            .arg(
                "baseAlgorithm",
                Node::lambda(|arg| Node::invoke("Image.toFloat").arg("value", arg).build()),
            )
            .build();
        let expression = mapped.to_expression();
        let values = &expression["values"];

        let definition = &values["0"]["functionInvocationValue"]["arguments"]["baseAlgorithm"]
            ["functionDefinitionValue"];
        assert_eq!(definition["argumentNames"][0], "_MAPPING_VAR_0_0");
        let body_key = definition["body"].as_str().unwrap();
        assert_eq!(
            values[body_key]["functionInvocationValue"]["arguments"]["value"]["argumentReference"],
            "_MAPPING_VAR_0_0"
        );
    }

    #[test]
    fn test_nested_lambdas_do_not_shadow() {
        let outer = Node::lambda(|outer_arg| {
            Node::invoke("Collection.map")
                .arg("collection", outer_arg.clone())
                .arg(
                    "baseAlgorithm",
                    Node::lambda(|inner_arg| {
                        Node::invoke("Image.updateMask")
                            .arg("image", inner_arg)
                            .arg("mask", outer_arg)
                            .build()
                    }),
                )
                .build()
        });

        match outer {
            Node::Function { arguments, body } => {
                assert_eq!(arguments, vec!["_MAPPING_VAR_1_0".to_string()]);
                let inner = body.argument("baseAlgorithm").unwrap();
                match inner {
                    Node::Function { arguments, body } => {
                        assert_eq!(arguments, &vec!["_MAPPING_VAR_0_0".to_string()]);
                        assert_eq!(
                            body.argument("mask"),
                            Some(&Node::ArgumentRef("_MAPPING_VAR_1_0".to_string()))
                        );
                    }
                    other => panic!("expected inner function, got {:?}", other),
                }
            }
            other => panic!("expected function, got {:?}", other),
        }
    }
}
