//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ncd_tree::{NodeData, NodeId, Tree};
use serde_json::Value;

use crate::{Codec, Error, Result};

/// JSON codec (RESTCONF-style: a JSON object's keys become child element
/// names, a JSON array becomes repeated siblings sharing that name, and
/// scalars become leaf text values using their canonical string form).
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn parse(&self, tree: &mut Tree, input: &str) -> Result<NodeId> {
        let value: Value = serde_json::from_str(input)?;
        let Value::Object(map) = value else {
            return Err(Error::MalformedDocument(
                "top-level JSON value must be an object".to_owned(),
            ));
        };
        if map.len() != 1 {
            return Err(Error::MalformedDocument(
                "top-level JSON object must have exactly one member".to_owned(),
            ));
        }
        let (name, value) = map.into_iter().next().unwrap();
        build_node(tree, &name, &value)
    }

    fn serialize(&self, tree: &Tree, root: NodeId) -> Result<String> {
        let value = to_json_value(tree, root)?;
        let name = tree.node(root)?.name.clone();
        let mut object = serde_json::Map::new();
        object.insert(name, value);
        Ok(serde_json::to_string(&Value::Object(object))?)
    }

    fn serialize_pretty(&self, tree: &Tree, root: NodeId) -> Result<String> {
        let value = to_json_value(tree, root)?;
        let name = tree.node(root)?.name.clone();
        let mut object = serde_json::Map::new();
        object.insert(name, value);
        Ok(serde_json::to_string_pretty(&Value::Object(object))?)
    }
}

fn build_node(tree: &mut Tree, name: &str, value: &Value) -> Result<NodeId> {
    match value {
        Value::Object(map) => {
            let id = tree.new_node(NodeData::element(name));
            for (child_name, child_value) in map {
                match child_value {
                    Value::Array(items) => {
                        for item in items {
                            let child =
                                build_node(tree, child_name, item)?;
                            tree.append_child(id, child)?;
                        }
                    }
                    _ => {
                        let child =
                            build_node(tree, child_name, child_value)?;
                        tree.append_child(id, child)?;
                    }
                }
            }
            Ok(id)
        }
        Value::Array(_) => Err(Error::MalformedDocument(
            "unexpected array outside of a list member".to_owned(),
        )),
        Value::Null => Ok(tree.new_node(NodeData::element(name))),
        Value::String(s) => Ok(tree.new_node(NodeData::leaf(name, s.clone()))),
        Value::Bool(b) => Ok(tree.new_node(NodeData::leaf(name, b.to_string()))),
        Value::Number(n) => Ok(tree.new_node(NodeData::leaf(name, n.to_string()))),
    }
}

fn to_json_value(tree: &Tree, id: NodeId) -> Result<Value> {
    let node = tree.node(id)?;
    let children: Vec<NodeId> = tree.children(id)?.collect();

    if children.is_empty() {
        return Ok(match &node.value {
            Some(value) => Value::String(value.clone()),
            None => Value::Null,
        });
    }

    let mut object = serde_json::Map::new();
    for child in children {
        let child_name = tree.node(child)?.name.clone();
        let child_value = to_json_value(tree, child)?;
        match object.get_mut(&child_name) {
            Some(Value::Array(items)) => items.push(child_value),
            Some(existing) => {
                let previous = existing.clone();
                object.insert(
                    child_name,
                    Value::Array(vec![previous, child_value]),
                );
            }
            None => {
                object.insert(child_name, child_value);
            }
        }
    }
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_nested_object() {
        let codec = JsonCodec;
        let mut tree = Tree::new();
        let root = codec
            .parse(&mut tree, r#"{"interfaces":{"mtu":"1500"}}"#)
            .unwrap();
        let rendered = codec.serialize(&tree, root).unwrap();
        assert_eq!(rendered, r#"{"interfaces":{"mtu":"1500"}}"#);
    }

    #[test]
    fn repeated_keys_become_array() {
        let codec = JsonCodec;
        let mut tree = Tree::new();
        let root = codec
            .parse(
                &mut tree,
                r#"{"interfaces":{"interface":[{"name":"eth0"},{"name":"eth1"}]}}"#,
            )
            .unwrap();
        let rendered = codec.serialize(&tree, root).unwrap();
        assert!(rendered.contains(r#""interface":[{"name":"eth0"},{"name":"eth1"}]"#));
    }
}
