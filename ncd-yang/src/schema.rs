//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! A small in-memory schema context.
//!
//! `SchemaContext` is built once, at startup, from a `SchemaBuilder` and then
//! treated as read-only for the lifetime of the process, mirroring how a
//! compiled YANG context is normally used even though no `.yang` files are
//! parsed here.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use ipnetwork::IpNetwork;

use crate::error::{Error, Result};

/// Index into a `SchemaContext`'s node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaNodeId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaNodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Choice,
    Case,
    Rpc,
    RpcInput,
    RpcOutput,
    Notification,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    String,
    Binary,
    Empty,
    Enumeration(Vec<String>),
    Identity(String),
    IpAddress,
    IpPrefix,
}

impl SchemaType {
    /// Returns `Ok(())` if `value`'s textual representation is well-formed
    /// for this type. Identity membership against a base module is not
    /// checked here (the builder only records the base identity name).
    fn validate(&self, value: &str) -> std::result::Result<(), &'static str> {
        match self {
            SchemaType::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err("boolean"),
            },
            SchemaType::Int8 => i8::from_str(value).map(|_| ()).map_err(|_| "int8"),
            SchemaType::Int16 => {
                i16::from_str(value).map(|_| ()).map_err(|_| "int16")
            }
            SchemaType::Int32 => {
                i32::from_str(value).map(|_| ()).map_err(|_| "int32")
            }
            SchemaType::Int64 => {
                i64::from_str(value).map(|_| ()).map_err(|_| "int64")
            }
            SchemaType::Uint8 => {
                u8::from_str(value).map(|_| ()).map_err(|_| "uint8")
            }
            SchemaType::Uint16 => {
                u16::from_str(value).map(|_| ()).map_err(|_| "uint16")
            }
            SchemaType::Uint32 => {
                u32::from_str(value).map(|_| ()).map_err(|_| "uint32")
            }
            SchemaType::Uint64 => {
                u64::from_str(value).map(|_| ()).map_err(|_| "uint64")
            }
            SchemaType::String | SchemaType::Identity(_) => Ok(()),
            SchemaType::Binary => Ok(()),
            SchemaType::Empty => {
                if value.is_empty() {
                    Ok(())
                } else {
                    Err("empty")
                }
            }
            SchemaType::Enumeration(values) => {
                if values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err("enumeration")
                }
            }
            SchemaType::IpAddress => std::net::IpAddr::from_str(value)
                .map(|_| ())
                .map_err(|_| "ip-address"),
            SchemaType::IpPrefix => IpNetwork::from_str(value)
                .map(|_| ())
                .map_err(|_| "ip-prefix"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchemaNode {
    id: SchemaNodeId,
    parent: Option<SchemaNodeId>,
    name: String,
    module: String,
    kind: SchemaNodeKind,
    node_type: Option<SchemaType>,
    keys: Vec<String>,
    mandatory: bool,
    config: bool,
    default: Option<String>,
    if_feature: Option<String>,
    children: Vec<SchemaNodeId>,
}

impl SchemaNode {
    pub fn id(&self) -> SchemaNodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn kind(&self) -> SchemaNodeKind {
        self.kind
    }

    pub fn node_type(&self) -> Option<&SchemaType> {
        self.node_type.as_ref()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_config(&self) -> bool {
        self.config
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn children(&self) -> &[SchemaNodeId] {
        &self.children
    }
}

#[derive(Debug, Default)]
pub struct SchemaContext {
    nodes: Vec<SchemaNode>,
    by_path: HashMap<String, SchemaNodeId>,
    rpcs: HashMap<String, (SchemaNodeId, SchemaNodeId)>,
    features: std::collections::HashSet<String>,
    modules: BTreeMap<String, Option<String>>,
}

impl SchemaContext {
    pub fn node(&self, id: SchemaNodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// Looks up a schema node by its absolute data path (e.g.
    /// `/ietf-interfaces:interfaces/interface`), mirroring the real schema
    /// context's path-based lookup.
    pub fn find(&self, path: &str) -> Result<&SchemaNode> {
        self.by_path
            .get(path)
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| Error::NodeNotFound(path.to_owned()))
    }

    pub fn path_of(&self, id: SchemaNodeId) -> Option<&str> {
        self.by_path
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    /// Validates a single leaf value's textual representation against its
    /// declared type.
    pub fn validate_value(&self, id: SchemaNodeId, value: &str) -> Result<()> {
        let node = &self.nodes[id.0];
        let Some(node_type) = &node.node_type else {
            return Ok(());
        };
        node_type.validate(value).map_err(|expected| {
            let path = self.path_of(id).unwrap_or(&node.name).to_owned();
            Error::TypeMismatch { path, expected }
        })
    }

    /// Returns the declared default for a leaf, if any, so the caller (the
    /// tree layer, which owns the actual data representation) can insert it.
    pub fn default_value(&self, id: SchemaNodeId) -> Option<&str> {
        self.nodes[id.0].default.as_deref()
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    /// Finds a top-level (parentless) schema node by its local name, used
    /// to bind a datastore's single root element to the schema it was
    /// parsed against.
    pub fn top_level(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes
            .iter()
            .find(|node| node.parent.is_none() && node.name == name)
    }

    /// Iterates the registered modules and their revisions, in name order,
    /// for the `ietf-yang-library` header persisted alongside each
    /// datastore file.
    pub fn modules(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.modules
            .iter()
            .map(|(name, revision)| (name.as_str(), revision.as_deref()))
    }

    /// Returns the input and output schema nodes for an RPC, keyed by its
    /// absolute schema path.
    pub fn rpc(&self, path: &str) -> Result<(&SchemaNode, &SchemaNode)> {
        self.rpcs
            .get(path)
            .map(|(input, output)| (&self.nodes[input.0], &self.nodes[output.0]))
            .ok_or_else(|| Error::NodeNotFound(path.to_owned()))
    }
}

/// Builds a `SchemaContext` node by node. Unlike a YANG compiler this
/// performs no schema validation of its own beyond rejecting duplicate
/// sibling names; it exists so the daemon's startup self-test and the test
/// suite can construct a context without a `.yang` file parser.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    ctx: SchemaContext,
}

struct NewNode {
    name: String,
    module: String,
    kind: SchemaNodeKind,
    node_type: Option<SchemaType>,
    keys: Vec<String>,
    mandatory: bool,
    config: bool,
    default: Option<String>,
    if_feature: Option<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_feature(mut self, name: &str) -> Self {
        self.ctx.features.insert(name.to_owned());
        self
    }

    /// Registers a loaded module and its revision (if known) for the
    /// `ietf-yang-library` header written alongside persisted datastore
    /// files. Nodes don't need a registered module to be inserted; this is
    /// purely for that header.
    pub fn module(mut self, name: &str, revision: Option<&str>) -> Self {
        self.ctx
            .modules
            .insert(name.to_owned(), revision.map(|s| s.to_owned()));
        self
    }

    /// Inserts a node under `parent_path` (use `""` for the document root)
    /// and returns the builder for chaining. `parent_path` must already have
    /// been inserted.
    #[allow(clippy::too_many_arguments)]
    pub fn node(
        mut self,
        parent_path: &str,
        path: &str,
        name: &str,
        module: &str,
        kind: SchemaNodeKind,
        node_type: Option<SchemaType>,
    ) -> Result<Self> {
        self.insert(
            parent_path,
            path,
            NewNode {
                name: name.to_owned(),
                module: module.to_owned(),
                kind,
                node_type,
                keys: Vec::new(),
                mandatory: false,
                config: true,
                default: None,
                if_feature: None,
            },
        )?;
        Ok(self)
    }

    pub fn list_node(
        mut self,
        parent_path: &str,
        path: &str,
        name: &str,
        module: &str,
        keys: &[&str],
    ) -> Result<Self> {
        self.insert(
            parent_path,
            path,
            NewNode {
                name: name.to_owned(),
                module: module.to_owned(),
                kind: SchemaNodeKind::List,
                node_type: None,
                keys: keys.iter().map(|s| s.to_string()).collect(),
                mandatory: false,
                config: true,
                default: None,
                if_feature: None,
            },
        )?;
        Ok(self)
    }

    pub fn leaf_node(
        mut self,
        parent_path: &str,
        path: &str,
        name: &str,
        module: &str,
        node_type: SchemaType,
        mandatory: bool,
        default: Option<&str>,
    ) -> Result<Self> {
        self.insert(
            parent_path,
            path,
            NewNode {
                name: name.to_owned(),
                module: module.to_owned(),
                kind: SchemaNodeKind::Leaf,
                node_type: Some(node_type),
                keys: Vec::new(),
                mandatory,
                config: true,
                default: default.map(|s| s.to_owned()),
                if_feature: None,
            },
        )?;
        Ok(self)
    }

    /// Registers an RPC along with its input and output container nodes
    /// (`input_path`/`output_path` must already exist, typically created as
    /// plain `Container` nodes under the RPC's own path).
    pub fn rpc(
        mut self,
        path: &str,
        input_path: &str,
        output_path: &str,
    ) -> Result<Self> {
        let input = *self
            .ctx
            .by_path
            .get(input_path)
            .ok_or_else(|| Error::NodeNotFound(input_path.to_owned()))?;
        let output = *self
            .ctx
            .by_path
            .get(output_path)
            .ok_or_else(|| Error::NodeNotFound(output_path.to_owned()))?;
        self.ctx.rpcs.insert(path.to_owned(), (input, output));
        Ok(self)
    }

    fn insert(
        &mut self,
        parent_path: &str,
        path: &str,
        new: NewNode,
    ) -> Result<()> {
        if self.ctx.by_path.contains_key(path) {
            return Err(Error::DuplicateNode(path.to_owned()));
        }
        if let Some(feature) = &new.if_feature {
            if !self.ctx.features.contains(feature) {
                tracing::debug!(%feature, %path, "schema node gated by disabled feature");
            }
        }
        let parent = if parent_path.is_empty() {
            None
        } else {
            Some(
                *self
                    .ctx
                    .by_path
                    .get(parent_path)
                    .ok_or_else(|| Error::NodeNotFound(parent_path.to_owned()))?,
            )
        };
        let id = SchemaNodeId(self.ctx.nodes.len());
        self.ctx.nodes.push(SchemaNode {
            id,
            parent,
            name: new.name,
            module: new.module,
            kind: new.kind,
            node_type: new.node_type,
            keys: new.keys,
            mandatory: new.mandatory,
            config: new.config,
            default: new.default,
            if_feature: new.if_feature,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.ctx.nodes[parent.0].children.push(id);
        }
        self.ctx.by_path.insert(path.to_owned(), id);
        Ok(())
    }

    pub fn build(self) -> SchemaContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_validate_leaf() {
        let ctx = SchemaBuilder::new()
            .node(
                "",
                "/ietf-interfaces:interfaces",
                "interfaces",
                "ietf-interfaces",
                SchemaNodeKind::Container,
                None,
            )
            .unwrap()
            .leaf_node(
                "/ietf-interfaces:interfaces",
                "/ietf-interfaces:interfaces/enabled",
                "enabled",
                "ietf-interfaces",
                SchemaType::Boolean,
                false,
                Some("true"),
            )
            .unwrap()
            .build();

        let leaf = ctx
            .find("/ietf-interfaces:interfaces/enabled")
            .expect("leaf present");
        assert_eq!(leaf.default(), Some("true"));
        assert!(ctx.validate_value(leaf.id(), "true").is_ok());
        assert!(ctx.validate_value(leaf.id(), "maybe").is_err());
    }

    #[test]
    fn duplicate_path_rejected() {
        let result = SchemaBuilder::new()
            .node("", "/a", "a", "m", SchemaNodeKind::Container, None)
            .unwrap()
            .node("", "/a", "a", "m", SchemaNodeKind::Container, None);
        assert!(result.is_err());
    }
}
