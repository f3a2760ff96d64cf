//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! XML and JSON encoding of the configuration tree.
//!
//! Both codecs are thin: they know how to turn a `ncd_tree::Tree` subtree
//! into text and back, with no schema awareness of their own. Schema-driven
//! decisions (which leaves are numeric, which containers are lists) are
//! resolved by the caller via `ncd_yang::SchemaContext` before or after a
//! codec call, matching how the datastore layer and the NETCONF dispatcher
//! actually use these codecs: parse first, validate against the schema
//! second.

pub mod error;
pub mod json;
pub mod xml;

pub use error::{Error, Result};
use ncd_tree::{NodeId, Tree};

/// Common contract implemented by the XML and JSON codecs.
pub trait Codec {
    /// Parses `input` and appends the resulting subtree (unattached) into
    /// `tree`, returning its root node.
    fn parse(&self, tree: &mut Tree, input: &str) -> Result<NodeId>;

    /// Serializes the subtree rooted at `root` to a compact string.
    fn serialize(&self, tree: &Tree, root: NodeId) -> Result<String>;

    /// Serializes the subtree rooted at `root` with indentation, for
    /// `<get>`/`<get-config>` replies and log output.
    fn serialize_pretty(&self, tree: &Tree, root: NodeId) -> Result<String>;
}
