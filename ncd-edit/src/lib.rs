//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The `<edit-config>` operation algebra, plus the pure RESTCONF-to-NETCONF
//! translation functions the (out of scope) RESTCONF HTTP surface would call.
//!
//! This crate knows nothing about sockets, HTTP, or the wire: it operates
//! purely on `ncd_tree::Tree` subtrees. The NETCONF dispatcher calls
//! [`apply_edit_config`] directly; a RESTCONF frontend would call one of the
//! `restconf_*_to_edit` functions to pick an [`EditOperation`] and then funnel
//! through the same [`apply_edit_config`], exactly as clixon's RESTCONF verbs
//! are themselves implemented as thin wrappers around `<edit-config>`.

pub mod error;

pub use error::{Error, Result};
use ncd_tree::{NodeData, NodeId, Tree};
use ncd_yang::SchemaContext;

/// The six `<edit-config>` operations of RFC 6241 §7.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
    None,
}

impl EditOperation {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "merge" => Some(EditOperation::Merge),
            "replace" => Some(EditOperation::Replace),
            "create" => Some(EditOperation::Create),
            "delete" => Some(EditOperation::Delete),
            "remove" => Some(EditOperation::Remove),
            "none" => Some(EditOperation::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Merge => "merge",
            EditOperation::Replace => "replace",
            EditOperation::Create => "create",
            EditOperation::Delete => "delete",
            EditOperation::Remove => "remove",
            EditOperation::None => "none",
        }
    }
}

/// Reads `config_root`'s own `operation` attribute, falling back to
/// `inherited` (the enclosing node's effective operation) when absent, per
/// RFC 6241 §7.2's "operation attribute is inherited" rule.
fn resolve_operation(
    config: &Tree,
    config_root: NodeId,
    inherited: EditOperation,
) -> Result<EditOperation> {
    let node = config.node(config_root)?;
    match node
        .attributes
        .iter()
        .find(|(name, _)| name == "operation" || name.ends_with(":operation"))
    {
        Some((_, value)) => EditOperation::from_attr(value)
            .ok_or_else(|| Error::BadOperation(value.clone())),
        None => Ok(inherited),
    }
}

/// Finds the child of `target_parent` that `config_root` logically refers
/// to: same name, and — when `schema` identifies the node as a YANG list
/// entry — the same key-leaf identity (order-independent key-tuple
/// equality), not node equality.
fn find_matching_child(
    tree: &Tree,
    target_parent: NodeId,
    config: &Tree,
    config_root: NodeId,
    schema: Option<&SchemaContext>,
) -> Result<Option<NodeId>> {
    let name = config.node(config_root)?.name.clone();
    let keys = config
        .node(config_root)?
        .schema
        .zip(schema)
        .map(|(id, ctx)| ctx.node(id).keys().to_vec());

    for candidate in tree.children(target_parent)? {
        if tree.node(candidate)?.name != name {
            continue;
        }
        match &keys {
            Some(keys) if !keys.is_empty() => {
                let candidate_keys = tree.list_key_values(candidate, keys)?;
                let config_keys = config.list_key_values(config_root, keys)?;
                if candidate_keys == config_keys {
                    return Ok(Some(candidate));
                }
            }
            _ => return Ok(Some(candidate)),
        }
    }
    Ok(None)
}

/// Applies the edit algebra: merges, replaces, creates, deletes, removes, or
/// passes through (per `config_root`'s own or the inherited `operation`) the
/// subtree rooted at `config_root` (in `config`) against the child of
/// `target_parent` (in `tree`) that matches it by name and, for list
/// entries, key identity.
pub fn apply_edit_config(
    tree: &mut Tree,
    target_parent: NodeId,
    config: &Tree,
    config_root: NodeId,
    default_operation: EditOperation,
    schema: Option<&SchemaContext>,
) -> Result<()> {
    let op = resolve_operation(config, config_root, default_operation)?;
    let name = config.node(config_root)?.name.clone();
    let existing = find_matching_child(tree, target_parent, config, config_root, schema)?;

    match op {
        EditOperation::Create => {
            if existing.is_some() {
                return Err(Error::DataExists(name));
            }
            let copy = tree.copy_subtree_from(config, config_root)?;
            tree.append_child(target_parent, copy)?;
        }
        EditOperation::Delete => {
            let existing = existing.ok_or_else(|| Error::DataMissing(name))?;
            tree.remove_subtree(existing)?;
        }
        EditOperation::Remove => {
            if let Some(existing) = existing {
                tree.remove_subtree(existing)?;
            }
        }
        EditOperation::Replace => {
            if let Some(existing) = existing {
                tree.remove_subtree(existing)?;
            }
            let copy = tree.copy_subtree_from(config, config_root)?;
            tree.append_child(target_parent, copy)?;
        }
        EditOperation::Merge | EditOperation::None => {
            let target_node = match existing {
                Some(id) => id,
                None => {
                    if op == EditOperation::None {
                        return Err(Error::DataMissing(name));
                    }
                    let shell = tree.new_node(NodeData {
                        name,
                        namespace: config.node(config_root)?.namespace.clone(),
                        value: None,
                        attributes: Vec::new(),
                        schema: config.node(config_root)?.schema,
                    });
                    tree.append_child(target_parent, shell)?;
                    shell
                }
            };

            let config_children: Vec<NodeId> = config.children(config_root)?.collect();
            if config_children.is_empty() {
                if let Some(value) = &config.node(config_root)?.value {
                    tree.node_mut(target_node)?.value = Some(value.clone());
                }
            }
            for child in config_children {
                apply_edit_config(tree, target_node, config, child, op, schema)?;
            }
        }
    }
    Ok(())
}

/// A NETCONF `yang:insert`/`yang:value` attribute pair, translated from a
/// RESTCONF `insert`/`point` query parameter pair.
pub fn insert_point_attrs(
    insert: Option<&str>,
    point: Option<&str>,
) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    if let Some(insert) = insert {
        attrs.push(("yang:insert".to_owned(), insert.to_owned()));
    }
    if let Some(point) = point {
        attrs.push(("yang:value".to_owned(), point.to_owned()));
    }
    attrs
}

/// `POST /data/...` maps to `create`: RFC 8040 §4.4.1 requires a 409 if the
/// resource already exists, which `apply_edit_config` already reports via
/// [`Error::DataExists`].
pub fn restconf_post_to_edit() -> EditOperation {
    EditOperation::Create
}

/// `PUT /data/...` maps to `replace` (create-or-replace), RFC 8040 §4.5.
pub fn restconf_put_to_edit() -> EditOperation {
    EditOperation::Replace
}

/// `DELETE /data/...` maps to `delete`, which fails (`DataMissing`) if the
/// resource is absent, RFC 8040 §4.7.
pub fn restconf_delete_to_edit() -> EditOperation {
    EditOperation::Delete
}

/// Wraps an RPC input body under `<rpc><name xmlns=module_ns>...</name></rpc>`
/// for `POST /operations/<op>`. `input_children` are the already
/// parsed input leaves/containers (the caller enforces the RESTCONF "exactly
/// one child of the parent" rule before calling this).
pub fn restconf_operation_to_rpc(
    tree: &mut Tree,
    op_name: &str,
    module_ns: &str,
    input_children: Vec<NodeId>,
) -> Result<NodeId> {
    let rpc = tree.new_node(NodeData::element("rpc"));
    let op = tree.new_node(NodeData {
        name: op_name.to_owned(),
        namespace: Some(module_ns.to_owned()),
        value: None,
        attributes: Vec::new(),
        schema: None,
    });
    tree.append_child(rpc, op)?;
    for child in input_children {
        tree.append_child(op, child)?;
    }
    Ok(rpc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncd_tree::NodeData;

    fn leaf_config(name: &str, value: &str, op: Option<&str>) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let mut data = NodeData::leaf(name, value);
        if let Some(op) = op {
            data.attributes.push(("operation".to_owned(), op.to_owned()));
        }
        let root = tree.new_node(data);
        tree.set_root(root).unwrap();
        (tree, root)
    }

    #[test]
    fn merge_inserts_missing_leaf() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("a"));
        tree.set_root(root).unwrap();
        let (config, config_root) = leaf_config("x", "1", None);

        apply_edit_config(
            &mut tree,
            root,
            &config,
            config_root,
            EditOperation::Merge,
            None,
        )
        .unwrap();

        let child = tree.find_child_by_name(root, "x").unwrap().unwrap();
        assert_eq!(tree.node(child).unwrap().value.as_deref(), Some("1"));
    }

    #[test]
    fn create_on_existing_node_fails() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("a"));
        tree.set_root(root).unwrap();
        let existing = tree.new_node(NodeData::leaf("x", "0"));
        tree.append_child(root, existing).unwrap();

        let (config, config_root) = leaf_config("x", "1", None);
        let err = apply_edit_config(
            &mut tree,
            root,
            &config,
            config_root,
            EditOperation::Create,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DataExists(_)));
    }

    #[test]
    fn delete_on_missing_node_fails() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("a"));
        tree.set_root(root).unwrap();

        let (config, config_root) = leaf_config("x", "1", None);
        let err = apply_edit_config(
            &mut tree,
            root,
            &config,
            config_root,
            EditOperation::Delete,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DataMissing(_)));
    }

    #[test]
    fn remove_on_missing_node_is_idempotent() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("a"));
        tree.set_root(root).unwrap();

        let (config, config_root) = leaf_config("x", "1", None);
        apply_edit_config(
            &mut tree,
            root,
            &config,
            config_root,
            EditOperation::Remove,
            None,
        )
        .unwrap();
    }

    #[test]
    fn per_node_operation_attribute_overrides_default() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("a"));
        tree.set_root(root).unwrap();
        let existing = tree.new_node(NodeData::leaf("x", "0"));
        tree.append_child(root, existing).unwrap();

        let (config, config_root) = leaf_config("x", "1", Some("replace"));
        apply_edit_config(
            &mut tree,
            root,
            &config,
            config_root,
            EditOperation::None,
            None,
        )
        .unwrap();

        let child = tree.find_child_by_name(root, "x").unwrap().unwrap();
        assert_eq!(tree.node(child).unwrap().value.as_deref(), Some("1"));
    }

    #[test]
    fn restconf_verbs_map_to_expected_operations() {
        assert_eq!(restconf_post_to_edit(), EditOperation::Create);
        assert_eq!(restconf_put_to_edit(), EditOperation::Replace);
        assert_eq!(restconf_delete_to_edit(), EditOperation::Delete);
    }

    #[test]
    fn restconf_operation_wraps_rpc_shell() {
        let mut tree = Tree::new();
        let input = tree.new_node(NodeData::leaf("name", "eth0"));
        let rpc = restconf_operation_to_rpc(
            &mut tree,
            "clear-interface",
            "urn:example:interfaces",
            vec![input],
        )
        .unwrap();
        assert_eq!(tree.node(rpc).unwrap().name, "rpc");
        let op = tree.children(rpc).unwrap().next().unwrap();
        assert_eq!(tree.node(op).unwrap().name, "clear-interface");
    }
}
