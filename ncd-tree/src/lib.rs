//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Arena-based configuration tree.
//!
//! A `Tree` is a `Vec<Node>`-backed arena addressed by a generational
//! `NodeId`, with parent links stored as indices and children linked
//! first-child/next-sibling instead of `Vec<NodeId>`, so detaching and
//! reattaching a subtree (the common case during `<edit-config>` processing
//! and src/tgt transaction snapshots) touches a handful of pointers rather
//! than shifting a vector. This avoids the parent-pointer cycles a naive
//! `Rc<RefCell<Node>>` tree would need `Weak` references to break.

use std::collections::BTreeMap;
use std::fmt;

use ncd_yang::SchemaNodeId;

pub mod error;

pub use error::{Error, Result};

/// A handle into a `Tree`'s arena. The generation counter detects use of a
/// stale id after the slot it pointed to has been freed and reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}#{})", self.index, self.generation)
    }
}

/// The data carried by a configuration tree node. Leaf/leaf-list nodes carry
/// a `value`; container/list nodes leave it `None`.
#[derive(Clone, Debug, Default)]
pub struct NodeData {
    pub name: String,
    pub namespace: Option<String>,
    pub value: Option<String>,
    /// Original XML attributes, preserved so the NETCONF dispatcher can
    /// echo unrecognized `<rpc>` attributes back onto `<rpc-reply>`.
    pub attributes: Vec<(String, String)>,
    pub schema: Option<SchemaNodeId>,
}

impl NodeData {
    pub fn element(name: impl Into<String>) -> Self {
        NodeData {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        NodeData {
            name: name.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }
}

struct Node {
    generation: u32,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    data: NodeData,
}

enum Slot {
    Occupied(Node),
    Vacant { next_free: Option<u32>, generation: u32 },
}

#[derive(Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    root: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.root = Some(id);
        Ok(())
    }

    /// Allocates a new, unattached node.
    pub fn new_node(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            generation: 0,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
            data,
        };
        if let Some(index) = self.free_head {
            let (next_free, generation) = match &self.slots[index as usize] {
                Slot::Vacant {
                    next_free,
                    generation,
                } => (*next_free, *generation),
                Slot::Occupied(_) => {
                    unreachable!("free list pointed at an occupied slot")
                }
            };
            self.free_head = next_free;
            let id = NodeId { index, generation };
            self.slots[index as usize] = Slot::Occupied(Node {
                generation,
                ..node
            });
            id
        } else {
            let index = self.slots.len() as u32;
            let id = NodeId {
                index,
                generation: 0,
            };
            self.slots.push(Slot::Occupied(node));
            id
        }
    }

    fn slot(&self, id: NodeId) -> Result<&Node> {
        match self.slots.get(id.index as usize) {
            Some(Slot::Occupied(node)) if node.generation == id.generation => {
                Ok(node)
            }
            _ => Err(Error::StaleNode),
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        match self.slots.get_mut(id.index as usize) {
            Some(Slot::Occupied(node)) if node.generation == id.generation => {
                Ok(node)
            }
            _ => Err(Error::StaleNode),
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.slot(id).map(|n| &n.data)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slot_mut(id).map(|n| &mut n.data)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.slot(id)?.parent)
    }

    /// Appends `child` as the last child of `parent`. `child` must be
    /// unattached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.slot(child)?.parent.is_some() {
            return Err(Error::AlreadyAttached);
        }
        let prev_last = self.slot(parent)?.last_child;
        if let Some(prev_last) = prev_last {
            self.slot_mut(prev_last)?.next_sibling = Some(child);
        }
        {
            let child_node = self.slot_mut(child)?;
            child_node.parent = Some(parent);
            child_node.prev_sibling = prev_last;
        }
        let parent_node = self.slot_mut(parent)?;
        if parent_node.first_child.is_none() {
            parent_node.first_child = Some(child);
        }
        parent_node.last_child = Some(child);
        Ok(())
    }

    /// Detaches `id` from its parent without freeing it; the subtree rooted
    /// at `id` remains valid and can be reattached elsewhere.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let (parent, prev, next) = {
            let node = self.slot(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if let Some(prev) = prev {
            self.slot_mut(prev)?.next_sibling = next;
        } else if let Some(parent) = parent {
            self.slot_mut(parent)?.first_child = next;
        }
        if let Some(next) = next {
            self.slot_mut(next)?.prev_sibling = prev;
        } else if let Some(parent) = parent {
            self.slot_mut(parent)?.last_child = prev;
        }
        let node = self.slot_mut(id)?;
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Detaches and frees `id` and every descendant, making their slots
    /// available for reuse.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)?;
        self.free_subtree(id)
    }

    fn free_subtree(&mut self, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = self.children(id)?.collect();
        for child in children {
            self.free_subtree(child)?;
        }
        let node = self.slot_mut(id)?;
        let generation = node.generation.wrapping_add(1);
        self.slots[id.index as usize] = Slot::Vacant {
            next_free: self.free_head,
            generation,
        };
        self.free_head = Some(id.index);
        Ok(())
    }

    pub fn children(&self, id: NodeId) -> Result<Children<'_>> {
        Ok(Children {
            tree: self,
            next: self.slot(id)?.first_child,
        })
    }

    pub fn find_child_by_name(
        &self,
        parent: NodeId,
        name: &str,
    ) -> Result<Option<NodeId>> {
        for child in self.children(parent)? {
            if self.node(child)?.name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Pre-order traversal of `id` and all of its descendants.
    pub fn descendants(&self, id: NodeId) -> Result<Descendants<'_>> {
        self.slot(id)?;
        Ok(Descendants {
            tree: self,
            stack: vec![id],
        })
    }

    /// Deep-copies the subtree rooted at `id` into a new, unattached subtree
    /// and returns its root. Used by the transaction engine to snapshot a
    /// datastore's tree into `td_src`/`td_target` before computing a delta.
    pub fn deep_clone_subtree(&mut self, id: NodeId) -> Result<NodeId> {
        let data = self.node(id)?.clone();
        let new_id = self.new_node(data);
        let children: Vec<NodeId> = self.children(id)?.collect();
        for child in children {
            let new_child = self.deep_clone_subtree(child)?;
            self.append_child(new_id, new_child)?;
        }
        Ok(new_id)
    }

    /// Deep-copies the subtree rooted at `src_root` in a *different* tree
    /// into `self`, as an unattached subtree, and returns its new root.
    /// Used wherever content crosses a tree boundary: datastore `copy`,
    /// and the edit engine merging a freshly parsed `<edit-config>`
    /// document into a target datastore's tree.
    pub fn copy_subtree_from(&mut self, src: &Tree, src_root: NodeId) -> Result<NodeId> {
        let data = src.node(src_root)?.clone();
        let new_id = self.new_node(data);
        for child in src.children(src_root)? {
            let new_child = self.copy_subtree_from(src, child)?;
            self.append_child(new_id, new_child)?;
        }
        Ok(new_id)
    }

    /// Returns the key-leaf values of a list entry node, keyed by leaf name,
    /// for order-independent identity comparison: two list entries are
    /// "the same entry" iff this map is equal.
    pub fn list_key_values(
        &self,
        entry: NodeId,
        keys: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for key in keys {
            if let Some(child) = self.find_child_by_name(entry, key)? {
                if let Some(value) = &self.node(child)?.value {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(map)
    }

    pub fn list_entries_equal(
        &self,
        a: NodeId,
        b: NodeId,
        keys: &[String],
    ) -> Result<bool> {
        Ok(self.list_key_values(a, keys)? == self.list_key_values(b, keys)?)
    }
}

pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.slot(current).ok()?.next_sibling;
        Some(current)
    }
}

pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        if let Ok(node) = self.tree.slot(current) {
            let mut child = node.first_child;
            let mut children = Vec::new();
            while let Some(c) = child {
                children.push(c);
                child = self.tree.slot(c).ok()?.next_sibling;
            }
            self.stack.extend(children.into_iter().rev());
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_iterate_children() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("interfaces"));
        tree.set_root(root).unwrap();
        let a = tree.new_node(NodeData::leaf("interface", "eth0"));
        let b = tree.new_node(NodeData::leaf("interface", "eth1"));
        tree.append_child(root, a).unwrap();
        tree.append_child(root, b).unwrap();

        let children: Vec<_> = tree.children(root).unwrap().collect();
        assert_eq!(children, vec![a, b]);
    }

    #[test]
    fn detach_and_reattach() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("root"));
        tree.set_root(root).unwrap();
        let a = tree.new_node(NodeData::element("a"));
        let b = tree.new_node(NodeData::element("b"));
        tree.append_child(root, a).unwrap();
        tree.append_child(root, b).unwrap();

        tree.detach(a).unwrap();
        assert_eq!(
            tree.children(root).unwrap().collect::<Vec<_>>(),
            vec![b]
        );

        tree.append_child(b, a).unwrap();
        assert_eq!(tree.children(b).unwrap().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn remove_subtree_frees_slots_for_reuse() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("root"));
        tree.set_root(root).unwrap();
        let a = tree.new_node(NodeData::element("a"));
        tree.append_child(root, a).unwrap();
        let b = tree.new_node(NodeData::element("b"));
        tree.append_child(a, b).unwrap();

        tree.remove_subtree(a).unwrap();
        assert!(tree.node(a).is_err());
        assert!(tree.node(b).is_err());

        let reused = tree.new_node(NodeData::element("reused"));
        assert_ne!(reused, a);
    }

    #[test]
    fn stale_id_after_free_is_rejected() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("root"));
        tree.set_root(root).unwrap();
        let a = tree.new_node(NodeData::element("a"));
        tree.append_child(root, a).unwrap();
        tree.remove_subtree(a).unwrap();
        let reused = tree.new_node(NodeData::element("reused"));
        tree.append_child(root, reused).unwrap();
        assert!(tree.node(a).is_err());
    }

    #[test]
    fn list_key_identity() {
        let mut tree = Tree::new();
        let list = tree.new_node(NodeData::element("interface"));
        let name = tree.new_node(NodeData::leaf("name", "eth0"));
        tree.append_child(list, name).unwrap();

        let other = tree.new_node(NodeData::element("interface"));
        let other_name = tree.new_node(NodeData::leaf("name", "eth0"));
        tree.append_child(other, other_name).unwrap();

        let keys = vec!["name".to_string()];
        assert!(tree.list_entries_equal(list, other, &keys).unwrap());
    }

    #[test]
    fn deep_clone_is_independent() {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("root"));
        tree.set_root(root).unwrap();
        let a = tree.new_node(NodeData::leaf("leaf", "1"));
        tree.append_child(root, a).unwrap();

        let clone = tree.deep_clone_subtree(root).unwrap();
        let clone_child = tree.children(clone).unwrap().next().unwrap();
        tree.node_mut(clone_child).unwrap().value = Some("2".to_string());

        assert_eq!(tree.node(a).unwrap().value.as_deref(), Some("1"));
        assert_eq!(tree.node(clone_child).unwrap().value.as_deref(), Some("2"));
    }
}
