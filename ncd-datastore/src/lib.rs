//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Named datastore store and pagination cursors.
//!
//! Datastore names are not a closed enum: `connect()` seeds `candidate`,
//! `running` and `startup`, and session-scoped or ad hoc names (`tmp`,
//! `result`, `<name>_<session-id>`) are created lazily on first reference,
//! mirroring the dynamic per-session database names the original backend
//! uses for its transaction-scoped scratch copies.

pub mod error;
pub mod paginator;

use std::collections::BTreeMap;
use std::io::Write as _;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

pub use error::{Error, Result};
use ncd_codec::Codec;
use ncd_tree::{NodeData, NodeId, Tree};
use ncd_yang::{SchemaContext, SchemaNodeId, SchemaNodeKind};
pub use paginator::{PaginatorState, SessionId};

const SEEDED_DATASTORES: &[&str] = &["candidate", "running", "startup"];

struct DatastoreEntry {
    tree: Tree,
    root: Option<NodeId>,
    path: Option<PathBuf>,
    locked_by: Option<SessionId>,
    cache: Option<String>,
    modified: bool,
    // Module-state header recorded when this entry was loaded from a
    // persisted file, kept around just long enough for `module_state_diff`
    // to compare it against the schema this run actually built; `None` for
    // a freshly created datastore, which has no prior module set to check.
    loaded_modules: Option<Vec<(String, Option<String>)>>,
}

impl DatastoreEntry {
    fn empty(path: Option<PathBuf>) -> Self {
        DatastoreEntry {
            tree: Tree::new(),
            root: None,
            path,
            locked_by: None,
            cache: None,
            modified: false,
            loaded_modules: None,
        }
    }
}

pub struct Datastore {
    dir: PathBuf,
    entries: BTreeMap<String, DatastoreEntry>,
    paginators: BTreeMap<(SessionId, String), PaginatorState>,
}

impl Datastore {
    /// Connects to the datastore directory, seeding the three well-known
    /// datastores and loading any that already have a persisted file.
    pub fn connect(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut store = Datastore {
            dir,
            entries: BTreeMap::new(),
            paginators: BTreeMap::new(),
        };
        for name in SEEDED_DATASTORES {
            store.create_if_absent(name)?;
        }
        Ok(store)
    }

    pub fn disconnect(&mut self, session: SessionId) {
        self.unlock_all(session);
        self.paginators.retain(|(s, _), _| *s != session);
    }

    /// True iff the on-disk file for `name` is present and non-empty,
    /// independent of whether an in-memory entry happens to exist for it.
    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name)
            .metadata()
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_db.xml", name))
    }

    /// Loads an entry for `name` from whatever content sits on disk already
    /// (used by [`connect`](Self::connect) to pick up a datastore a previous
    /// run persisted), falling back to an empty cache for an unparseable or
    /// absent file.
    fn create_if_absent(&mut self, name: &str) -> Result<()> {
        if self.exists(name) {
            self.load(name)
        } else {
            self.create(name)
        }
    }

    fn load(&mut self, name: &str) -> Result<()> {
        let path = self.file_path(name);
        let mut entry = DatastoreEntry::empty(Some(path.clone()));
        let raw = std::fs::read_to_string(&path)?;
        entry.loaded_modules = parse_module_state_header(&raw);
        let contents = strip_module_state_header(&raw);
        if !contents.trim().is_empty() {
            let root = ncd_codec::xml::XmlCodec.parse(&mut entry.tree, contents)?;
            entry.root = Some(root);
        }
        self.entries.insert(name.to_owned(), entry);
        Ok(())
    }

    /// Compares the module-state header `name` was persisted with against
    /// `schema`'s current module set, returning a human-readable line per
    /// module whose revision changed or that's no longer loaded. Empty if
    /// `name` was created fresh this run (no header to compare) or the two
    /// sets match. Callers are expected to log, not fail, on a non-empty
    /// result: no schema-migration machinery exists to act on it.
    pub fn module_state_diff(&self, name: &str, schema: &SchemaContext) -> Vec<String> {
        let Ok(entry) = self.entry(name) else {
            return Vec::new();
        };
        let Some(loaded) = &entry.loaded_modules else {
            return Vec::new();
        };
        let current: BTreeMap<&str, Option<&str>> = schema.modules().collect();
        loaded
            .iter()
            .filter_map(|(name, revision)| match current.get(name.as_str()) {
                Some(cur) if *cur == revision.as_deref() => None,
                Some(_) => Some(format!("{name}: revision changed")),
                None => Some(format!("{name}: no longer loaded")),
            })
            .collect()
    }

    /// Creates a named datastore backed by an empty, owner-only file.
    /// Idempotent: a cache already held for `name` is dropped and the file
    /// is (re)written empty rather than rejected as already existing.
    pub fn create(&mut self, name: &str) -> Result<()> {
        let path = self.file_path(name);
        std::fs::File::create(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        self.entries
            .insert(name.to_owned(), DatastoreEntry::empty(Some(path)));
        self.paginators.retain(|(_, db), _| db != name);
        Ok(())
    }

    /// Truncates a datastore's file to zero bytes and drops its cache, but
    /// keeps the entry (with an empty tree/root) and the file itself, so a
    /// privilege-dropped process can still re-create its content by name.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let entry = self.entry_mut(name)?;
        entry.tree = Tree::new();
        entry.root = None;
        entry.cache = None;
        entry.modified = false;
        if let Some(path) = entry.path.clone() {
            write_atomic(&path, b"")?;
        }
        self.paginators.retain(|(_, db), _| db != name);
        Ok(())
    }

    /// Empties a datastore's content and file, then immediately re-creates
    /// it, matching `delete` followed by `create`.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        self.delete(name)?;
        self.create(name)
    }

    /// Replaces `dst`'s content with a deep copy of `src`'s content,
    /// matching `<copy-config>` semantics.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<()> {
        if !self.exists(dst) {
            self.create(dst)?;
        }
        let (src_tree, src_root) = {
            let entry = self
                .entries
                .get(src)
                .ok_or_else(|| Error::NotFound(src.to_owned()))?;
            (&entry.tree, entry.root)
        };
        let mut new_tree = Tree::new();
        let new_root = match src_root {
            Some(root) => Some(new_tree.copy_subtree_from(src_tree, root)?),
            None => None,
        };
        let dst_entry = self.entry_mut(dst)?;
        dst_entry.tree = new_tree;
        dst_entry.root = new_root;
        dst_entry.cache = None;
        dst_entry.modified = true;
        Ok(())
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.exists(new) {
            return Err(Error::AlreadyExists(new.to_owned()));
        }
        let mut entry = self
            .entries
            .remove(old)
            .ok_or_else(|| Error::NotFound(old.to_owned()))?;
        if let Some(path) = &entry.path {
            let new_path = self.file_path(new);
            let _ = std::fs::rename(path, &new_path);
            entry.path = Some(new_path);
        }
        self.entries.insert(new.to_owned(), entry);
        let stale: Vec<(SessionId, String)> = self
            .paginators
            .keys()
            .filter(|(_, db)| db == old)
            .cloned()
            .collect();
        for key @ (session, _) in stale {
            if let Some(state) = self.paginators.remove(&key) {
                self.paginators
                    .insert((session, new.to_owned()), state);
            }
        }
        Ok(())
    }

    pub fn lock(&mut self, name: &str, session: SessionId) -> Result<()> {
        let entry = self.entry_mut(name)?;
        match entry.locked_by {
            Some(holder) if holder != session => Err(Error::LockedByOther {
                name: name.to_owned(),
                session: holder.0,
            }),
            _ => {
                entry.locked_by = Some(session);
                Ok(())
            }
        }
    }

    pub fn unlock(&mut self, name: &str, session: SessionId) -> Result<()> {
        let entry = self.entry_mut(name)?;
        match entry.locked_by {
            Some(holder) if holder == session => {
                entry.locked_by = None;
                self.paginators
                    .retain(|(s, db), _| !(*s == session && db == name));
                Ok(())
            }
            Some(_) => Err(Error::NotLocked(name.to_owned())),
            None => Err(Error::NotLocked(name.to_owned())),
        }
    }

    pub fn unlock_all(&mut self, session: SessionId) {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.locked_by == Some(session))
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            let _ = self.unlock(&name, session);
        }
    }

    pub fn is_locked(&self, name: &str) -> Result<Option<SessionId>> {
        Ok(self.entry(name)?.locked_by)
    }

    pub fn get(&self, name: &str) -> Result<(&Tree, Option<NodeId>)> {
        let entry = self.entry(name)?;
        Ok((&entry.tree, entry.root))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<(&mut Tree, &mut Option<NodeId>)> {
        let entry = self.entry_mut(name)?;
        entry.cache = None;
        entry.modified = true;
        Ok((&mut entry.tree, &mut entry.root))
    }

    /// Replaces the whole content of a datastore, used by the transaction
    /// engine when committing the target snapshot into `running`.
    pub fn put(&mut self, name: &str, tree: Tree, root: Option<NodeId>) -> Result<()> {
        let entry = self.entry_mut(name)?;
        entry.tree = tree;
        entry.root = root;
        entry.cache = None;
        entry.modified = true;
        Ok(())
    }

    /// Re-binds a datastore's cache to `schema`: rebinds every existing
    /// node's `schema` field to its matching schema node, and inserts
    /// YANG-declared default values for optional leaves and non-presence
    /// containers missing from the tree, recursively from the root down.
    /// A no-op if the datastore is empty or its root's name isn't among
    /// `schema`'s top-level nodes.
    pub fn populate(&mut self, name: &str, schema: &SchemaContext) -> Result<()> {
        let entry = self.entry_mut(name)?;
        if let Some(root) = entry.root {
            let root_name = entry.tree.node(root)?.name.clone();
            if let Some(schema_node) = schema.top_level(&root_name) {
                populate_node(&mut entry.tree, root, schema_node.id(), schema)?;
            }
        }
        entry.cache = None;
        Ok(())
    }

    /// Returns the cached serialized form, computing and caching it on the
    /// first call after any mutation.
    pub fn cache_get(
        &mut self,
        name: &str,
        codec: &dyn Codec,
        schema: Option<&SchemaContext>,
        with_defaults: bool,
    ) -> Result<String> {
        {
            let entry = self.entry(name)?;
            if let Some(cache) = &entry.cache {
                return Ok(cache.clone());
            }
        }
        let rendered = self.dump(name, codec, schema, with_defaults)?;
        self.entry_mut(name)?.cache = Some(rendered.clone());
        Ok(rendered)
    }

    pub fn modified_get(&self, name: &str) -> Result<bool> {
        Ok(self.entry(name)?.modified)
    }

    pub fn modified_set(&mut self, name: &str, value: bool) -> Result<()> {
        self.entry_mut(name)?.modified = value;
        Ok(())
    }

    /// Serializes a datastore's content without touching its cache,
    /// intended for diagnostics and `write_cache_to_file`. When `schema` is
    /// given the output is prefixed by a synthetic module-state header
    /// identifying the loaded modules and revisions. `with_defaults`
    /// chooses between the stored content as-is (`false`) and a transient
    /// copy augmented with schema defaults the same way `populate` would
    /// (`true`), without mutating the cached tree.
    pub fn dump(
        &self,
        name: &str,
        codec: &dyn Codec,
        schema: Option<&SchemaContext>,
        with_defaults: bool,
    ) -> Result<String> {
        let entry = self.entry(name)?;
        let mut out = String::new();
        if let Some(schema) = schema {
            out.push_str(&module_state_header(schema));
        }
        if let Some(root) = entry.root {
            let body = if with_defaults {
                if let Some(schema) = schema {
                    let mut augmented = Tree::new();
                    let new_root = augmented.copy_subtree_from(&entry.tree, root)?;
                    let root_name = augmented.node(new_root)?.name.clone();
                    if let Some(schema_node) = schema.top_level(&root_name) {
                        populate_node(&mut augmented, new_root, schema_node.id(), schema)?;
                    }
                    codec.serialize_pretty(&augmented, new_root)?
                } else {
                    codec.serialize_pretty(&entry.tree, root)?
                }
            } else {
                codec.serialize_pretty(&entry.tree, root)?
            };
            out.push_str(&body);
        }
        Ok(out)
    }

    /// Atomically persists a datastore's content: write to a temp file in
    /// the same directory, then rename over the real file, so a crash
    /// mid-write never leaves a truncated datastore on disk. Always
    /// persists with schema defaults filled in, so a reload sees the same
    /// content a live `<get-config>` would report.
    pub fn write_cache_to_file(
        &mut self,
        name: &str,
        codec: &dyn Codec,
        schema: Option<&SchemaContext>,
    ) -> Result<()> {
        let rendered = self.cache_get(name, codec, schema, true)?;
        let entry = self.entry(name)?;
        let Some(path) = &entry.path else {
            return Ok(());
        };
        let path = path.clone();
        write_atomic(&path, rendered.as_bytes())?;
        self.entry_mut(name)?.modified = false;
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&DatastoreEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut DatastoreEntry> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    pub fn paginate_start(
        &mut self,
        session: SessionId,
        xpath: &str,
        offset: usize,
        limit: Option<usize>,
        datastore: &str,
    ) -> Result<()> {
        let locked = self.is_locked(datastore)? == Some(session);
        self.paginators.insert(
            (session, xpath.to_owned()),
            PaginatorState {
                offset,
                limit,
                locked,
            },
        );
        Ok(())
    }

    pub fn paginate_get(
        &self,
        session: SessionId,
        xpath: &str,
    ) -> Option<&PaginatorState> {
        self.paginators.get(&(session, xpath.to_owned()))
    }
}

/// Binds `node` to `schema_id` and, for each of the schema node's children,
/// either rebinds the matching existing tree child (recursing into
/// containers) or synthesizes one carrying its declared default, when
/// present. RPC/notification schema kinds never appear under a datastore
/// root and are skipped.
fn populate_node(
    tree: &mut Tree,
    node: NodeId,
    schema_id: SchemaNodeId,
    schema: &SchemaContext,
) -> Result<()> {
    tree.node_mut(node)?.schema = Some(schema_id);
    let children: Vec<SchemaNodeId> = schema.node(schema_id).children().to_vec();
    for child_id in children {
        let child = schema.node(child_id);
        if !matches!(
            child.kind(),
            SchemaNodeKind::Container | SchemaNodeKind::List | SchemaNodeKind::Leaf
                | SchemaNodeKind::LeafList
        ) {
            continue;
        }
        match tree.find_child_by_name(node, child.name())? {
            Some(existing) => match child.kind() {
                SchemaNodeKind::Leaf | SchemaNodeKind::LeafList => {
                    tree.node_mut(existing)?.schema = Some(child_id);
                }
                _ => populate_node(tree, existing, child_id, schema)?,
            },
            None => {
                if let Some(default) = build_default_subtree(tree, child_id, schema)? {
                    tree.append_child(node, default)?;
                }
            }
        }
    }
    Ok(())
}

/// Synthesizes a subtree for a schema node entirely absent from the data
/// tree: a leaf gets its declared default value; a container is
/// synthesized only if it recursively carries at least one default leaf,
/// matching a non-presence container's implicit-existence semantics. Lists
/// and containers with no defaults anywhere underneath are left absent.
fn build_default_subtree(
    tree: &mut Tree,
    schema_id: SchemaNodeId,
    schema: &SchemaContext,
) -> Result<Option<NodeId>> {
    let node = schema.node(schema_id);
    match node.kind() {
        SchemaNodeKind::Leaf => {
            let Some(default) = schema.default_value(schema_id) else {
                return Ok(None);
            };
            let mut data = NodeData::leaf(node.name(), default);
            data.schema = Some(schema_id);
            Ok(Some(tree.new_node(data)))
        }
        SchemaNodeKind::Container => {
            let child_ids: Vec<SchemaNodeId> = node.children().to_vec();
            let mut children = Vec::new();
            for child_id in child_ids {
                if let Some(child) = build_default_subtree(tree, child_id, schema)? {
                    children.push(child);
                }
            }
            if children.is_empty() {
                return Ok(None);
            }
            let mut data = NodeData::element(node.name());
            data.schema = Some(schema_id);
            let container = tree.new_node(data);
            for child in children {
                tree.append_child(container, child)?;
            }
            Ok(Some(container))
        }
        _ => Ok(None),
    }
}

/// Synthetic `ietf-yang-library` header describing the schema set that
/// produced a persisted file. Always XML regardless of the body's codec:
/// it exists for human/tooling inspection and upgrade detection, not to
/// round-trip through `Codec`, so `strip_module_state_header` peels it back
/// off with a plain string scan rather than a parse.
fn module_state_header(schema: &SchemaContext) -> String {
    let mut header = String::from(
        "<modules-state xmlns=\"urn:ietf:params:xml:ns:yang:ietf-yang-library\">\n",
    );
    for (name, revision) in schema.modules() {
        header.push_str("  <module>\n");
        header.push_str(&format!("    <name>{}</name>\n", name));
        if let Some(revision) = revision {
            header.push_str(&format!("    <revision>{}</revision>\n", revision));
        }
        header.push_str("  </module>\n");
    }
    header.push_str("</modules-state>\n");
    header
}

/// Extracts the `(name, revision)` pairs out of a leading module-state
/// header, if there is one, via the same plain-text scan
/// `strip_module_state_header` uses to remove it. Returns `None` for
/// content with no header at all, as opposed to an empty `Vec` for a
/// present-but-moduleless header.
fn parse_module_state_header(contents: &str) -> Option<Vec<(String, Option<String>)>> {
    let trimmed = contents.trim_start();
    let rest = trimmed.strip_prefix("<modules-state")?;
    let end = rest.find("</modules-state>")?;
    let body = &rest[..end];

    let mut modules = Vec::new();
    let mut cursor = body;
    while let Some(start) = cursor.find("<module>") {
        let after = &cursor[start + "<module>".len()..];
        let Some(module_end) = after.find("</module>") else {
            break;
        };
        let block = &after[..module_end];
        let name = extract_element_text(block, "name");
        let revision = extract_element_text(block, "revision");
        if let Some(name) = name {
            modules.push((name, revision));
        }
        cursor = &after[module_end + "</module>".len()..];
    }
    Some(modules)
}

fn extract_element_text(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim().to_owned())
}

/// Strips a leading module-state header off previously persisted content,
/// so `load` can hand the remainder to the configured `Codec` as a normal
/// single-rooted document.
fn strip_module_state_header(contents: &str) -> &str {
    let trimmed = contents.trim_start();
    match trimmed.strip_prefix("<modules-state") {
        Some(rest) => match rest.find("</modules-state>") {
            Some(end) => rest[end + "</modules-state>".len()..].trim_start(),
            None => trimmed,
        },
        None => trimmed,
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    {
        let mut tmp_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        tmp_file.write_all(content)?;
        tmp_file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "ncd-datastore-test-{}-{}",
            std::process::id(),
            dir.as_os_str().len()
        ));
        dir
    }

    #[test]
    fn seeds_well_known_datastores() {
        let dir = tmp_dir();
        let store = Datastore::connect(&dir).unwrap();
        // A freshly seeded datastore's file exists but is empty, so
        // `exists` (which tracks on-disk content, not cache presence)
        // correctly reports false for it until something is written.
        assert!(store.get("candidate").is_ok());
        assert!(store.get("running").is_ok());
        assert!(store.get("startup").is_ok());
        assert!(!store.exists("candidate"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn exists_tracks_on_disk_content_not_the_cache() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        assert!(!store.exists("candidate"));
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("config")));
        }
        store
            .write_cache_to_file("candidate", &ncd_codec::xml::XmlCodec, None)
            .unwrap();
        assert!(store.exists("candidate"));
    }

    #[test]
    fn create_is_idempotent_and_drops_existing_content() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("config")));
        }
        assert!(store.create("candidate").is_ok());
        let (_, root) = store.get("candidate").unwrap();
        assert!(root.is_none());
        // Calling it again on the now-empty store is still fine.
        assert!(store.create("candidate").is_ok());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn delete_truncates_the_file_but_keeps_the_entry() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("config")));
        }
        store
            .write_cache_to_file("candidate", &ncd_codec::xml::XmlCodec, None)
            .unwrap();
        assert!(store.exists("candidate"));

        store.delete("candidate").unwrap();
        assert!(!store.exists("candidate"));
        // The entry is still there (not removed), with an empty tree/root,
        // so a subsequent reference re-creates rather than errors.
        let (_, root) = store.get("candidate").unwrap();
        assert!(root.is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn lock_conflict_is_reported() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        let s1 = SessionId(1);
        let s2 = SessionId(2);
        store.lock("candidate", s1).unwrap();
        let err = store.lock("candidate", s2).unwrap_err();
        assert!(matches!(err, Error::LockedByOther { .. }));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unlock_evicts_paginators() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        let session = SessionId(7);
        store.lock("candidate", session).unwrap();
        store
            .paginate_start(session, "/interfaces", 0, Some(10), "candidate")
            .unwrap();
        assert!(store.paginate_get(session, "/interfaces").is_some());
        store.unlock("candidate", session).unwrap();
        assert!(store.paginate_get(session, "/interfaces").is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn copy_is_a_deep_independent_clone() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            let r = tree.new_node(NodeData::element("config"));
            *root = Some(r);
        }
        store.copy("candidate", "running").unwrap();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            let leaf = tree.new_node(NodeData::leaf("x", "1"));
            tree.append_child(root.unwrap(), leaf).unwrap();
        }
        let (running_tree, running_root) = store.get("running").unwrap();
        assert_eq!(
            running_tree
                .children(running_root.unwrap())
                .unwrap()
                .count(),
            0
        );
        std::fs::remove_dir_all(dir).ok();
    }

    fn toaster_schema() -> SchemaContext {
        use ncd_yang::{SchemaBuilder, SchemaType};
        SchemaBuilder::new()
            .module("example-toaster", Some("2021-01-01"))
            .node(
                "",
                "/example-toaster:toaster",
                "toaster",
                "example-toaster",
                SchemaNodeKind::Container,
                None,
            )
            .expect("toaster container")
            .leaf_node(
                "/example-toaster:toaster",
                "/example-toaster:toaster/darkness",
                "darkness",
                "example-toaster",
                SchemaType::String,
                false,
                Some("5"),
            )
            .expect("darkness leaf")
            .build()
    }

    #[test]
    fn populate_inserts_schema_defaults() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        let schema = toaster_schema();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("toaster")));
        }
        store.populate("candidate", &schema).unwrap();
        let (tree, root) = store.get("candidate").unwrap();
        let darkness = tree
            .find_child_by_name(root.unwrap(), "darkness")
            .unwrap()
            .expect("default darkness leaf inserted");
        assert_eq!(tree.node(darkness).unwrap().value.as_deref(), Some("5"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn dump_prefixes_a_module_state_header_that_round_trips() {
        let dir = tmp_dir();
        let mut store = Datastore::connect(&dir).unwrap();
        let schema = toaster_schema();
        {
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("toaster")));
        }
        let rendered = store
            .dump("candidate", &ncd_codec::xml::XmlCodec, Some(&schema), true)
            .unwrap();
        assert!(rendered.contains("<modules-state"));
        assert!(rendered.contains("example-toaster"));
        assert!(rendered.contains("2021-01-01"));
        assert!(rendered.contains("<darkness>5</darkness>"));

        let stripped = strip_module_state_header(&rendered);
        assert!(!stripped.contains("modules-state"));
        assert!(stripped.contains("<toaster>"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn module_state_diff_flags_a_revision_bump_after_reload() {
        let dir = tmp_dir();
        let old_schema = toaster_schema();
        {
            let mut store = Datastore::connect(&dir).unwrap();
            let (tree, root) = store.get_mut("candidate").unwrap();
            *root = Some(tree.new_node(NodeData::element("toaster")));
            store
                .write_cache_to_file(
                    "candidate",
                    &ncd_codec::xml::XmlCodec,
                    Some(&old_schema),
                )
                .unwrap();
        }

        // Reconnecting picks the persisted file, and its header, back up.
        let store = Datastore::connect(&dir).unwrap();
        assert!(store.module_state_diff("candidate", &old_schema).is_empty());

        use ncd_yang::SchemaBuilder;
        let new_schema = SchemaBuilder::new()
            .module("example-toaster", Some("2022-06-01"))
            .build();
        let diff = store.module_state_diff("candidate", &new_schema);
        assert_eq!(diff, vec!["example-toaster: revision changed".to_owned()]);
        std::fs::remove_dir_all(dir).ok();
    }
}
