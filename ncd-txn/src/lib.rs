//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The transaction/commit engine: computes the delete/add/change delta
//! between a `src` and `tgt` datastore snapshot, and drives registered
//! plugins through the phase-ordered commit protocol.

pub mod alarm;
pub mod debug;
pub mod error;

pub use alarm::{Alarm, Alarms};
pub use error::{Error, PluginError, Result};
use ncd_tree::{NodeId, Tree};
use ncd_yang::SchemaContext;

use crate::debug::Debug;

/// The eight phases a commit drives plugins through, in this order. Not
/// every phase runs on every transaction: see [`Engine::commit`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    Begin,
    Validate,
    Complete,
    Commit,
    CommitDone,
    Revert,
    End,
    Abort,
}

/// Parallel delete/add/change vectors produced by [`compute_delta`]. The
/// `NodeId`s are weak references into the transaction's own `src`/`target`
/// trees: they are meaningless once the `Transaction` that produced
/// them is dropped.
#[derive(Debug, Default)]
pub struct Delta {
    /// Nodes present in `src` but absent from `target`, reported at the
    /// minimum-depth node that disappears entirely.
    pub deleted: Vec<NodeId>,
    /// Nodes present in `target` but absent from `src`.
    pub added: Vec<NodeId>,
    /// Leaves present in both trees with different body values: `changed_src`
    /// holds the `src`-side node, `changed_tgt` the matching `target`-side
    /// node at the same index. Containers and lists are never themselves
    /// entered here, only their leaf members.
    pub changed_src: Vec<NodeId>,
    pub changed_tgt: Vec<NodeId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.added.is_empty()
            && self.changed_src.is_empty()
    }
}

/// An in-flight commit attempt: the pre-change (`src`, a snapshot of
/// `running`) and post-change (`target`, a snapshot of `candidate`) trees,
/// their computed delta, and an opaque per-plugin argument slot plugins may
/// use to stash resources between phases.
pub struct Transaction {
    pub id: u64,
    pub src: Tree,
    pub target: Tree,
    pub delta: Delta,
    pub arg: Option<Box<dyn std::any::Any + Send>>,
}

/// Computes the delta between two schema-bound trees by walking both in
/// parallel, matching children by name and — for YANG list entries — by
/// key-leaf identity rather than positional order.
pub fn compute_delta(
    src: &Tree,
    src_root: Option<NodeId>,
    target: &Tree,
    target_root: Option<NodeId>,
    schema: Option<&SchemaContext>,
) -> Result<Delta> {
    let mut delta = Delta::default();
    match (src_root, target_root) {
        (Some(s), Some(t)) => diff_children(src, s, target, t, schema, &mut delta)?,
        (Some(s), None) => delta.deleted.push(s),
        (None, Some(t)) => delta.added.push(t),
        (None, None) => {}
    }
    Ok(delta)
}

fn diff_children(
    src: &Tree,
    src_parent: NodeId,
    target: &Tree,
    target_parent: NodeId,
    schema: Option<&SchemaContext>,
    delta: &mut Delta,
) -> Result<()> {
    let src_children: Vec<NodeId> = src.children(src_parent)?.collect();
    let target_children: Vec<NodeId> = target.children(target_parent)?.collect();
    let mut matched = vec![false; target_children.len()];

    for &s in &src_children {
        let s_data = src.node(s)?;
        let keys = s_data
            .schema
            .zip(schema)
            .map(|(id, ctx)| ctx.node(id).keys().to_vec());

        let mut found = None;
        for (idx, &t) in target_children.iter().enumerate() {
            if matched[idx] || target.node(t)?.name != s_data.name {
                continue;
            }
            let identical_entry = match &keys {
                Some(keys) if !keys.is_empty() => {
                    src.list_key_values(s, keys)? == target.list_key_values(t, keys)?
                }
                _ => true,
            };
            if identical_entry {
                found = Some(idx);
                break;
            }
        }

        match found {
            None => delta.deleted.push(s),
            Some(idx) => {
                matched[idx] = true;
                let t = target_children[idx];
                let s_has_children = src.children(s)?.next().is_some();
                let t_has_children = target.children(t)?.next().is_some();
                if !s_has_children && !t_has_children {
                    if src.node(s)?.value != target.node(t)?.value {
                        delta.changed_src.push(s);
                        delta.changed_tgt.push(t);
                    }
                } else {
                    diff_children(src, s, target, t, schema, delta)?;
                }
            }
        }
    }

    for (idx, &t) in target_children.iter().enumerate() {
        if !matched[idx] {
            delta.added.push(t);
        }
    }
    Ok(())
}

/// A registered commit plugin. One method per phase; `validate`/`complete`/
/// `commit` are fallible (a `String` reason is enough for the engine to wrap
/// into a [`PluginError`]). `revert`/`end`/`abort` are best-effort and
/// cannot fail the transaction further: a revert failure is logged and
/// raises an [`Alarm`], never repropagated.
pub trait CommitPlugin: Send {
    fn name(&self) -> &'static str;

    fn begin(&mut self, _txn: &mut Transaction) -> std::result::Result<(), String> {
        Ok(())
    }

    fn validate(
        &mut self,
        _txn: &mut Transaction,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    fn complete(
        &mut self,
        _txn: &mut Transaction,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    fn commit(&mut self, _txn: &mut Transaction) -> std::result::Result<(), String> {
        Ok(())
    }

    fn commit_done(&mut self, _txn: &mut Transaction) {}
    fn revert(&mut self, _txn: &mut Transaction) {}
    fn end(&mut self, _txn: &mut Transaction) {}
    fn abort(&mut self, _txn: &mut Transaction) {}
}

/// Drives a registered plugin list through the commit phase order. Plugin
/// load order is registration order; the same order is used for every
/// forward phase, and reversed for `abort`/`revert`.
pub struct Engine {
    plugins: Vec<Box<dyn CommitPlugin>>,
    next_id: u64,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            plugins: Vec::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, plugin: Box<dyn CommitPlugin>) {
        self.plugins.push(plugin);
    }

    /// Runs one commit attempt against the given `src`/`target` snapshots.
    /// Returns the transaction id on success. On any pre-commit phase
    /// failure, every plugin receives `abort` (reverse order) and then
    /// `end`; on a mid-commit failure, plugins that had already committed
    /// receive `revert` (reverse order, best-effort, alarmed on failure)
    /// before `end` runs for everyone.
    pub fn commit(
        &mut self,
        src: Tree,
        src_root: Option<NodeId>,
        target: Tree,
        target_root: Option<NodeId>,
        schema: Option<&SchemaContext>,
        alarms: &mut Alarms,
    ) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;

        let delta = compute_delta(&src, src_root, &target, target_root, schema)?;
        Debug::DeltaComputed(
            id,
            delta.deleted.len(),
            delta.added.len(),
            delta.changed_src.len(),
        )
        .log();

        let mut txn = Transaction {
            id,
            src,
            target,
            delta,
            arg: None,
        };

        for phase in [Phase::Begin, Phase::Validate, Phase::Complete] {
            Debug::PhaseEnter(id, phase).log();
            if let Err((failed_at, err)) = self.run_phase(phase, &mut txn) {
                self.abort(id, &mut txn, phase, failed_at);
                return Err(match phase {
                    Phase::Validate => Error::Validate(err),
                    Phase::Complete => Error::Complete(err),
                    _ => Error::Validate(err),
                });
            }
        }

        Debug::PhaseEnter(id, Phase::Commit).log();
        let mut committed = 0;
        for plugin in self.plugins.iter_mut() {
            Debug::PluginCallback(Phase::Commit, plugin.name()).log();
            if let Err(reason) = plugin.commit(&mut txn) {
                let failed_plugin = plugin.name();
                for reverted in self.plugins[..committed].iter_mut().rev() {
                    let name = reverted.name();
                    Debug::Revert(id, name).log();
                    reverted.revert(&mut txn);
                    alarms.record(Alarm {
                        transaction_id: id,
                        plugin: name,
                        reason: format!(
                            "reverted after commit failure in plugin {}",
                            failed_plugin
                        ),
                    });
                }
                for plugin in self.plugins.iter_mut() {
                    plugin.end(&mut txn);
                }
                return Err(Error::Commit(PluginError::new(failed_plugin, reason)));
            }
            committed += 1;
        }

        Debug::PhaseEnter(id, Phase::CommitDone).log();
        for plugin in self.plugins.iter_mut() {
            plugin.commit_done(&mut txn);
        }
        Debug::PhaseEnter(id, Phase::End).log();
        for plugin in self.plugins.iter_mut() {
            plugin.end(&mut txn);
        }
        Ok(id)
    }

    /// Runs every registered plugin's callback for one pre-commit phase, in
    /// registration order, stopping at the first failure. Returns the index
    /// of the failing plugin alongside the error so the caller can tell
    /// which callbacks of the *current* phase actually ran.
    fn run_phase(
        &mut self,
        phase: Phase,
        txn: &mut Transaction,
    ) -> std::result::Result<(), (usize, PluginError)> {
        for (idx, plugin) in self.plugins.iter_mut().enumerate() {
            Debug::PluginCallback(phase, plugin.name()).log();
            let result = match phase {
                Phase::Begin => plugin.begin(txn),
                Phase::Validate => plugin.validate(txn),
                Phase::Complete => plugin.complete(txn),
                _ => unreachable!("run_phase only drives pre-commit phases"),
            };
            if let Err(reason) = result {
                return Err((idx, PluginError::new(plugin.name(), reason)));
            }
        }
        Ok(())
    }

    /// Aborts a failed pre-commit attempt. Every plugin that ran this phase
    /// successfully (index `< failed_at`) or ran a prior phase in full
    /// (`phase != Begin`, meaning every plugin got at least `begin`) gets
    /// `abort`, in reverse registration order, then every plugin gets `end`.
    fn abort(
        &mut self,
        id: u64,
        txn: &mut Transaction,
        phase: Phase,
        failed_at: usize,
    ) {
        Debug::Abort(id, "pre-commit phase failed").log();
        let abort_count = if phase == Phase::Begin {
            failed_at
        } else {
            self.plugins.len()
        };
        for plugin in self.plugins[..abort_count].iter_mut().rev() {
            plugin.abort(txn);
        }
        for plugin in self.plugins.iter_mut() {
            plugin.end(txn);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use ncd_tree::NodeData;

    use super::*;

    fn tree_of(pairs: &[(&str, &str)]) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let root = tree.new_node(NodeData::element("r"));
        tree.set_root(root).unwrap();
        for (name, value) in pairs {
            let leaf = tree.new_node(NodeData::leaf(*name, *value));
            tree.append_child(root, leaf).unwrap();
        }
        (tree, root)
    }

    #[test]
    fn delta_reports_delete_add_and_change() {
        let (src, src_root) = tree_of(&[("x", "1"), ("y", "2")]);
        let (tgt, tgt_root) = tree_of(&[("x", "1"), ("z", "3")]);

        let delta =
            compute_delta(&src, Some(src_root), &tgt, Some(tgt_root), None).unwrap();
        assert_eq!(delta.deleted.len(), 1);
        assert_eq!(src.node(delta.deleted[0]).unwrap().name, "y");
        assert_eq!(delta.added.len(), 1);
        assert_eq!(tgt.node(delta.added[0]).unwrap().name, "z");
        assert!(delta.changed_src.is_empty());
    }

    #[test]
    fn delta_is_empty_for_identical_trees() {
        let (src, src_root) = tree_of(&[("x", "1")]);
        let (tgt, tgt_root) = tree_of(&[("x", "1")]);
        let delta =
            compute_delta(&src, Some(src_root), &tgt, Some(tgt_root), None).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn changed_leaf_value_is_reported_as_a_pair() {
        let (src, src_root) = tree_of(&[("x", "1")]);
        let (tgt, tgt_root) = tree_of(&[("x", "2")]);
        let delta =
            compute_delta(&src, Some(src_root), &tgt, Some(tgt_root), None).unwrap();
        assert_eq!(delta.changed_src.len(), 1);
        assert_eq!(src.node(delta.changed_src[0]).unwrap().value.as_deref(), Some("1"));
        assert_eq!(tgt.node(delta.changed_tgt[0]).unwrap().value.as_deref(), Some("2"));
    }

    struct RecordingPlugin {
        name: &'static str,
        fail_on: Option<Phase>,
        log: std::sync::Arc<std::sync::Mutex<Vec<(&'static str, &'static str)>>>,
    }

    impl CommitPlugin for RecordingPlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn begin(&mut self, _txn: &mut Transaction) -> std::result::Result<(), String> {
            self.record("begin");
            self.maybe_fail(Phase::Begin)
        }

        fn validate(
            &mut self,
            _txn: &mut Transaction,
        ) -> std::result::Result<(), String> {
            self.record("validate");
            self.maybe_fail(Phase::Validate)
        }

        fn complete(
            &mut self,
            _txn: &mut Transaction,
        ) -> std::result::Result<(), String> {
            self.record("complete");
            self.maybe_fail(Phase::Complete)
        }

        fn commit(&mut self, _txn: &mut Transaction) -> std::result::Result<(), String> {
            self.record("commit");
            self.maybe_fail(Phase::Commit)
        }

        fn commit_done(&mut self, _txn: &mut Transaction) {
            self.record("commit_done");
        }

        fn revert(&mut self, _txn: &mut Transaction) {
            self.record("revert");
        }

        fn end(&mut self, _txn: &mut Transaction) {
            self.record("end");
        }

        fn abort(&mut self, _txn: &mut Transaction) {
            self.record("abort");
        }
    }

    impl RecordingPlugin {
        fn record(&self, event: &'static str) {
            self.log.lock().unwrap().push((self.name, event));
        }

        fn maybe_fail(&self, phase: Phase) -> std::result::Result<(), String> {
            if self.fail_on == Some(phase) {
                Err("boom".to_owned())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn successful_commit_runs_every_phase_in_order() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.register(Box::new(RecordingPlugin {
            name: "p1",
            fail_on: None,
            log: log.clone(),
        }));

        let (src, _) = tree_of(&[]);
        let (tgt, tgt_root) = tree_of(&[("x", "1")]);
        let mut alarms = Alarms::default();
        let id = engine
            .commit(src, None, tgt, Some(tgt_root), None, &mut alarms)
            .unwrap();
        assert_eq!(id, 1);

        let events: Vec<&str> = log.lock().unwrap().iter().map(|(_, e)| *e).collect();
        assert_eq!(
            events,
            vec!["begin", "validate", "complete", "commit", "commit_done", "end"]
        );
    }

    #[test]
    fn validate_failure_aborts_and_never_commits() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.register(Box::new(RecordingPlugin {
            name: "p1",
            fail_on: Some(Phase::Validate),
            log: log.clone(),
        }));

        let (src, _) = tree_of(&[]);
        let (tgt, tgt_root) = tree_of(&[("x", "1")]);
        let mut alarms = Alarms::default();
        let err = engine
            .commit(src, None, tgt, Some(tgt_root), None, &mut alarms)
            .unwrap_err();
        assert!(matches!(err, Error::Validate(_)));

        let events: Vec<&str> = log.lock().unwrap().iter().map(|(_, e)| *e).collect();
        assert_eq!(events, vec!["begin", "validate", "abort", "end"]);
    }

    #[test]
    fn mid_commit_failure_reverts_already_committed_plugins_and_alarms() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.register(Box::new(RecordingPlugin {
            name: "p1",
            fail_on: None,
            log: log.clone(),
        }));
        engine.register(Box::new(RecordingPlugin {
            name: "p2",
            fail_on: Some(Phase::Commit),
            log: log.clone(),
        }));

        let (src, _) = tree_of(&[]);
        let (tgt, tgt_root) = tree_of(&[("x", "1")]);
        let mut alarms = Alarms::default();
        let err = engine
            .commit(src, None, tgt, Some(tgt_root), None, &mut alarms)
            .unwrap_err();
        assert!(matches!(err, Error::Commit(_)));
        assert_eq!(alarms.total(), 1);

        let events = log.lock().unwrap().clone();
        let p1_events: Vec<&str> =
            events.iter().filter(|(n, _)| *n == "p1").map(|(_, e)| *e).collect();
        assert!(p1_events.contains(&"revert"));
        assert!(p1_events.contains(&"end"));
    }
}
