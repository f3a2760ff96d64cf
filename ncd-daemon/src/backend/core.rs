//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The backend task: the single owner of the datastore, the schema context
//! and the commit engine. Frontend tasks (NETCONF, IPC) never touch any of
//! these directly; they submit [`BackendMsg`]s over an `mpsc` channel and
//! await the reply.

use std::collections::HashSet;
use std::time::Duration;

use ncd_codec::Codec;
use ncd_codec::xml::XmlCodec;
use ncd_datastore::{Datastore, Error as DsError, SessionId};
use ncd_edit::{EditOperation, Error as EditError, apply_edit_config};
use ncd_netconf::{ErrorTag, ErrorType, RpcError};
use ncd_tree::{NodeData, NodeId, Tree};
use ncd_txn::{Alarms, Engine, Error as TxnError};
use ncd_utils::Database;
use ncd_utils::task::TimeoutTask;
use ncd_yang::SchemaContext;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::db;
use super::plugin::AuditPlugin;
use super::rpc::{BackendMsg, RpcOutcome};

/// State kept alive between a `<commit confirmed="true">` and either its
/// confirming follow-up commit or its timeout-driven rollback.
struct ConfirmedCommit {
    prior_running: Tree,
    prior_running_root: Option<NodeId>,
    _timeout: TimeoutTask,
}

pub struct Backend {
    datastore: Datastore,
    schema: Option<SchemaContext>,
    engine: Engine,
    alarms: Alarms,
    db: Database,
    codec: XmlCodec,
    sessions: HashSet<u32>,
    confirmed_commit: Option<ConfirmedCommit>,
    confirmed_commit_timeout: Duration,
    confirmed_commit_tx: mpsc::UnboundedSender<()>,
    confirmed_commit_rx: mpsc::UnboundedReceiver<()>,
}

impl Backend {
    pub fn new(
        datastore: Datastore,
        schema: Option<SchemaContext>,
        db: Database,
        confirmed_commit_timeout: Duration,
    ) -> Self {
        let mut engine = Engine::new();
        engine.register(Box::new(AuditPlugin));
        let (confirmed_commit_tx, confirmed_commit_rx) = mpsc::unbounded_channel();
        let mut backend = Backend {
            datastore,
            schema,
            engine,
            alarms: Alarms::default(),
            db,
            codec: XmlCodec,
            sessions: HashSet::new(),
            confirmed_commit: None,
            confirmed_commit_timeout,
            confirmed_commit_tx,
            confirmed_commit_rx,
        };
        // Bind each well-known datastore's cache to the schema and fill in
        // any declared defaults before the first session can observe it.
        // A datastore persisted under a different module set than this run
        // loaded is logged, not rejected: there's no schema-migration path
        // to actually reconcile the two.
        if let Some(schema) = &backend.schema {
            for name in ["candidate", "running", "startup"] {
                let diff = backend.datastore.module_state_diff(name, schema);
                if !diff.is_empty() {
                    warn!(name, modules = ?diff, "datastore was persisted under a different module set");
                }
                let _ = backend.datastore.populate(name, schema);
            }
        }
        backend
    }

    /// Drives the backend until `shutdown` fires. Frontend tasks keep
    /// running independently and simply stop getting replies once this
    /// returns; the process exit (triggered by the same shutdown signal)
    /// is what actually tears them down.
    pub async fn run(
        mut self,
        mut msg_rx: mpsc::UnboundedReceiver<BackendMsg>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                msg = msg_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_msg(msg),
                        None => break,
                    }
                }
                _ = &mut shutdown => {
                    break;
                }
                _ = self.confirmed_commit_rx.recv(), if self.confirmed_commit.is_some() => {
                    self.expire_confirmed_commit();
                }
            }
        }
    }

    fn handle_msg(&mut self, msg: BackendMsg) {
        match msg {
            BackendMsg::Connect(session) => {
                self.sessions.insert(session.0);
            }
            BackendMsg::Disconnect(session) => {
                self.sessions.remove(&session.0);
                self.datastore.disconnect(session);
            }
            BackendMsg::Rpc(request) => {
                let outcome = self.dispatch(request.session, &request.tree, request.operation);
                let _ = request.reply.send(super::rpc::RpcResponse { outcome });
            }
        }
    }

    fn dispatch(&mut self, session: SessionId, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let name = match tree.node(operation) {
            Ok(data) => data.name.clone(),
            Err(_) => return errors_malformed("malformed <rpc>"),
        };
        match name.as_str() {
            "get" => self.op_get(),
            "get-config" => self.op_get_config(tree, operation),
            "edit-config" => self.op_edit_config(tree, operation),
            "commit" => self.op_commit(tree, operation),
            "lock" => self.op_lock(session, tree, operation),
            "unlock" => self.op_unlock(session, tree, operation),
            "discard-changes" => self.op_discard_changes(),
            "copy-config" => self.op_copy_config(tree, operation),
            "delete-config" => self.op_delete_config(tree, operation),
            "close-session" => RpcOutcome::CloseSession,
            "kill-session" => self.op_kill_session(tree, operation),
            other => RpcOutcome::Errors(vec![
                RpcError::new(ErrorType::Protocol, ErrorTag::OperationNotSupported)
                    .with_message(format!("unsupported operation: {other}")),
            ]),
        }
    }

    fn op_get(&mut self) -> RpcOutcome {
        self.render_datastore("running")
    }

    fn op_get_config(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let source = datastore_ref(tree, operation, "source").unwrap_or_else(|| "running".to_owned());
        self.render_datastore(&source)
    }

    fn render_datastore(&mut self, name: &str) -> RpcOutcome {
        match self.datastore.get(name) {
            Ok((src_tree, Some(src_root))) => {
                let mut out = Tree::new();
                match out.copy_subtree_from(src_tree, src_root) {
                    Ok(root) => RpcOutcome::Data { tree: out, root },
                    Err(e) => datastore_error(DsError::from(e)),
                }
            }
            Ok((_, None)) => {
                let mut out = Tree::new();
                let root = out.new_node(NodeData::element("data"));
                RpcOutcome::Data { tree: out, root }
            }
            Err(e) => datastore_error(e),
        }
    }

    fn op_edit_config(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let target = datastore_ref(tree, operation, "target").unwrap_or_else(|| "candidate".to_owned());
        if target == "running" {
            return RpcOutcome::Errors(vec![
                RpcError::new(ErrorType::Protocol, ErrorTag::OperationNotSupported)
                    .with_message("running cannot be the target of <edit-config>"),
            ]);
        }

        let default_operation = tree
            .find_child_by_name(operation, "default-operation")
            .ok()
            .flatten()
            .and_then(|n| tree.node(n).ok().and_then(|d| d.value.as_deref()))
            .and_then(EditOperation::from_attr)
            .unwrap_or(EditOperation::Merge);

        let config_wrapper = match tree.find_child_by_name(operation, "config") {
            Ok(Some(id)) => id,
            Ok(None) => {
                return RpcOutcome::Errors(vec![
                    RpcError::new(ErrorType::Rpc, ErrorTag::MissingElement)
                        .with_message("<edit-config> missing <config>"),
                ]);
            }
            Err(e) => return datastore_error(DsError::from(e)),
        };
        let config_children: Vec<NodeId> = match tree.children(config_wrapper) {
            Ok(iter) => iter.collect(),
            Err(e) => return datastore_error(DsError::from(e)),
        };

        let target_root = match ensure_root(&mut self.datastore, &target) {
            Ok(id) => id,
            Err(e) => return datastore_error(e),
        };

        for config_root in config_children {
            let (target_tree, _) = match self.datastore.get_mut(&target) {
                Ok(v) => v,
                Err(e) => return datastore_error(e),
            };
            if let Err(e) = apply_edit_config(
                target_tree,
                target_root,
                tree,
                config_root,
                default_operation,
                self.schema.as_ref(),
            ) {
                return edit_error_to_rpc(e);
            }
        }
        RpcOutcome::Ok
    }

    fn op_commit(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let confirmed = matches!(tree.find_child_by_name(operation, "confirmed"), Ok(Some(_)));

        // A bare follow-up <commit/> while a confirmed commit is pending
        // confirms it rather than starting a new transaction.
        if self.confirmed_commit.is_some() && !confirmed {
            self.confirmed_commit = None;
            return RpcOutcome::Ok;
        }

        let confirm_timeout = tree
            .find_child_by_name(operation, "confirm-timeout")
            .ok()
            .flatten()
            .and_then(|n| tree.node(n).ok().and_then(|d| d.value.clone()))
            .and_then(|v| v.parse::<u64>().ok());

        let (running_tree, running_root) = match self.datastore.get("running") {
            Ok(v) => v,
            Err(e) => return datastore_error(e),
        };
        let mut prior_running = Tree::new();
        let prior_running_root = match running_root {
            Some(r) => match prior_running.copy_subtree_from(running_tree, r) {
                Ok(id) => Some(id),
                Err(e) => return datastore_error(DsError::from(e)),
            },
            None => None,
        };
        let mut src = Tree::new();
        let src_root = match running_root {
            Some(r) => match src.copy_subtree_from(running_tree, r) {
                Ok(id) => Some(id),
                Err(e) => return datastore_error(DsError::from(e)),
            },
            None => None,
        };

        let (candidate_tree, candidate_root) = match self.datastore.get("candidate") {
            Ok(v) => v,
            Err(e) => return datastore_error(e),
        };
        let mut target = Tree::new();
        let target_root = match candidate_root {
            Some(r) => match target.copy_subtree_from(candidate_tree, r) {
                Ok(id) => Some(id),
                Err(e) => return datastore_error(DsError::from(e)),
            },
            None => None,
        };

        let running_before = prior_running_root
            .map(|r| self.codec.serialize(&prior_running, r).unwrap_or_default())
            .unwrap_or_default();
        let running_after = target_root
            .map(|r| self.codec.serialize(&target, r).unwrap_or_default())
            .unwrap_or_default();

        match self.engine.commit(
            src,
            src_root,
            target,
            target_root,
            self.schema.as_ref(),
            &mut self.alarms,
        ) {
            Ok(id) => {
                if let Err(e) = self.datastore.copy("candidate", "running") {
                    return datastore_error(e);
                }
                if let Some(schema) = &self.schema {
                    let _ = self.datastore.populate("running", schema);
                }
                if let Err(e) = self.datastore.write_cache_to_file("running", &self.codec, self.schema.as_ref()) {
                    warn!(%e, "failed to persist running after commit");
                }
                if let Ok(mut db) = self.db.lock() {
                    db::transaction_record(
                        &mut db,
                        db::TransactionRecord {
                            id,
                            running_before,
                            running_after,
                        },
                    );
                }
                if confirmed {
                    let timeout = confirm_timeout
                        .map(Duration::from_secs)
                        .unwrap_or(self.confirmed_commit_timeout);
                    let tx = self.confirmed_commit_tx.clone();
                    let task = TimeoutTask::new(timeout, move || async move {
                        let _ = tx.send(());
                    });
                    info!(?timeout, "confirmed commit pending");
                    self.confirmed_commit = Some(ConfirmedCommit {
                        prior_running,
                        prior_running_root,
                        _timeout: task,
                    });
                }
                RpcOutcome::Ok
            }
            Err(err) => {
                err.log();
                RpcOutcome::Errors(vec![commit_error_to_rpc(err)])
            }
        }
    }

    fn expire_confirmed_commit(&mut self) {
        if let Some(pending) = self.confirmed_commit.take() {
            warn!("confirmed commit timed out, reverting running");
            if let Err(e) = self
                .datastore
                .put("running", pending.prior_running, pending.prior_running_root)
            {
                warn!(%e, "failed to revert running after confirmed commit timeout");
                return;
            }
            if let Err(e) = self.datastore.write_cache_to_file("running", &self.codec, self.schema.as_ref()) {
                warn!(%e, "failed to persist reverted running");
            }
        }
    }

    fn op_lock(&mut self, session: SessionId, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let target = datastore_ref(tree, operation, "target").unwrap_or_else(|| "candidate".to_owned());
        match self.datastore.lock(&target, session) {
            Ok(()) => RpcOutcome::Ok,
            Err(e) => datastore_error(e),
        }
    }

    fn op_unlock(&mut self, session: SessionId, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let target = datastore_ref(tree, operation, "target").unwrap_or_else(|| "candidate".to_owned());
        match self.datastore.unlock(&target, session) {
            Ok(()) => RpcOutcome::Ok,
            Err(e) => datastore_error(e),
        }
    }

    fn op_discard_changes(&mut self) -> RpcOutcome {
        match self.datastore.copy("running", "candidate") {
            Ok(()) => RpcOutcome::Ok,
            Err(e) => datastore_error(e),
        }
    }

    fn op_copy_config(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let source = match datastore_ref(tree, operation, "source") {
            Some(s) => s,
            None => return errors_missing("<copy-config> missing <source>"),
        };
        let target = match datastore_ref(tree, operation, "target") {
            Some(t) => t,
            None => return errors_missing("<copy-config> missing <target>"),
        };
        match self.datastore.copy(&source, &target) {
            Ok(()) => {
                if target == "running" {
                    if let Err(e) = self.datastore.write_cache_to_file("running", &self.codec, self.schema.as_ref()) {
                        warn!(%e, "failed to persist running after copy-config");
                    }
                }
                RpcOutcome::Ok
            }
            Err(e) => datastore_error(e),
        }
    }

    fn op_delete_config(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let target = match datastore_ref(tree, operation, "target") {
            Some(t) => t,
            None => return errors_missing("<delete-config> missing <target>"),
        };
        if target == "running" {
            return RpcOutcome::Errors(vec![
                RpcError::new(ErrorType::Protocol, ErrorTag::OperationNotSupported)
                    .with_message("running cannot be deleted"),
            ]);
        }
        match self.datastore.delete(&target) {
            Ok(()) => RpcOutcome::Ok,
            Err(e) => datastore_error(e),
        }
    }

    fn op_kill_session(&mut self, tree: &Tree, operation: NodeId) -> RpcOutcome {
        let target_session = tree
            .find_child_by_name(operation, "session-id")
            .ok()
            .flatten()
            .and_then(|n| tree.node(n).ok().and_then(|d| d.value.clone()))
            .and_then(|v| v.parse::<u32>().ok());
        match target_session {
            // The killed session's own socket belongs to a frontend task
            // this backend has no handle to; it notices its peer is gone on
            // its next read. This only releases the locks and pagination
            // state that session held.
            Some(id) => {
                self.datastore.disconnect(SessionId(id));
                self.sessions.remove(&id);
                RpcOutcome::Ok
            }
            None => errors_missing("<kill-session> missing <session-id>"),
        }
    }
}

fn datastore_ref(tree: &Tree, operation: NodeId, wrapper: &str) -> Option<String> {
    let wrapper_id = tree.find_child_by_name(operation, wrapper).ok().flatten()?;
    let child = tree.children(wrapper_id).ok()?.next()?;
    tree.node(child).ok().map(|d| d.name.clone())
}

fn ensure_root(datastore: &mut Datastore, name: &str) -> ncd_datastore::Result<NodeId> {
    let (tree, root) = datastore.get_mut(name)?;
    if let Some(id) = *root {
        return Ok(id);
    }
    let id = tree.new_node(NodeData::element("config"));
    *root = Some(id);
    Ok(id)
}

fn errors_missing(message: &str) -> RpcOutcome {
    RpcOutcome::Errors(vec![
        RpcError::new(ErrorType::Rpc, ErrorTag::MissingElement).with_message(message),
    ])
}

fn errors_malformed(message: &str) -> RpcOutcome {
    RpcOutcome::Errors(vec![
        RpcError::new(ErrorType::Rpc, ErrorTag::MalformedMessage).with_message(message),
    ])
}

fn datastore_error(err: DsError) -> RpcOutcome {
    let rpc_err = match err {
        DsError::NotFound(name) => RpcError::new(ErrorType::Application, ErrorTag::DataMissing)
            .with_message(format!("no such datastore: {name}")),
        DsError::AlreadyExists(name) => {
            RpcError::new(ErrorType::Application, ErrorTag::DataExists)
                .with_message(format!("datastore already exists: {name}"))
        }
        DsError::LockedByOther { name, session } => {
            RpcError::new(ErrorType::Protocol, ErrorTag::LockDenied)
                .with_message(format!("{name} is locked"))
                .with_session_id(session)
        }
        DsError::NotLocked(name) => RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
            .with_message(format!("{name} is not locked by this session")),
        DsError::Io(_) | DsError::Codec(_) | DsError::Tree(_) => {
            RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
                .with_message(err.to_string())
        }
    };
    RpcOutcome::Errors(vec![rpc_err])
}

fn edit_error_to_rpc(err: EditError) -> RpcOutcome {
    let rpc_err = match &err {
        EditError::DataExists(_) => {
            RpcError::new(ErrorType::Application, ErrorTag::DataExists).with_message(err.to_string())
        }
        EditError::DataMissing(_) => {
            RpcError::new(ErrorType::Application, ErrorTag::DataMissing).with_message(err.to_string())
        }
        EditError::BadOperation(_) => {
            RpcError::new(ErrorType::Protocol, ErrorTag::OperationNotSupported)
                .with_message(err.to_string())
        }
        EditError::Tree(_) => RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
            .with_message(err.to_string()),
    };
    RpcOutcome::Errors(vec![rpc_err])
}

fn commit_error_to_rpc(err: TxnError) -> RpcError {
    match &err {
        TxnError::Validate(p) => RpcError::new(ErrorType::Application, ErrorTag::OperationNotSupported)
            .with_message(format!("{}: {}", p.plugin, p.reason)),
        TxnError::Complete(p) => RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
            .with_message(format!("{}: {}", p.plugin, p.reason)),
        TxnError::Commit(p) => RpcError::new(ErrorType::Application, ErrorTag::RollbackFailed)
            .with_message(format!("{}: {}", p.plugin, p.reason)),
        TxnError::Tree(_) => RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
            .with_message(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn tmp_dir(label: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("ncd-core-test-{label}-{}", std::process::id()));
        dir
    }

    fn mem_database() -> Database {
        Arc::new(Mutex::new(PickleDb::new(
            tmp_dir("db"),
            PickleDbDumpPolicy::NeverDump,
            SerializationMethod::Bin,
        )))
    }

    fn backend() -> (Backend, PathBuf) {
        let dir = tmp_dir("store");
        let datastore = Datastore::connect(&dir).unwrap();
        let backend = Backend::new(
            datastore,
            Some(crate::schema::build()),
            mem_database(),
            Duration::from_secs(600),
        );
        (backend, dir)
    }

    #[test]
    fn edit_config_then_commit_populates_running() {
        let (mut backend, dir) = backend();
        let mut tree = Tree::new();
        let rpc = tree.new_node(NodeData::element("rpc"));
        tree.append_child(rpc, {
            let op = tree.new_node(NodeData::element("edit-config"));
            op
        })
        .unwrap();

        // Build <edit-config><target><candidate/></target><config>...</config></edit-config>
        let edit_op = tree.find_child_by_name(rpc, "edit-config").unwrap().unwrap();
        let target_wrapper = tree.new_node(NodeData::element("target"));
        tree.append_child(edit_op, target_wrapper).unwrap();
        let candidate_marker = tree.new_node(NodeData::element("candidate"));
        tree.append_child(target_wrapper, candidate_marker).unwrap();

        let config_wrapper = tree.new_node(NodeData::element("config"));
        tree.append_child(edit_op, config_wrapper).unwrap();
        let interfaces = tree.new_node(NodeData::element("interfaces"));
        tree.append_child(config_wrapper, interfaces).unwrap();
        let interface = tree.new_node(NodeData::element("interface"));
        tree.append_child(interfaces, interface).unwrap();
        let name = tree.new_node(NodeData::leaf("name", "eth0".to_owned()));
        tree.append_child(interface, name).unwrap();

        let outcome = backend.op_edit_config(&tree, edit_op);
        assert!(matches!(outcome, RpcOutcome::Ok));

        let commit_rpc = tree.new_node(NodeData::element("commit"));
        let outcome = backend.op_commit(&tree, commit_rpc);
        assert!(matches!(outcome, RpcOutcome::Ok));

        match backend.op_get() {
            RpcOutcome::Data { tree, root } => {
                let rendered = XmlCodec.serialize(&tree, root).unwrap();
                assert!(rendered.contains("eth0"));
            }
            _ => panic!("expected data"),
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn locking_is_rejected_for_a_different_session() {
        let (mut backend, dir) = backend();
        let mut tree = Tree::new();
        let lock_rpc = tree.new_node(NodeData::element("lock"));

        assert!(matches!(
            backend.op_lock(SessionId(1), &tree, lock_rpc),
            RpcOutcome::Ok
        ));
        let outcome = backend.op_lock(SessionId(2), &tree, lock_rpc);
        match outcome {
            RpcOutcome::Errors(errors) => {
                assert_eq!(errors[0].error_tag, ErrorTag::LockDenied);
            }
            _ => panic!("expected lock-denied error"),
        }
        std::fs::remove_dir_all(dir).ok();
    }
}
