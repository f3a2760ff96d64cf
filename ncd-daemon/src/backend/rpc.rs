//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Message types carried across the `mpsc` channel that separates frontend
//! connection tasks (NETCONF, IPC) from the single backend task that owns
//! the datastore and the commit engine.

use ncd_datastore::SessionId;
use ncd_netconf::RpcError;
use ncd_tree::{NodeId, Tree};
use tokio::sync::{mpsc, oneshot};

/// One decoded `<rpc>` operation, still attached to the tree it was parsed
/// into. `operation` is the single child of `<rpc>` naming the operation
/// (`<get-config>`, `<edit-config>`, ...); `tree`/`operation` travel
/// together so the backend never has to reparse or re-serialize the
/// request to act on it.
pub struct RpcRequest {
    pub session: SessionId,
    pub tree: Tree,
    pub operation: NodeId,
    pub reply: oneshot::Sender<RpcResponse>,
}

pub struct RpcResponse {
    pub outcome: RpcOutcome,
}

/// What the backend decided to do with a request. `Data` carries its own
/// tree because the reply content (e.g. a `<get-config>` snapshot) is
/// synthesized fresh from datastore content rather than mutating the
/// request's tree.
pub enum RpcOutcome {
    Ok,
    Data { tree: Tree, root: NodeId },
    Errors(Vec<RpcError>),
    CloseSession,
}

pub enum BackendMsg {
    Connect(SessionId),
    Rpc(RpcRequest),
    Disconnect(SessionId),
}

/// A cheaply cloned handle frontend tasks use to talk to the single
/// backend task over its request queue.
#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::UnboundedSender<BackendMsg>,
}

impl BackendHandle {
    pub fn new(tx: mpsc::UnboundedSender<BackendMsg>) -> Self {
        BackendHandle { tx }
    }

    pub fn connect(&self, session: SessionId) {
        let _ = self.tx.send(BackendMsg::Connect(session));
    }

    pub fn disconnect(&self, session: SessionId) {
        let _ = self.tx.send(BackendMsg::Disconnect(session));
    }

    /// Submits one RPC and awaits its reply. A send or reply failure means
    /// the backend task is gone, which the caller treats as a fatal
    /// `operation-failed`.
    pub async fn call(
        &self,
        session: SessionId,
        tree: Tree,
        operation: NodeId,
    ) -> RpcOutcome {
        let (reply, reply_rx) = oneshot::channel();
        let request = RpcRequest {
            session,
            tree,
            operation,
            reply,
        };
        if self.tx.send(BackendMsg::Rpc(request)).is_err() {
            return RpcOutcome::Errors(vec![backend_gone_error()]);
        }
        match reply_rx.await {
            Ok(response) => response.outcome,
            Err(_) => RpcOutcome::Errors(vec![backend_gone_error()]),
        }
    }
}

fn backend_gone_error() -> RpcError {
    use ncd_netconf::{ErrorTag, ErrorType};
    RpcError::new(ErrorType::Application, ErrorTag::OperationFailed)
        .with_message("backend is no longer running")
}
