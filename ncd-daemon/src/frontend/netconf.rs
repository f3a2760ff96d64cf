//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! NETCONF over a raw TCP listener (`netconf_listen`). Production clixon
//! exposes NETCONF through an SSH subsystem; handing that off to a real SSH
//! daemon is out of scope here, so this talks NETCONF directly over TCP,
//! which is also how `CLICON_NETCONF_HELLO_OPTIONAL` test setups commonly
//! reach the backend.

use std::fmt;
use std::sync::Arc;

use ncd_codec::Codec;
use ncd_codec::xml::XmlCodec;
use ncd_datastore::SessionId;
use ncd_netconf::{
    DispatchError, Dispatcher, ErrorTag, ErrorType, FrameMode, Framer, FramerIoError, RpcError,
};
use ncd_tree::{NodeData, NodeId, Tree};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::backend::{BackendHandle, RpcOutcome};
use crate::frontend::SessionIds;

#[derive(Debug)]
enum SessionError {
    Io(FramerIoError),
    Tree(ncd_tree::Error),
    Codec(ncd_codec::Error),
    Dispatch(DispatchError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "{}", e),
            SessionError::Tree(e) => write!(f, "{}", e),
            SessionError::Codec(e) => write!(f, "{}", e),
            SessionError::Dispatch(e) => write!(f, "{}", e),
        }
    }
}

impl From<FramerIoError> for SessionError {
    fn from(e: FramerIoError) -> Self {
        SessionError::Io(e)
    }
}

impl From<ncd_tree::Error> for SessionError {
    fn from(e: ncd_tree::Error) -> Self {
        SessionError::Tree(e)
    }
}

impl From<ncd_codec::Error> for SessionError {
    fn from(e: ncd_codec::Error) -> Self {
        SessionError::Codec(e)
    }
}

impl From<DispatchError> for SessionError {
    fn from(e: DispatchError) -> Self {
        SessionError::Dispatch(e)
    }
}

pub async fn serve(
    listener: TcpListener,
    backend: BackendHandle,
    session_ids: Arc<SessionIds>,
    hello_optional: bool,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(error) => {
                warn!(%error, "netconf accept failed");
                continue;
            }
        };

        let session = SessionId(session_ids.next());
        let backend = backend.clone();
        tokio::spawn(async move {
            info!(session = session.0, %peer, "netconf session connected");
            backend.connect(session);
            if let Err(error) = handle_session(stream, session, &backend, hello_optional).await {
                warn!(session = session.0, %error, "netconf session ended with an error");
            }
            backend.disconnect(session);
            info!(session = session.0, "netconf session closed");
        });
    }
}

async fn handle_session(
    stream: TcpStream,
    session: SessionId,
    backend: &BackendHandle,
    hello_optional: bool,
) -> Result<(), SessionError> {
    let mut framer = Framer::new(stream, FrameMode::Eom);
    let mut dispatcher = Dispatcher::new(session.0);

    let Some(first) = framer.read_message().await? else {
        return Ok(());
    };

    if !is_hello(&first) {
        if hello_optional {
            // With hello exchange optional, a peer's very first frame may
            // already be an <rpc>; negotiate base:1.0-only and handle it as
            // the first request instead of expecting a <hello>.
            dispatcher.accept_without_hello();
            if handle_frame(&first, &mut framer, backend, session).await? {
                return Ok(());
            }
        } else {
            warn!(session = session.0, "rpc received before hello, closing session");
            send_hello_required_error(&first, &mut framer).await?;
            return Ok(());
        }
    } else {
        let mut tree = Tree::new();
        let hello = XmlCodec.parse(&mut tree, &String::from_utf8_lossy(&first))?;
        let chunked = dispatcher.process_hello(&tree, hello)?;

        let mut reply_tree = Tree::new();
        let reply_hello = dispatcher.build_hello(&mut reply_tree);
        let body = XmlCodec.serialize(&reply_tree, reply_hello)?;
        framer.write_message(body.as_bytes()).await?;

        // Switch framing only after the hello reply itself has gone out:
        // RFC 6242 §4.1 has base:1.1 peers switch immediately after
        // sending or receiving the closing </hello>, so the hello
        // exchange always stays EOM-framed and only what follows it uses
        // chunked framing.
        if chunked {
            framer.set_mode(FrameMode::Chunked);
        }
    }

    while let Some(frame) = framer.read_message().await? {
        if dispatcher.check_rpc_allowed().is_err() {
            warn!(session = session.0, "rpc received before hello negotiated");
            break;
        }
        if handle_frame(&frame, &mut framer, backend, session).await? {
            break;
        }
    }
    Ok(())
}

/// Parses and dispatches one `<rpc>` frame, writing its `<rpc-reply>`.
/// Returns whether the session should now close (a `<close-session>` reply
/// was sent).
async fn handle_frame(
    frame: &[u8],
    framer: &mut Framer<TcpStream>,
    backend: &BackendHandle,
    session: SessionId,
) -> Result<bool, SessionError> {
    let mut tree = Tree::new();
    let rpc = match XmlCodec.parse(&mut tree, &String::from_utf8_lossy(frame)) {
        Ok(rpc) => rpc,
        Err(error) => {
            warn!(session = session.0, %error, "malformed <rpc>");
            return Ok(false);
        }
    };
    // Captured before `tree` moves into the backend call, so the reply can
    // still echo the request's message-id attribute.
    let rpc_attrs = tree.node(rpc).map(|d| d.attributes.clone()).unwrap_or_default();
    let Some(operation) = tree.children(rpc)?.next() else {
        warn!(session = session.0, "<rpc> has no operation element");
        return Ok(false);
    };

    let outcome = backend.call(session, tree, operation).await;
    let close = matches!(outcome, RpcOutcome::CloseSession);

    let mut reply_tree = Tree::new();
    let reply = reply_tree.new_node(NodeData {
        name: "rpc-reply".to_owned(),
        namespace: None,
        value: None,
        attributes: rpc_attrs,
        schema: None,
    });
    apply_outcome(&mut reply_tree, reply, outcome)?;

    let body = XmlCodec.serialize(&reply_tree, reply)?;
    framer.write_message(body.as_bytes()).await?;
    Ok(close)
}

fn apply_outcome(tree: &mut Tree, reply: NodeId, outcome: RpcOutcome) -> Result<(), SessionError> {
    match outcome {
        RpcOutcome::Ok | RpcOutcome::CloseSession => {
            let ok = tree.new_node(NodeData::element("ok"));
            tree.append_child(reply, ok)?;
        }
        RpcOutcome::Data {
            tree: data_tree,
            root,
        } => {
            let copied = tree.copy_subtree_from(&data_tree, root)?;
            tree.append_child(reply, copied)?;
        }
        RpcOutcome::Errors(errors) => {
            for error in &errors {
                error.append_to(tree, reply)?;
            }
        }
    }
    Ok(())
}

fn is_hello(frame: &[u8]) -> bool {
    String::from_utf8_lossy(frame).trim_start().starts_with("<hello")
}

/// Replies to a peer's very first frame with the fixed `operation-failed`
/// error required when it sends an `<rpc>` before any `<hello>`, echoing
/// the request's attributes (notably `message-id`) when the frame parses
/// as an element at all.
async fn send_hello_required_error(
    frame: &[u8],
    framer: &mut Framer<TcpStream>,
) -> Result<(), SessionError> {
    let mut request_tree = Tree::new();
    let request_attrs = XmlCodec
        .parse(&mut request_tree, &String::from_utf8_lossy(frame))
        .ok()
        .and_then(|root| request_tree.node(root).ok().map(|d| d.attributes.clone()))
        .unwrap_or_default();

    let mut reply_tree = Tree::new();
    let reply = reply_tree.new_node(NodeData {
        name: "rpc-reply".to_owned(),
        namespace: None,
        value: None,
        attributes: request_attrs,
        schema: None,
    });
    let error = RpcError::new(ErrorType::Protocol, ErrorTag::OperationFailed)
        .with_message("Client must send an hello element before any RPC");
    error.append_to(&mut reply_tree, reply)?;

    let body = XmlCodec.serialize(&reply_tree, reply)?;
    framer.write_message(body.as_bytes()).await?;
    Ok(())
}
