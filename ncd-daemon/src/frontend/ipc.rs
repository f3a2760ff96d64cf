//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The `CLICON_SOCK` listener: external management clients (a CLI tool, a
//! RESTCONF gateway running as its own process) reach the backend the same
//! way the NETCONF frontend does, just framed per [`ncd_ipc`] instead of
//! RFC 6242.

use std::sync::Arc;

use ncd_codec::Codec;
use ncd_codec::xml::XmlCodec;
use ncd_datastore::SessionId;
use ncd_ipc::{Channel, ChannelError, Transport};
use ncd_netconf::RpcError;
use ncd_tree::{NodeData, Tree};
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use crate::backend::{BackendHandle, RpcOutcome};
use crate::config::SockFamily;
use crate::frontend::SessionIds;

pub enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

pub async fn bind(family: SockFamily, sock: &str) -> std::io::Result<Listener> {
    match family {
        SockFamily::Unix => {
            let _ = std::fs::remove_file(sock);
            Ok(Listener::Unix(UnixListener::bind(sock)?))
        }
        SockFamily::Ipv4 | SockFamily::Ipv6 => {
            Ok(Listener::Tcp(TcpListener::bind(sock).await?))
        }
    }
}

pub async fn serve(listener: Listener, backend: BackendHandle, session_ids: Arc<SessionIds>) {
    loop {
        let transport = match &listener {
            Listener::Unix(l) => match l.accept().await {
                Ok((stream, _)) => Transport::Unix(stream),
                Err(error) => {
                    warn!(%error, "ipc accept failed");
                    continue;
                }
            },
            Listener::Tcp(l) => match l.accept().await {
                Ok((stream, _)) => Transport::Tcp(stream),
                Err(error) => {
                    warn!(%error, "ipc accept failed");
                    continue;
                }
            },
        };

        let session = SessionId(session_ids.next());
        let backend = backend.clone();
        tokio::spawn(async move {
            info!(session = session.0, "ipc session connected");
            backend.connect(session);
            if let Err(error) = handle_connection(transport, session, &backend).await {
                warn!(session = session.0, %error, "ipc session ended with an error");
            }
            backend.disconnect(session);
            info!(session = session.0, "ipc session closed");
        });
    }
}

async fn handle_connection(
    transport: Transport,
    session: SessionId,
    backend: &BackendHandle,
) -> Result<(), ChannelError> {
    let mut channel = Channel::new(transport);
    while let Some(message) = channel.recv().await? {
        let mut tree = Tree::new();
        let body = String::from_utf8_lossy(&message.body);
        let root = match XmlCodec.parse(&mut tree, &body) {
            Ok(root) => root,
            Err(error) => {
                warn!(session = session.0, %error, "malformed ipc request body");
                let reply = render_errors(&[RpcError::new(
                    ncd_netconf::ErrorType::Rpc,
                    ncd_netconf::ErrorTag::MalformedMessage,
                )
                .with_message(error.to_string())]);
                channel.send(message.op_id, reply.as_bytes()).await?;
                continue;
            }
        };
        let Some(operation) = tree.children(root).ok().and_then(|mut c| c.next()) else {
            continue;
        };

        let outcome = backend.call(session, tree, operation).await;
        let closing = matches!(outcome, RpcOutcome::CloseSession);
        let reply = render_outcome(outcome);
        channel.send(message.op_id, reply.as_bytes()).await?;
        if closing {
            break;
        }
    }
    Ok(())
}

fn render_outcome(outcome: RpcOutcome) -> String {
    match outcome {
        RpcOutcome::Ok | RpcOutcome::CloseSession => "<ok/>".to_owned(),
        RpcOutcome::Data { tree, root } => {
            XmlCodec.serialize(&tree, root).unwrap_or_default()
        }
        RpcOutcome::Errors(errors) => render_errors(&errors),
    }
}

fn render_errors(errors: &[RpcError]) -> String {
    let mut tree = Tree::new();
    let root = tree.new_node(NodeData::element("rpc-reply"));
    for error in errors {
        let _ = error.append_to(&mut tree, root);
    }
    XmlCodec.serialize(&tree, root).unwrap_or_default()
}
