//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Hello negotiation and `<rpc>`/`<rpc-reply>` handling.
//!
//! A session starts `AwaitingHello`. The first frame it receives must be a
//! `<hello>`; anything else is a protocol violation and the connection is
//! closed without a reply, per RFC 6241 §8.1. Once capabilities are
//! exchanged the session moves to `Negotiated` and every subsequent frame
//! must be an `<rpc>`, replied to with a matching `<rpc-reply>`.

use std::fmt;

use ncd_tree::{NodeData, NodeId, Tree};

const CAP_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
const CAP_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHello,
    Negotiated,
    Closed,
}

/// A capability URI, compared by base prefix so parameterized capabilities
/// (`...?module=foo&revision=...`) still match their unparameterized base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability(pub String);

impl Capability {
    pub fn base(&self) -> &str {
        self.0.split('?').next().unwrap_or(&self.0)
    }
}

#[derive(Debug)]
pub enum DispatchError {
    // A frame other than `<hello>` arrived before negotiation completed.
    HelloRequired,
    // `<hello>` arrived after negotiation already completed.
    UnexpectedHello,
    // Neither `base:1.0` nor `base:1.1` was offered by the peer.
    NoCommonBaseCapability,
    Tree(ncd_tree::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::HelloRequired => {
                write!(f, "expected <hello> before any other message")
            }
            DispatchError::UnexpectedHello => {
                write!(f, "<hello> received after negotiation")
            }
            DispatchError::NoCommonBaseCapability => {
                write!(f, "peer advertised no common base capability")
            }
            DispatchError::Tree(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<ncd_tree::Error> for DispatchError {
    fn from(e: ncd_tree::Error) -> Self {
        DispatchError::Tree(e)
    }
}

pub struct Dispatcher {
    state: SessionState,
    local_capabilities: Vec<Capability>,
    peer_capabilities: Vec<Capability>,
    session_id: u32,
}

impl Dispatcher {
    pub fn new(session_id: u32) -> Self {
        Dispatcher {
            state: SessionState::AwaitingHello,
            local_capabilities: vec![
                Capability(CAP_BASE_1_0.to_owned()),
                Capability(CAP_BASE_1_1.to_owned()),
            ],
            peer_capabilities: Vec::new(),
            session_id,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    fn supports_1_1(&self) -> bool {
        self.peer_capabilities
            .iter()
            .any(|c| c.base() == CAP_BASE_1_1)
    }

    /// Processes an inbound `<hello>`. `tree`/`hello` hold the parsed
    /// document. Returns whether chunked (base:1.1) framing should now be
    /// used for subsequent messages.
    pub fn process_hello(
        &mut self,
        tree: &Tree,
        hello: NodeId,
    ) -> Result<bool, DispatchError> {
        if self.state != SessionState::AwaitingHello {
            return Err(DispatchError::UnexpectedHello);
        }
        let caps_node = tree.find_child_by_name(hello, "capabilities")?;
        let mut peer_capabilities = Vec::new();
        if let Some(caps_node) = caps_node {
            for cap in tree.children(caps_node)? {
                if let Some(value) = &tree.node(cap)?.value {
                    peer_capabilities.push(Capability(value.clone()));
                }
            }
        }
        let has_base = peer_capabilities
            .iter()
            .any(|c| c.base() == CAP_BASE_1_0 || c.base() == CAP_BASE_1_1);
        if !has_base {
            return Err(DispatchError::NoCommonBaseCapability);
        }
        self.peer_capabilities = peer_capabilities;
        self.state = SessionState::Negotiated;
        Ok(self.supports_1_1())
    }

    /// Builds an outbound `<hello>` document advertising the local
    /// capability set and this session's id.
    pub fn build_hello(&self, tree: &mut Tree) -> NodeId {
        let hello = tree.new_node(NodeData::element("hello"));
        let caps = tree.new_node(NodeData::element("capabilities"));
        tree.append_child(hello, caps).unwrap();
        for cap in &self.local_capabilities {
            let node = tree.new_node(NodeData::leaf("capability", cap.0.clone()));
            tree.append_child(caps, node).unwrap();
        }
        let session_id = tree.new_node(NodeData::leaf(
            "session-id",
            self.session_id.to_string(),
        ));
        tree.append_child(hello, session_id).unwrap();
        hello
    }

    /// Validates that a non-hello frame is allowed in the current state.
    pub fn check_rpc_allowed(&self) -> Result<(), DispatchError> {
        match self.state {
            SessionState::Negotiated => Ok(()),
            SessionState::AwaitingHello => Err(DispatchError::HelloRequired),
            SessionState::Closed => Err(DispatchError::HelloRequired),
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Forces negotiation to complete without an actual `<hello>` exchange,
    /// assuming only `base:1.0`. Used when `CLICON_NETCONF_HELLO_OPTIONAL` is
    /// set and a peer sends an `<rpc>` as its very first frame.
    pub fn accept_without_hello(&mut self) {
        self.peer_capabilities = vec![Capability(CAP_BASE_1_0.to_owned())];
        self.state = SessionState::Negotiated;
    }

    /// Builds an `<rpc-reply>` node, copying every attribute from the
    /// originating `<rpc>` element except ones the reply already sets
    /// itself (none, here: callers set none before calling this).
    pub fn build_reply_shell(
        &self,
        tree: &mut Tree,
        rpc: NodeId,
    ) -> Result<NodeId, DispatchError> {
        let rpc_attrs = tree.node(rpc)?.attributes.clone();
        let reply = tree.new_node(NodeData {
            name: "rpc-reply".to_owned(),
            namespace: None,
            value: None,
            attributes: rpc_attrs,
            schema: None,
        });
        Ok(reply)
    }
}

/// RFC 6241 `<rpc-error>` taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub error_tag: ErrorTag,
    pub error_severity: ErrorSeverity,
    pub error_app_tag: Option<String>,
    pub error_path: Option<String>,
    pub error_message: Option<String>,
    // Carries the session id of a lock's current holder, rendered as a
    // nested <error-info><session-id> element (RFC 6241 §13.1.3's
    // lock-denied example).
    pub error_info_session_id: Option<u32>,
}

impl RpcError {
    pub fn new(error_type: ErrorType, error_tag: ErrorTag) -> Self {
        RpcError {
            error_type,
            error_tag,
            error_severity: ErrorSeverity::Error,
            error_app_tag: None,
            error_path: None,
            error_message: None,
            error_info_session_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    pub fn with_session_id(mut self, session_id: u32) -> Self {
        self.error_info_session_id = Some(session_id);
        self
    }

    /// Appends this error's `<rpc-error>` element to `parent` (normally an
    /// `<rpc-reply>` built by `Dispatcher::build_reply_shell`).
    pub fn append_to(&self, tree: &mut Tree, parent: NodeId) -> Result<(), ncd_tree::Error> {
        let error = tree.new_node(NodeData::element("rpc-error"));
        tree.append_child(parent, error)?;

        let mut push_leaf = |name: &str, value: &str| -> Result<(), ncd_tree::Error> {
            let leaf = tree.new_node(NodeData::leaf(name, value));
            tree.append_child(error, leaf)
        };
        push_leaf("error-type", self.error_type.as_str())?;
        push_leaf("error-tag", self.error_tag.as_str())?;
        push_leaf("error-severity", self.error_severity.as_str())?;
        if let Some(path) = &self.error_path {
            push_leaf("error-path", path)?;
        }
        if let Some(message) = &self.error_message {
            push_leaf("error-message", message)?;
        }
        if let Some(session_id) = self.error_info_session_id {
            let info = tree.new_node(NodeData::element("error-info"));
            tree.append_child(error, info)?;
            let leaf = tree.new_node(NodeData::leaf("session-id", session_id.to_string()));
            tree.append_child(info, leaf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_before_rpc_is_enforced() {
        let dispatcher = Dispatcher::new(1);
        assert!(dispatcher.check_rpc_allowed().is_err());
    }

    #[test]
    fn negotiating_1_1_upgrades_framing() {
        let mut tree = Tree::new();
        let hello = tree.new_node(NodeData::element("hello"));
        tree.set_root(hello).unwrap();
        let caps = tree.new_node(NodeData::element("capabilities"));
        tree.append_child(hello, caps).unwrap();
        for cap in [CAP_BASE_1_0, CAP_BASE_1_1] {
            let node = tree.new_node(NodeData::leaf("capability", cap));
            tree.append_child(caps, node).unwrap();
        }

        let mut dispatcher = Dispatcher::new(42);
        let chunked = dispatcher.process_hello(&tree, hello).unwrap();
        assert!(chunked);
        assert_eq!(dispatcher.state(), SessionState::Negotiated);
        assert!(dispatcher.check_rpc_allowed().is_ok());
    }

    #[test]
    fn missing_base_capability_is_rejected() {
        let mut tree = Tree::new();
        let hello = tree.new_node(NodeData::element("hello"));
        tree.set_root(hello).unwrap();
        let caps = tree.new_node(NodeData::element("capabilities"));
        tree.append_child(hello, caps).unwrap();
        let node = tree.new_node(NodeData::leaf(
            "capability",
            "urn:ietf:params:netconf:capability:candidate:1.0",
        ));
        tree.append_child(caps, node).unwrap();

        let mut dispatcher = Dispatcher::new(1);
        assert!(dispatcher.process_hello(&tree, hello).is_err());
    }

    #[test]
    fn accept_without_hello_negotiates_base_1_0_only() {
        let mut dispatcher = Dispatcher::new(3);
        dispatcher.accept_without_hello();
        assert_eq!(dispatcher.state(), SessionState::Negotiated);
        assert!(dispatcher.check_rpc_allowed().is_ok());
        assert!(!dispatcher.supports_1_1());
    }

    #[test]
    fn lock_denied_carries_holder_session_id() {
        let mut tree = Tree::new();
        let reply = tree.new_node(NodeData::element("rpc-reply"));
        tree.set_root(reply).unwrap();

        let error = RpcError::new(ErrorType::Protocol, ErrorTag::LockDenied)
            .with_session_id(7);
        error.append_to(&mut tree, reply).unwrap();

        let error_node = tree.children(reply).unwrap().next().unwrap();
        let info = tree
            .find_child_by_name(error_node, "error-info")
            .unwrap()
            .unwrap();
        let session_id = tree.find_child_by_name(info, "session-id").unwrap().unwrap();
        assert_eq!(tree.node(session_id).unwrap().value.as_deref(), Some("7"));
    }

    #[test]
    fn reply_echoes_rpc_attributes() {
        let mut tree = Tree::new();
        let rpc = tree.new_node(NodeData {
            name: "rpc".to_owned(),
            namespace: None,
            value: None,
            attributes: vec![("message-id".to_string(), "101".to_string())],
            schema: None,
        });
        tree.set_root(rpc).unwrap();

        let dispatcher = Dispatcher::new(1);
        let reply = dispatcher.build_reply_shell(&mut tree, rpc).unwrap();
        assert_eq!(
            tree.node(reply).unwrap().attributes,
            vec![("message-id".to_string(), "101".to_string())]
        );
    }
}
