//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod dispatcher;
pub mod framer;

pub use dispatcher::{
    Capability, Dispatcher, DispatchError, ErrorSeverity, ErrorTag, ErrorType,
    RpcError, SessionState,
};
pub use framer::{FrameDecoder, FrameMode, Framer, FramerError, FramerIoError};
