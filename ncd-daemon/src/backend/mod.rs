//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! The transactional core: a single task owning the datastore, the schema
//! context and the commit engine, reached by frontend connection tasks only
//! through [`BackendHandle`].

mod core;
mod db;
mod plugin;
mod rpc;

pub use self::core::Backend;
pub use rpc::{BackendHandle, BackendMsg, RpcOutcome};
