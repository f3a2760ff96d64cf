//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Client-facing listeners. Each accepted connection gets its own task that
//! talks to the single [`crate::backend::Backend`] task through a
//! [`crate::backend::BackendHandle`]; nothing in here ever touches the
//! datastore directly.

pub mod ipc;
pub mod netconf;

use std::sync::atomic::{AtomicU32, Ordering};

/// Session ids are shared across every frontend: the datastore's lock
/// table and pagination cursors are keyed by a single `u32` namespace
/// regardless of whether the peer came in over IPC or NETCONF.
pub struct SessionIds(AtomicU32);

impl SessionIds {
    pub fn new() -> Self {
        SessionIds(AtomicU32::new(1))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SessionIds {
    fn default() -> Self {
        SessionIds::new()
    }
}
