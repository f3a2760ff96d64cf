//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt;

#[derive(Debug)]
pub enum Error {
    // A `NodeId` referred to a slot that was never allocated or has since
    // been freed and possibly reused under a different generation.
    StaleNode,
    // `append_child` was called with a child that already has a parent.
    AlreadyAttached,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StaleNode => write!(f, "stale or invalid node id"),
            Error::AlreadyAttached => write!(f, "node is already attached to a parent"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
