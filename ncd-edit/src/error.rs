//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt;

#[derive(Debug)]
pub enum Error {
    // `operation="create"` targeted a node that already exists.
    DataExists(String),
    // `operation="delete"` targeted a node that does not exist.
    DataMissing(String),
    // An `operation` attribute's value was not one of the six NETCONF
    // edit operations.
    BadOperation(String),
    Tree(ncd_tree::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DataExists(path) => write!(f, "data already exists: {}", path),
            Error::DataMissing(path) => write!(f, "data does not exist: {}", path),
            Error::BadOperation(value) => {
                write!(f, "unknown edit operation: {}", value)
            }
            Error::Tree(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ncd_tree::Error> for Error {
    fn from(e: ncd_tree::Error) -> Self {
        Error::Tree(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
