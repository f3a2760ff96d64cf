//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt;

#[derive(Debug)]
pub enum Error {
    // A schema path did not resolve to any node.
    NodeNotFound(String),
    // A value failed to validate against the leaf's declared type.
    TypeMismatch { path: String, expected: &'static str },
    // A mandatory leaf or list key was absent from a subtree being
    // validated.
    MissingMandatory(String),
    // A name collision occurred while building the schema (duplicate child
    // under the same parent).
    DuplicateNode(String),
    // An `if-feature` condition referenced a feature that was never
    // declared on the context.
    UnknownFeature(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NodeNotFound(path) => {
                write!(f, "schema node not found: {}", path)
            }
            Error::TypeMismatch { path, expected } => {
                write!(f, "type mismatch at {}: expected {}", path, expected)
            }
            Error::MissingMandatory(path) => {
                write!(f, "missing mandatory node: {}", path)
            }
            Error::DuplicateNode(path) => {
                write!(f, "duplicate schema node: {}", path)
            }
            Error::UnknownFeature(name) => {
                write!(f, "unknown feature: {}", name)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
