//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt;

#[derive(Debug)]
pub enum Error {
    NotFound(String),
    AlreadyExists(String),
    LockedByOther { name: String, session: u32 },
    NotLocked(String),
    Io(std::io::Error),
    Codec(ncd_codec::Error),
    Tree(ncd_tree::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(name) => write!(f, "no such datastore: {}", name),
            Error::AlreadyExists(name) => {
                write!(f, "datastore already exists: {}", name)
            }
            Error::LockedByOther { name, session } => write!(
                f,
                "datastore {} is locked by session {}",
                name, session
            ),
            Error::NotLocked(name) => {
                write!(f, "datastore {} is not locked", name)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Codec(e) => write!(f, "{}", e),
            Error::Tree(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ncd_codec::Error> for Error {
    fn from(e: ncd_codec::Error) -> Self {
        Error::Codec(e)
    }
}

impl From<ncd_tree::Error> for Error {
    fn from(e: ncd_tree::Error) -> Self {
        Error::Tree(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
