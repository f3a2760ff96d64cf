//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt;

#[derive(Debug)]
pub enum Error {
    Xml(xml::reader::Error),
    XmlWrite(xml::writer::Error),
    Json(serde_json::Error),
    // The document had no root element, or had more than one.
    MalformedDocument(String),
    Tree(ncd_tree::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Xml(e) => write!(f, "XML parse error: {}", e),
            Error::XmlWrite(e) => write!(f, "XML write error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::MalformedDocument(reason) => {
                write!(f, "malformed document: {}", reason)
            }
            Error::Tree(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<xml::reader::Error> for Error {
    fn from(e: xml::reader::Error) -> Self {
        Error::Xml(e)
    }
}

impl From<xml::writer::Error> for Error {
    fn from(e: xml::writer::Error) -> Self {
        Error::XmlWrite(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<ncd_tree::Error> for Error {
    fn from(e: ncd_tree::Error) -> Self {
        Error::Tree(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
