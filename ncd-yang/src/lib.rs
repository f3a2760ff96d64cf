//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Schema context contracts for the configuration engine.
//!
//! This crate does not parse `.yang` files. It defines the query surface the
//! core needs (node lookup, type validation, default insertion, feature
//! queries, RPC input/output schemas) and a small in-memory builder used by
//! the daemon's startup self-test and by the test suite to construct a
//! `SchemaContext` without a real YANG compiler.

pub mod error;
pub mod schema;

use std::borrow::Cow;

pub use error::Error;
pub use schema::{
    SchemaBuilder, SchemaContext, SchemaNode, SchemaNodeId, SchemaNodeKind,
    SchemaType,
};

// YANG conversion traits, kept independent of any particular schema
// implementation so callback code can convert to/from YANG identity and enum
// literals without depending on the compiler crate that is out of scope here.

pub trait ToYang {
    // Return YANG textual representation of the value.
    fn to_yang(&self) -> Cow<'static, str>;
}

pub trait ToYangBits {
    // Return vector representing YANG bit set.
    fn to_yang_bits(&self) -> Vec<&'static str>;
}

pub trait TryFromYang: Sized {
    // Construct value from YANG identity or enum value.
    fn try_from_yang(identity: &str) -> Option<Self>;
}

// A YANG schema node path, interned as a `&'static str` by callers that build
// paths at compile time (mirrors the common pattern of generated path
// constants, except here the constants are hand-written).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct YangPath(&'static str);

impl YangPath {
    pub const fn new(path: &'static str) -> YangPath {
        YangPath(path)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for YangPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for YangPath {
    fn as_ref(&self) -> &str {
        self.0
    }
}
