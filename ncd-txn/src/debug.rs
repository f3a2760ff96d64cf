//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span, trace, trace_span};

use crate::Phase;

#[derive(Debug)]
pub enum Debug<'a> {
    PhaseEnter(u64, Phase),
    PluginCallback(Phase, &'a str),
    DeltaComputed(u64, usize, usize, usize),
    Abort(u64, &'a str),
    Revert(u64, &'a str),
}

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::PhaseEnter(id, phase) => {
                debug_span!("transaction", %id)
                    .in_scope(|| debug!(?phase, "{}", self));
            }
            Debug::PluginCallback(phase, plugin) => {
                trace_span!("transaction")
                    .in_scope(|| trace!(?phase, %plugin, "{}", self));
            }
            Debug::DeltaComputed(id, deleted, added, changed) => {
                debug_span!("transaction", %id).in_scope(|| {
                    debug!(deleted, added, changed, "{}", self)
                });
            }
            Debug::Abort(id, reason) => {
                debug_span!("transaction", %id)
                    .in_scope(|| debug!(%reason, "{}", self));
            }
            Debug::Revert(id, plugin) => {
                debug_span!("transaction", %id)
                    .in_scope(|| debug!(%plugin, "{}", self));
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PhaseEnter(..) => write!(f, "entering commit phase"),
            Debug::PluginCallback(..) => write!(f, "invoking plugin callback"),
            Debug::DeltaComputed(..) => write!(f, "computed src/tgt delta"),
            Debug::Abort(..) => write!(f, "aborting transaction"),
            Debug::Revert(..) => write!(f, "reverting committed plugin"),
        }
    }
}
