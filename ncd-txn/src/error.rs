//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// An error raised by a single plugin callback during one phase of a
/// commit. Carries the plugin's name so the engine's abort/revert log lines
/// can name the offender.
#[derive(Debug)]
pub struct PluginError {
    pub plugin: &'static str,
    pub reason: String,
}

impl PluginError {
    pub fn new(plugin: &'static str, reason: impl Into<String>) -> Self {
        PluginError {
            plugin,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plugin {} failed: {}", self.plugin, self.reason)
    }
}

impl std::error::Error for PluginError {}

#[derive(Debug)]
pub enum Error {
    Validate(PluginError),
    Complete(PluginError),
    Commit(PluginError),
    Tree(ncd_tree::Error),
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::Validate(e) => warn!(plugin = e.plugin, reason = %e.reason, "validation failed"),
            Error::Complete(e) => warn!(plugin = e.plugin, reason = %e.reason, "complete phase failed"),
            Error::Commit(e) => warn!(plugin = e.plugin, reason = %e.reason, "commit failed"),
            Error::Tree(e) => warn!(%e, "transaction tree error"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validate(e) => write!(f, "validation failed: {}", e),
            Error::Complete(e) => write!(f, "complete phase failed: {}", e),
            Error::Commit(e) => write!(f, "commit failed: {}", e),
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
