// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use std::sync::Arc;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while loading a module graph.
///
/// Errors are `Clone` so a single failure can be handed to every request
/// that collapsed onto the same in-flight load.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// Normalize could not produce a canonical name
    #[error("Error resolving module '{name}': {reason}")]
    Resolution {
        /// Requested identifier
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// Locate could not produce an address
    #[error("Unable to locate module '{name}': {reason}")]
    Locate {
        /// Normalized module name
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// The resource behind an address is unavailable
    #[error("Unable to fetch '{address}' for module '{name}': {reason}")]
    Fetch {
        /// Normalized module name
        name: String,
        /// Address that failed
        address: String,
        /// Reason for failure
        reason: String,
    },

    /// No format descriptor matched and the source carries no hint
    #[error("No format found for '{address}'")]
    Format {
        /// Normalized module name
        name: String,
        /// Resolved address of the source
        address: String,
    },

    /// An anonymous definition was registered more than once in one load
    #[error("Multiple anonymous defines for module '{0}'")]
    DefinitionConflict(String),

    /// A plugin hook rejected
    #[error("Plugin '{plugin}' failed for '{name}': {reason}")]
    Plugin {
        /// Normalized plugin module name
        plugin: String,
        /// Module the plugin was handling
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// The script host failed while running a module body
    #[error("Error executing module '{name}': {reason}")]
    Execution {
        /// Module being executed
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// A native binding was called with arguments of the wrong shape
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A module was required synchronously before it finished loading
    #[error("Module '{0}' has not been loaded")]
    NotLoaded(String),

    /// A dependency failed; `source` is the original failure
    #[error("Error loading '{dependency}' as a dependency of '{parent}'")]
    Dependency {
        /// Module that requested the dependency
        parent: String,
        /// Requested dependency name
        dependency: String,
        /// The failure that travelled along this edge
        #[source]
        source: Arc<LoaderError>,
    },

    /// Invalid loader configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error outside of a module fetch
    #[error("I/O error: {0}")]
    Io(String),
}

impl LoaderError {
    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create an execution error for a module
    pub fn execution(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Execution {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a resolution error
    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap this error as having travelled along a dependency edge
    pub fn along_edge(self, parent: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::Dependency {
            parent: parent.into(),
            dependency: dependency.into(),
            source: Arc::new(self),
        }
    }

    /// The innermost error, following dependency edges
    pub fn root_cause(&self) -> &LoaderError {
        match self {
            Self::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        LoaderError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(err: toml::de::Error) -> Self {
        LoaderError::Config(err.to_string())
    }
}
