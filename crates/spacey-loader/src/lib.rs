// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! A dynamic module loader for JavaScript modules written in AMD, CommonJS,
//! or plain global-script style, with ES module alias files.
//!
//! ## Overview
//!
//! Every load passes through a pipeline of hooks:
//! - normalize: resolve a requested name against its parent
//! - locate: turn a normalized name into an address
//! - fetch: read the source at that address
//! - translate: rewrite the source before instantiation
//! - instantiate: detect the format and produce dependencies plus a body
//!
//! Extensions wrap these hooks to add identifier mapping, semver version
//! resolution, `name!plugin` loaders, bundles and predefined modules.
//! Scripts themselves run in a [`ScriptHost`] supplied by the embedder.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{LoaderBuilder, LoaderConfig, MemoryFetcher};
//!
//! let fetcher = MemoryFetcher::new().with("app.js", "module.exports = 42;");
//! let loader = LoaderBuilder::new(my_host, fetcher)
//!     .config(LoaderConfig::load(None)?)
//!     .build()?;
//! let app = loader.load("app").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod extensions;
pub mod fetch;
pub mod formats;
pub mod module_system;
pub mod pipeline;
pub mod runtime;

pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use fetch::{Fetch, FsFetcher, MemoryFetcher};
pub use formats::FormatDescriptor;
pub use module_system::{Loader, LoaderBuilder, ModuleRecord, Status};
pub use pipeline::{Extension, LoadRecord, Pipeline};
pub use runtime::{Namespace, ObjectRef, Scope, Script, ScriptHost, Value};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
