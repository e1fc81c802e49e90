// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module system
//!
//! The [`Loader`] owns the module registry and drives every load through
//! the hook pipeline:
//!
//! - concurrent requests for one name share a single in-flight load
//! - dependencies load concurrently and are injected in declaration order
//! - cyclic graphs resolve by handing the in-flight record to the partner

mod cache;
mod graph;
mod loader;

pub use cache::{ModuleRecord, ModuleRegistry, Status};
pub use loader::{Loader, LoaderBuilder, WeakLoader};
