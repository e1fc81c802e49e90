// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Pipeline extensions
//!
//! Each extension installs hooks around the base behavior. They are
//! installed in a fixed order by [`LoaderBuilder`](crate::LoaderBuilder),
//! after which user extensions wrap all of them.

pub mod bundles;
pub mod map;
pub mod plugins;
pub mod register;
pub mod versions;

pub use bundles::{BundleExtension, BundleTable};
pub use map::{MapExtension, MapTable};
pub use plugins::PluginExtension;
pub use register::{Definition, DefinitionTable, RegisterExtension};
pub use versions::{VersionExtension, VersionTable};
