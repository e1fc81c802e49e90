// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module formats
//!
//! A format descriptor recognizes one packaging convention, extracts the
//! dependencies a source declares, and executes the source once those
//! dependencies are loaded. Descriptors are tried in registry order and the
//! first whose `detect` matches wins, unless the source names its format in
//! a leading string-literal hint (`"amd";`, `"cjs";`, `"global";`).

pub mod alias;
pub mod amd;
pub mod cjs;
pub mod global;

pub use alias::AliasFormat;
pub use amd::AmdFormat;
pub use cjs::CjsFormat;
pub use global::GlobalFormat;

use crate::config::ShimConfig;
use crate::error::{LoaderError, Result};
use crate::module_system::Loader;
use crate::pipeline::{dedupe, InstantiateHook, Instantiation, LoadRecord, Next, ResolvedDep};
use crate::runtime::{Namespace, Value};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static FORMAT_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*(/\*.*\*/)|(//[^\n]*))*(["']use strict["'];?)?["']([^'"]+)["'][;\n]"#)
        .expect("format hint regex")
});

/// The format named by a leading directive-prologue string, if any.
pub fn format_hint(source: &str) -> Option<&str> {
    FORMAT_HINT
        .captures(source)
        .and_then(|caps| caps.get(5))
        .map(|m| m.as_str())
}

/// One packaging convention.
pub trait FormatDescriptor: Send + Sync {
    /// Short id used in hints and configuration
    fn id(&self) -> &str;

    /// Whether `load` looks like this format.
    fn detect(&self, load: &LoadRecord) -> bool;

    /// The raw dependency names `load` declares.
    fn extract_deps(&self, loader: &Loader, load: &mut LoadRecord) -> Result<Vec<String>>;

    /// Run the module body and return its raw exported value.
    ///
    /// `deps` are in the order `extract_deps` returned them, after
    /// de-duplication.
    fn execute(&self, loader: &Loader, deps: &[ResolvedDep], load: &LoadRecord) -> Result<Value>;
}

/// Registered formats plus the order detection tries them in.
pub struct FormatRegistry {
    formats: Vec<Arc<dyn FormatDescriptor>>,
    order: Vec<usize>,
}

impl FormatRegistry {
    /// The built-in formats, `custom` ones ahead of the global fallback,
    /// optionally restricted and reordered by `order`.
    pub fn with_defaults(
        shims: BTreeMap<String, ShimConfig>,
        custom: Vec<Arc<dyn FormatDescriptor>>,
        order: &[String],
    ) -> Result<Self> {
        let mut formats: Vec<Arc<dyn FormatDescriptor>> = vec![
            Arc::new(AliasFormat),
            Arc::new(AmdFormat),
            Arc::new(CjsFormat),
        ];
        formats.extend(custom);
        formats.push(Arc::new(GlobalFormat::new(shims)));
        Self::new(formats, order)
    }

    /// A registry over exactly `formats`.
    ///
    /// An empty `order` tries every format in registration order; otherwise
    /// only the listed ids are tried. The always-matching global format may
    /// only be listed last.
    pub fn new(formats: Vec<Arc<dyn FormatDescriptor>>, order: &[String]) -> Result<Self> {
        let order = if order.is_empty() {
            (0..formats.len()).collect()
        } else {
            let mut positions = Vec::with_capacity(order.len());
            for id in order {
                let position = formats
                    .iter()
                    .position(|f| f.id() == id)
                    .ok_or_else(|| LoaderError::Config(format!("unknown format '{id}'")))?;
                if !positions.contains(&position) {
                    positions.push(position);
                }
            }
            positions
        };

        let registry = Self { formats, order };
        if let Some(at) = registry.ids().iter().position(|id| id == GlobalFormat::ID) {
            if at + 1 != registry.order.len() {
                return Err(LoaderError::Config(
                    "the global format matches every source and must be listed last".into(),
                ));
            }
        }
        Ok(registry)
    }

    /// A registered format by id, whether or not detection tries it
    pub fn get(&self, id: &str) -> Option<&Arc<dyn FormatDescriptor>> {
        self.formats.iter().find(|f| f.id() == id)
    }

    /// Ids in detection order
    pub fn ids(&self) -> Vec<String> {
        self.detection_order().map(|f| f.id().to_string()).collect()
    }

    /// The first format whose detection matches `load`
    pub fn detect(&self, load: &LoadRecord) -> Option<&Arc<dyn FormatDescriptor>> {
        self.detection_order().find(|f| f.detect(load))
    }

    fn detection_order(&self) -> impl Iterator<Item = &Arc<dyn FormatDescriptor>> {
        self.order.iter().map(|&i| &self.formats[i])
    }
}

/// Base instantiate: picks a format and wraps its execution.
pub struct FormatInstantiate {
    formats: Arc<FormatRegistry>,
    shims: BTreeMap<String, ShimConfig>,
}

impl FormatInstantiate {
    /// Instantiate against `formats`; shimmed names are forced to global.
    pub fn new(formats: Arc<FormatRegistry>, shims: BTreeMap<String, ShimConfig>) -> Self {
        Self { formats, shims }
    }

    fn resolve(&self, load: &mut LoadRecord) -> Result<Arc<dyn FormatDescriptor>> {
        let mut format = load.metadata.format.clone();
        if format.is_none() {
            format = format_hint(&load.source).map(str::to_string);
        }

        // ES syntax is claimed before any other format
        if format.is_none() || format.as_deref() == Some(AliasFormat::ID) {
            if let Some(alias) = self.formats.get(AliasFormat::ID) {
                if format.is_some() || alias.detect(load) {
                    return Ok(alias.clone());
                }
            }
        }

        if self.shims.contains_key(&load.name) {
            format = Some(GlobalFormat::ID.to_string());
        }

        if let Some(id) = format.as_deref() {
            match self.formats.get(id) {
                Some(found) => return Ok(found.clone()),
                None => warn!(module = %load.name, format = id, "Unknown format, detecting instead"),
            }
        }

        self.formats
            .detect(load)
            .cloned()
            .ok_or_else(|| LoaderError::Format {
                name: load.name.clone(),
                address: load.address.clone(),
            })
    }
}

#[async_trait]
impl InstantiateHook for FormatInstantiate {
    async fn instantiate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        _next: Next<'_, dyn InstantiateHook>,
    ) -> Result<Instantiation> {
        let format = self.resolve(load)?;
        load.metadata.format = Some(format.id().to_string());
        debug!(module = %load.name, format = format.id(), "Format detected");

        let deps = dedupe(format.extract_deps(loader, load)?);
        load.metadata.deps = deps.clone();

        let load = load.clone();
        Ok(Instantiation::new(deps, move |loader, resolved| {
            let raw = format.execute(loader, resolved, &load)?;
            Ok(Namespace::from_value(raw))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(source: &str) -> LoadRecord {
        let mut load = LoadRecord::new("m");
        load.address = "m.js".into();
        load.source = source.into();
        load
    }

    fn registry(order: &[&str]) -> Result<FormatRegistry> {
        let order: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        FormatRegistry::with_defaults(BTreeMap::new(), Vec::new(), &order)
    }

    #[test]
    fn test_format_hint() {
        assert_eq!(format_hint("\"amd\";\ndefine([], 1)"), Some("amd"));
        assert_eq!(format_hint("'use strict';\n'cjs';\n"), Some("cjs"));
        assert_eq!(format_hint("// header\n\"global\";\nwindow.x = 1"), Some("global"));
        assert_eq!(format_hint("var x = 'amd';"), None);
    }

    #[test]
    fn test_default_order() {
        let registry = registry(&[]).unwrap();
        assert_eq!(registry.ids(), vec!["es6", "amd", "cjs", "global"]);
    }

    #[test]
    fn test_first_registered_match_wins() {
        let source = "define(['dep'], function (dep) { return dep; });\nmodule.exports = 1;";

        let amd_first = registry(&[]).unwrap();
        assert_eq!(amd_first.detect(&load(source)).unwrap().id(), "amd");

        let cjs_first = registry(&["cjs", "amd", "global"]).unwrap();
        assert_eq!(cjs_first.detect(&load(source)).unwrap().id(), "cjs");
    }

    #[test]
    fn test_order_restricts_detection() {
        let registry = registry(&["amd"]).unwrap();
        assert!(registry.detect(&load("window.x = 1;")).is_none());
        assert!(registry.get("cjs").is_some());
    }

    #[test]
    fn test_order_validation() {
        assert!(matches!(registry(&["yaml"]), Err(LoaderError::Config(_))));
        assert!(matches!(registry(&["global", "amd"]), Err(LoaderError::Config(_))));
    }
}
