// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-module scratch state threaded through one pipeline pass.

use crate::error::Result;
use crate::formats::amd::AmdMetadata;
use crate::module_system::{Loader, ModuleRecord};
use crate::runtime::{Namespace, ObjectRef, Value};
use std::fmt;
use std::sync::Arc;

/// Facts derived by one stage for the benefit of later stages.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Format id, once known
    pub format: Option<String>,
    /// Raw dependency names as extracted from the source
    pub deps: Vec<String>,
    /// The plugin handling this module
    pub plugin: Option<PluginRef>,
    /// Whether this module is a bundle
    pub bundle: bool,
    /// Dotted global path holding a global-script module's value
    pub global_export: Option<String>,
    /// AMD definition details
    pub amd: Option<AmdMetadata>,
    /// Free-form values for plugins and custom hooks
    pub extra: ObjectRef,
}

/// A loaded plugin attached to a load.
#[derive(Debug, Clone)]
pub struct PluginRef {
    /// Normalized plugin module name
    pub name: String,
    /// The argument part of `argument!plugin`
    pub argument: String,
    /// The plugin module's exported value
    pub value: Value,
}

/// The mutable record of one module's pass through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct LoadRecord {
    /// Normalized name
    pub name: String,
    /// Located address
    pub address: String,
    /// Fetched (then translated) source
    pub source: String,
    /// Derived facts
    pub metadata: Metadata,
}

impl LoadRecord {
    /// A fresh record for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The record as a script object, for plugin hooks.
    pub fn to_value(&self) -> Value {
        let metadata = self.metadata.extra.clone();
        if let Some(format) = &self.metadata.format {
            metadata.set("format", Value::string(format.as_str()));
        }
        if let Some(export) = &self.metadata.global_export {
            metadata.set("exports", Value::string(export.as_str()));
        }
        Value::object([
            ("name", Value::string(self.name.as_str())),
            ("address", Value::string(self.address.as_str())),
            ("source", Value::string(self.source.as_str())),
            ("metadata", Value::Object(metadata)),
        ])
    }

    /// Take back what a hook wrote to a load object from [`Self::to_value`].
    pub fn absorb_metadata(&mut self, value: &Value) {
        let metadata = value.get("metadata");
        if let Some(object) = metadata.as_object() {
            self.metadata.extra = object.clone();
        }
        if let Some(format) = metadata.get("format").as_str() {
            self.metadata.format = Some(format.to_string());
        }
        if let Some(export) = metadata.get("exports").as_str() {
            self.metadata.global_export = Some(export.to_string());
        }
    }
}

/// A dependency after normalization and loading.
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    /// The name as written in the dependent's source
    pub requested: String,
    /// The normalized name
    pub name: String,
    /// The dependency's record (possibly still in flight for cycles)
    pub record: Arc<ModuleRecord>,
}

impl ResolvedDep {
    /// The value injected into the dependent.
    pub fn value(&self) -> Value {
        self.record.export_value()
    }
}

/// Deferred body of a module.
pub type ExecuteFn =
    Box<dyn FnOnce(&Loader, &[ResolvedDep]) -> Result<Arc<Namespace>> + Send + Sync>;

/// The result of instantiate: dependencies to load, then a body to run.
pub struct Instantiation {
    /// Raw dependency names, duplicate-free
    pub deps: Vec<String>,
    /// Body, called once with the resolved dependencies in `deps` order
    pub execute: ExecuteFn,
}

impl Instantiation {
    /// Build an instantiation.
    pub fn new<F>(deps: Vec<String>, execute: F) -> Self
    where
        F: FnOnce(&Loader, &[ResolvedDep]) -> Result<Arc<Namespace>> + Send + Sync + 'static,
    {
        Self {
            deps,
            execute: Box::new(execute),
        }
    }
}

impl fmt::Debug for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instantiation")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Removes duplicates, keeping first occurrences in order.
pub fn dedupe(deps: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    deps.into_iter().filter(|d| seen.insert(d.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let deps = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe(deps), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_record_value_exposes_fields() {
        let mut load = LoadRecord::new("text");
        load.address = "text.js".into();
        load.metadata.format = Some("cjs".into());

        let value = load.to_value();
        assert_eq!(value.get("name"), Value::from("text"));
        assert_eq!(value.get_path("metadata.format"), Value::from("cjs"));
    }

    #[test]
    fn test_absorb_metadata_reads_hook_writes() {
        let mut load = LoadRecord::new("text");
        let value = load.to_value();
        let metadata = value.get("metadata");
        let metadata = metadata.as_object().unwrap();
        metadata.set("format", Value::from("global"));
        metadata.set("exports", Value::from("lib.Text"));
        metadata.set("mode", Value::from("raw"));

        load.absorb_metadata(&value);
        assert_eq!(load.metadata.format.as_deref(), Some("global"));
        assert_eq!(load.metadata.global_export.as_deref(), Some("lib.Text"));
        assert_eq!(load.metadata.extra.get("mode"), Value::from("raw"));
    }
}
