// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Predefined-module cache
//!
//! Producers (bundles, named AMD defines, [`Loader::define`]) register a
//! `{deps, execute}` pair against a name ahead of time. The next load of
//! that name skips fetching and consumes the pair instead of detecting a
//! format. Each definition is used at most once.

use crate::error::{LoaderError, Result};
use crate::module_system::Loader;
use crate::pipeline::{
    ExecuteFn, Extension, FetchHook, InstantiateHook, Instantiation, LoadRecord, Next, Pipeline,
    ResolvedDep,
};
use crate::runtime::{Namespace, Value};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A registered module body.
pub struct Definition {
    /// Raw dependency names
    pub deps: Vec<String>,
    /// Body run with resolved dependencies
    pub execute: ExecuteFn,
}

impl Definition {
    /// Build a definition.
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

impl From<Definition> for Instantiation {
    fn from(definition: Definition) -> Self {
        Instantiation {
            deps: definition.deps,
            execute: definition.execute,
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Definitions waiting to be consumed, by normalized name.
#[derive(Default)]
pub struct DefinitionTable {
    entries: DashMap<String, Definition>,
}

impl DefinitionTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition`, replacing one not yet consumed
    pub fn insert(&self, name: impl Into<String>, definition: Definition) {
        let name = name.into();
        debug!(module = %name, deps = ?definition.deps, "Module predefined");
        self.entries.insert(name, definition);
    }

    /// Whether `name` has a pending definition
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove and return the definition for `name`
    pub fn take(&self, name: &str) -> Option<Definition> {
        self.entries.remove(name).map(|(_, definition)| definition)
    }

    /// Pending names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of pending definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The `register(name, deps, factory)` binding bundle scripts receive.
///
/// The factory is called with the dependency values and returns an object
/// whose properties become the module's named exports.
pub fn register_binding(loader: &Loader) -> Value {
    let loader = loader.downgrade();
    Value::function("register", move |args| {
        let name = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| LoaderError::type_error("register expects a module name"))?;
        let deps = match args.get(1) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        LoaderError::type_error("register dependencies must be strings")
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(LoaderError::type_error("register expects a dependency array")),
        };
        let factory = match args.get(2) {
            Some(Value::Function(factory)) => factory.clone(),
            _ => return Err(LoaderError::type_error("register expects a factory function")),
        };
        let loader = loader
            .upgrade()
            .ok_or_else(|| LoaderError::execution(name, "loader was dropped"))?;

        loader.define(name, deps, move |_, resolved| {
            let values: Vec<Value> = resolved.iter().map(ResolvedDep::value).collect();
            Ok(match factory.call(&values)? {
                Value::Object(exports) => Arc::new(Namespace::from_bindings(exports.snapshot())),
                other => Namespace::from_value(other),
            })
        });
        Ok(Value::Undefined)
    })
}

/// Hooks fetch and instantiate to serve predefined modules.
pub struct RegisterExtension {
    hooks: Arc<RegisterHooks>,
}

impl RegisterExtension {
    /// Serve definitions from `definitions`.
    pub fn new(definitions: Arc<DefinitionTable>) -> Self {
        Self {
            hooks: Arc::new(RegisterHooks { definitions }),
        }
    }
}

impl Extension for RegisterExtension {
    fn name(&self) -> &str {
        "register"
    }

    fn install(&self, pipeline: &mut Pipeline) {
        pipeline
            .on_fetch(self.hooks.clone())
            .on_instantiate(self.hooks.clone());
    }
}

struct RegisterHooks {
    definitions: Arc<DefinitionTable>,
}

#[async_trait]
impl FetchHook for RegisterHooks {
    async fn fetch(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn FetchHook>,
    ) -> Result<String> {
        if self.definitions.contains(&load.name) {
            return Ok(String::new());
        }
        let source = next.fetch(loader, load).await?;

        // fetching a bundle may have defined this module
        if self.definitions.contains(&load.name) {
            return Ok(String::new());
        }
        Ok(source)
    }
}

#[async_trait]
impl InstantiateHook for RegisterHooks {
    async fn instantiate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn InstantiateHook>,
    ) -> Result<Instantiation> {
        match self.definitions.take(&load.name) {
            Some(definition) => {
                debug!(module = %load.name, "Using predefined module");
                Ok(definition.into())
            }
            None => next.instantiate(loader, load).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_are_one_shot() {
        let table = DefinitionTable::new();
        table.insert(
            "a",
            Definition::new(vec!["b".into()], |_, _| Ok(Arc::new(Namespace::new()))),
        );

        assert!(table.contains("a"));
        assert_eq!(table.names(), vec!["a"]);
        let definition = table.take("a").unwrap();
        assert_eq!(definition.deps, vec!["b"]);
        assert!(table.take("a").is_none());
        assert!(table.is_empty());
    }
}
