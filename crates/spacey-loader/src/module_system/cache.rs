// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry
//!
//! One [`ModuleRecord`] per normalized name for the lifetime of the loader.
//! A record is created in the `Loading` state by whichever request arrives
//! first; every later request for the same name shares it.

use crate::error::{LoaderError, Result};
use crate::runtime::{Namespace, Value};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of a module record
#[derive(Debug, Clone)]
pub enum Status {
    /// Somewhere between normalize and execute
    Loading,
    /// Executed; the namespace is available
    Ready,
    /// The load failed
    Failed(LoaderError),
}

/// The memoized result of loading one module.
pub struct ModuleRecord {
    name: String,
    status: watch::Sender<Status>,
    namespace: RwLock<Option<Arc<Namespace>>>,
}

impl ModuleRecord {
    /// A record whose load is in flight
    pub fn loading(name: impl Into<String>) -> Self {
        let (status, _) = watch::channel(Status::Loading);
        Self {
            name: name.into(),
            status,
            namespace: RwLock::new(None),
        }
    }

    /// A record that is already complete
    pub fn ready(name: impl Into<String>, namespace: Arc<Namespace>) -> Self {
        let record = Self::loading(name);
        record.complete(namespace);
        record
    }

    /// Normalized name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Whether execution has finished
    pub fn is_ready(&self) -> bool {
        matches!(*self.status.borrow(), Status::Ready)
    }

    /// Whether the load is still in flight
    pub fn is_loading(&self) -> bool {
        matches!(*self.status.borrow(), Status::Loading)
    }

    /// The namespace, once ready
    pub fn namespace(&self) -> Option<Arc<Namespace>> {
        self.namespace.read().clone()
    }

    /// The value injected into dependents.
    ///
    /// Undefined while the record is still loading, which is what a cycle
    /// partner observes.
    pub fn export_value(&self) -> Value {
        self.namespace()
            .map(|ns| ns.to_value())
            .unwrap_or(Value::Undefined)
    }

    pub(crate) fn complete(&self, namespace: Arc<Namespace>) {
        *self.namespace.write() = Some(namespace);
        self.status.send_replace(Status::Ready);
    }

    pub(crate) fn fail(&self, error: LoaderError) {
        self.status.send_replace(Status::Failed(error));
    }

    /// Wait until the record settles.
    pub async fn wait(&self) -> Result<Arc<Namespace>> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|status| !matches!(status, Status::Loading))
            .await
            .map(|status| Status::clone(&status))
            .map_err(|e| LoaderError::execution(&self.name, e))?;

        match status {
            Status::Failed(err) => Err(err),
            _ => self
                .namespace()
                .ok_or_else(|| LoaderError::NotLoaded(self.name.clone())),
        }
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Thread-safe table of module records
pub struct ModuleRegistry {
    records: DashMap<String, Arc<ModuleRecord>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Get a record by name, in any state
    pub fn get(&self, name: &str) -> Option<Arc<ModuleRecord>> {
        self.records.get(name).map(|entry| entry.clone())
    }

    /// The existing record for `name`, or a new loading one.
    ///
    /// The flag is true when this call created the record and so owns
    /// driving its load.
    pub fn get_or_begin(&self, name: &str) -> (Arc<ModuleRecord>, bool) {
        match self.records.entry(name.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let record = Arc::new(ModuleRecord::loading(name));
                entry.insert(record.clone());
                (record, true)
            }
        }
    }

    /// Add a complete record, replacing any existing one
    pub fn set(&self, record: Arc<ModuleRecord>) {
        self.records.insert(record.name().to_string(), record);
    }

    /// Remove a record by name
    pub fn delete(&self, name: &str) -> Option<Arc<ModuleRecord>> {
        self.records.remove(name).map(|(_, v)| v)
    }

    /// Remove `record` only if it is still the one registered under its name
    pub fn evict(&self, record: &Arc<ModuleRecord>) {
        self.records
            .remove_if(record.name(), |_, current| Arc::ptr_eq(current, record));
    }

    /// Check if a record exists
    pub fn has(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// All registered names, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
