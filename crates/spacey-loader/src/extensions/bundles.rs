// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundle redirection
//!
//! A bundle is one script that defines many modules. When a member is
//! requested, the bundle is loaded instead; running it registers every
//! member as a predefined module, which the register extension then serves
//! without another fetch.

use super::register::register_binding;
use crate::error::Result;
use crate::formats::amd::registering_define;
use crate::module_system::Loader;
use crate::pipeline::{
    Extension, FetchHook, InstantiateHook, Instantiation, LoadRecord, LocateHook, Next, Pipeline,
};
use crate::runtime::{Namespace, Object, Scope, Script};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Bundle ids and the modules each one contains.
#[derive(Debug, Default)]
pub struct BundleTable {
    bundles: RwLock<BTreeMap<String, Vec<String>>>,
}

impl BundleTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded from configuration.
    pub fn from_config(bundles: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            bundles: RwLock::new(bundles.clone()),
        }
    }

    /// Declare `bundle` as containing `members`.
    pub fn insert(&self, bundle: impl Into<String>, members: Vec<String>) {
        self.bundles.write().insert(bundle.into(), members);
    }

    /// The first bundle listing `name` as a member.
    pub fn bundle_for(&self, name: &str) -> Option<String> {
        self.bundles
            .read()
            .iter()
            .find(|(_, members)| members.iter().any(|member| member == name))
            .map(|(bundle, _)| bundle.clone())
    }

    /// Whether `name` is a bundle id.
    pub fn is_bundle(&self, name: &str) -> bool {
        self.bundles.read().contains_key(name)
    }

    /// Record `normalized` as another key for `bundle`, so the normalized
    /// module is recognized as a bundle when it is located.
    fn alias(&self, normalized: &str, bundle: &str) {
        let mut bundles = self.bundles.write();
        if bundles.contains_key(normalized) {
            return;
        }
        let members = bundles.get(bundle).cloned().unwrap_or_default();
        bundles.insert(normalized.to_string(), members);
    }

    /// Copy of the table.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.bundles.read().clone()
    }
}

/// Redirects member loads to their bundle.
pub struct BundleExtension {
    hooks: Arc<BundleHooks>,
}

impl BundleExtension {
    /// Redirect using `table`.
    pub fn new(table: Arc<BundleTable>) -> Self {
        Self {
            hooks: Arc::new(BundleHooks { table }),
        }
    }
}

impl Extension for BundleExtension {
    fn name(&self) -> &str {
        "bundles"
    }

    fn install(&self, pipeline: &mut Pipeline) {
        pipeline
            .on_locate(self.hooks.clone())
            .on_fetch(self.hooks.clone())
            .on_instantiate(self.hooks.clone());
    }
}

struct BundleHooks {
    table: Arc<BundleTable>,
}

#[async_trait]
impl LocateHook for BundleHooks {
    async fn locate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn LocateHook>,
    ) -> Result<String> {
        if self.table.is_bundle(&load.name) {
            load.metadata.bundle = true;
        }
        next.locate(loader, load).await
    }
}

#[async_trait]
impl FetchHook for BundleHooks {
    async fn fetch(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn FetchHook>,
    ) -> Result<String> {
        let Some(bundle) = self.table.bundle_for(&load.name) else {
            return next.fetch(loader, load).await;
        };

        let normalized = loader.normalize(&bundle, None).await?;
        self.table.alias(&normalized, &bundle);
        debug!(module = %load.name, bundle = %normalized, "Loading module from bundle");
        loader
            .load_normalized(&normalized)
            .await
            .map_err(|e| e.along_edge(load.name.as_str(), normalized.as_str()))?;
        Ok(String::new())
    }
}

#[async_trait]
impl InstantiateHook for BundleHooks {
    async fn instantiate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn InstantiateHook>,
    ) -> Result<Instantiation> {
        if !load.metadata.bundle {
            return next.instantiate(loader, load).await;
        }

        let name = load.name.clone();
        let address = load.address.clone();
        let source = load.source.clone();
        Ok(Instantiation::new(Vec::new(), move |loader, _| {
            let mut locals = Object::new();
            locals.set("define".into(), registering_define(loader));
            locals.set("register".into(), register_binding(loader));
            let scope = Scope::with_locals(loader.global().clone(), locals);

            let script = Script {
                name: &name,
                address: &address,
                source: &source,
            };
            loader.host().execute(&script, &scope)?;
            Ok(Arc::new(Namespace::new()))
        }))
    }
}
