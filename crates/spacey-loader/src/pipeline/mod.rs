// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The five-stage hook pipeline.
//!
//! Each stage is an ordered list of hooks composed once at build time. The
//! most recently installed hook runs first and receives a [`Next`] handle to
//! the remainder of the chain, which it may call, skip, or call after doing
//! its own work.

pub mod base;
pub mod record;

pub use record::{
    dedupe, ExecuteFn, Instantiation, LoadRecord, Metadata, PluginRef, ResolvedDep,
};

use crate::error::{LoaderError, Result};
use crate::module_system::Loader;
use async_trait::async_trait;
use std::sync::Arc;

/// Rewrites a requested identifier into a canonical name.
#[async_trait]
pub trait NormalizeHook: Send + Sync {
    /// Normalize `name` as requested by `parent`.
    async fn normalize(
        &self,
        loader: &Loader,
        name: &str,
        parent: Option<&str>,
        next: Next<'_, dyn NormalizeHook>,
    ) -> Result<String>;
}

/// Maps a canonical name to an address.
#[async_trait]
pub trait LocateHook: Send + Sync {
    /// Produce the address for `load`.
    async fn locate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn LocateHook>,
    ) -> Result<String>;
}

/// Retrieves source text.
#[async_trait]
pub trait FetchHook: Send + Sync {
    /// Produce the source for `load`.
    async fn fetch(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn FetchHook>,
    ) -> Result<String>;
}

/// Transforms fetched source.
#[async_trait]
pub trait TranslateHook: Send + Sync {
    /// Produce the translated source for `load`.
    async fn translate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn TranslateHook>,
    ) -> Result<String>;
}

/// Turns translated source into dependencies plus a deferred body.
#[async_trait]
pub trait InstantiateHook: Send + Sync {
    /// Instantiate `load`.
    async fn instantiate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn InstantiateHook>,
    ) -> Result<Instantiation>;
}

/// The not-yet-run remainder of a stage's chain.
pub struct Next<'a, H: ?Sized> {
    chain: &'a [Arc<H>],
}

impl<H: ?Sized> Clone for Next<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: ?Sized> Copy for Next<'_, H> {}

impl<'a, H: ?Sized> Next<'a, H> {
    fn new(chain: &'a [Arc<H>]) -> Self {
        Self { chain }
    }

    /// Whether any hook remains.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl Next<'_, dyn NormalizeHook> {
    /// Run the remaining normalize hooks.
    pub async fn normalize(
        self,
        loader: &Loader,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        match self.chain.split_last() {
            Some((hook, rest)) => {
                hook.normalize(loader, name, parent, Next::new(rest))
                    .await
            }
            None => Err(LoaderError::resolution(name, "no normalize hook installed")),
        }
    }
}

impl Next<'_, dyn LocateHook> {
    /// Run the remaining locate hooks.
    pub async fn locate(self, loader: &Loader, load: &mut LoadRecord) -> Result<String> {
        match self.chain.split_last() {
            Some((hook, rest)) => hook.locate(loader, load, Next::new(rest)).await,
            None => Err(LoaderError::Locate {
                name: load.name.clone(),
                reason: "no locate hook installed".into(),
            }),
        }
    }
}

impl Next<'_, dyn FetchHook> {
    /// Run the remaining fetch hooks.
    pub async fn fetch(self, loader: &Loader, load: &mut LoadRecord) -> Result<String> {
        match self.chain.split_last() {
            Some((hook, rest)) => hook.fetch(loader, load, Next::new(rest)).await,
            None => Err(LoaderError::Fetch {
                name: load.name.clone(),
                address: load.address.clone(),
                reason: "no fetch hook installed".into(),
            }),
        }
    }
}

impl Next<'_, dyn TranslateHook> {
    /// Run the remaining translate hooks.
    pub async fn translate(self, loader: &Loader, load: &mut LoadRecord) -> Result<String> {
        match self.chain.split_last() {
            Some((hook, rest)) => hook.translate(loader, load, Next::new(rest)).await,
            None => Ok(load.source.clone()),
        }
    }
}

impl Next<'_, dyn InstantiateHook> {
    /// Run the remaining instantiate hooks.
    pub async fn instantiate(self, loader: &Loader, load: &mut LoadRecord) -> Result<Instantiation> {
        match self.chain.split_last() {
            Some((hook, rest)) => hook.instantiate(loader, load, Next::new(rest)).await,
            None => Err(LoaderError::Format {
                name: load.name.clone(),
                address: load.address.clone(),
            }),
        }
    }
}

/// Every installed hook, per stage, in installation order.
#[derive(Default)]
pub struct Pipeline {
    normalize: Vec<Arc<dyn NormalizeHook>>,
    locate: Vec<Arc<dyn LocateHook>>,
    fetch: Vec<Arc<dyn FetchHook>>,
    translate: Vec<Arc<dyn TranslateHook>>,
    instantiate: Vec<Arc<dyn InstantiateHook>>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a normalize hook; it runs before every hook installed so far.
    pub fn on_normalize(&mut self, hook: Arc<dyn NormalizeHook>) -> &mut Self {
        self.normalize.push(hook);
        self
    }

    /// Install a locate hook.
    pub fn on_locate(&mut self, hook: Arc<dyn LocateHook>) -> &mut Self {
        self.locate.push(hook);
        self
    }

    /// Install a fetch hook.
    pub fn on_fetch(&mut self, hook: Arc<dyn FetchHook>) -> &mut Self {
        self.fetch.push(hook);
        self
    }

    /// Install a translate hook.
    pub fn on_translate(&mut self, hook: Arc<dyn TranslateHook>) -> &mut Self {
        self.translate.push(hook);
        self
    }

    /// Install an instantiate hook.
    pub fn on_instantiate(&mut self, hook: Arc<dyn InstantiateHook>) -> &mut Self {
        self.instantiate.push(hook);
        self
    }

    /// Install every hook of an extension.
    pub fn install(&mut self, extension: &dyn Extension) -> &mut Self {
        tracing::debug!(extension = extension.name(), "Installing loader extension");
        extension.install(self);
        self
    }

    /// The full normalize chain.
    pub fn normalize_chain(&self) -> Next<'_, dyn NormalizeHook> {
        Next::new(&self.normalize)
    }

    /// The full locate chain.
    pub fn locate_chain(&self) -> Next<'_, dyn LocateHook> {
        Next::new(&self.locate)
    }

    /// The full fetch chain.
    pub fn fetch_chain(&self) -> Next<'_, dyn FetchHook> {
        Next::new(&self.fetch)
    }

    /// The full translate chain.
    pub fn translate_chain(&self) -> Next<'_, dyn TranslateHook> {
        Next::new(&self.translate)
    }

    /// The full instantiate chain.
    pub fn instantiate_chain(&self) -> Next<'_, dyn InstantiateHook> {
        Next::new(&self.instantiate)
    }

    /// Hook counts per stage, for diagnostics.
    pub fn depth(&self) -> [usize; 5] {
        [
            self.normalize.len(),
            self.locate.len(),
            self.fetch.len(),
            self.translate.len(),
            self.instantiate.len(),
        ]
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("depth", &self.depth())
            .finish()
    }
}

/// A bundle of hooks installed together.
pub trait Extension: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Push this extension's hooks onto `pipeline`.
    fn install(&self, pipeline: &mut Pipeline);
}
