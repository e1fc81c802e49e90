// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader: drives module loads through the pipeline

use super::cache::{ModuleRecord, ModuleRegistry};
use super::graph::WaitGraph;
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::extensions::bundles::{BundleExtension, BundleTable};
use crate::extensions::map::{MapExtension, MapTable};
use crate::extensions::plugins::PluginExtension;
use crate::extensions::register::{Definition, DefinitionTable, RegisterExtension};
use crate::extensions::versions::{VersionExtension, VersionTable};
use crate::fetch::Fetch;
use crate::formats::{FormatDescriptor, FormatInstantiate, FormatRegistry};
use crate::pipeline::base::{BaseFetch, BaseLocate, BaseNormalize, BaseTranslate};
use crate::pipeline::{dedupe, Extension, Instantiation, LoadRecord, Pipeline, ResolvedDep};
use crate::runtime::{Namespace, ObjectRef, ScriptHost};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

struct Inner {
    pipeline: Pipeline,
    registry: ModuleRegistry,
    graph: WaitGraph,
    host: Arc<dyn ScriptHost>,
    global: ObjectRef,
    config: LoaderConfig,
    formats: Arc<FormatRegistry>,
    versions: Arc<VersionTable>,
    bundles: Arc<BundleTable>,
    definitions: Arc<DefinitionTable>,
}

/// A module loader.
///
/// Cloning is cheap; clones share the registry, tables and pipeline.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<Inner>,
}

/// A non-owning handle to a [`Loader`], for bindings stored in module values.
#[derive(Clone, Debug, Default)]
pub struct WeakLoader(Weak<Inner>);

impl WeakLoader {
    /// The loader, if it is still alive
    pub fn upgrade(&self) -> Option<Loader> {
        self.0.upgrade().map(|inner| Loader { inner })
    }
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("pipeline", &self.pipeline)
            .field("modules", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl Loader {
    /// Start building a loader around a script host and a fetcher.
    pub fn builder(
        host: impl ScriptHost + 'static,
        fetcher: impl Fetch + 'static,
    ) -> LoaderBuilder {
        LoaderBuilder::new(host, fetcher)
    }

    /// A weak handle to this loader
    pub fn downgrade(&self) -> WeakLoader {
        WeakLoader(Arc::downgrade(&self.inner))
    }

    /// The configuration the loader was built with
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// The script host
    pub fn host(&self) -> &dyn ScriptHost {
        self.inner.host.as_ref()
    }

    /// The global object scripts run against
    pub fn global(&self) -> &ObjectRef {
        &self.inner.global
    }

    /// The format registry
    pub fn formats(&self) -> &FormatRegistry {
        &self.inner.formats
    }

    /// The bundle table
    pub fn bundles(&self) -> &BundleTable {
        &self.inner.bundles
    }

    /// The predefined-definition table
    pub fn definitions(&self) -> &DefinitionTable {
        &self.inner.definitions
    }

    /// Snapshot of the version table
    pub fn versions(&self) -> BTreeMap<String, Vec<String>> {
        self.inner.versions.snapshot()
    }

    // Stages

    /// Run the normalize chain.
    pub async fn normalize(&self, name: &str, parent: Option<&str>) -> Result<String> {
        self.inner
            .pipeline
            .normalize_chain()
            .normalize(self, name, parent)
            .await
    }

    /// Run the locate chain.
    pub async fn locate(&self, load: &mut LoadRecord) -> Result<String> {
        self.inner.pipeline.locate_chain().locate(self, load).await
    }

    /// Run the fetch chain.
    pub async fn fetch(&self, load: &mut LoadRecord) -> Result<String> {
        self.inner.pipeline.fetch_chain().fetch(self, load).await
    }

    /// Run the translate chain.
    pub async fn translate(&self, load: &mut LoadRecord) -> Result<String> {
        self.inner.pipeline.translate_chain().translate(self, load).await
    }

    /// Run the instantiate chain.
    pub async fn instantiate(&self, load: &mut LoadRecord) -> Result<Instantiation> {
        self.inner
            .pipeline
            .instantiate_chain()
            .instantiate(self, load)
            .await
    }

    // Entry points

    /// Normalize `name` and load it.
    pub async fn load(&self, name: &str) -> Result<Arc<ModuleRecord>> {
        self.import(name, None).await
    }

    /// Normalize `name` against `parent` and load it.
    pub async fn import(&self, name: &str, parent: Option<&str>) -> Result<Arc<ModuleRecord>> {
        let normalized = self.normalize(name, parent).await?;
        let record = self.load_normalized(&normalized).await?;
        info!(module = %normalized, "Module loaded");
        Ok(record)
    }

    /// Load an already-normalized name, waiting for it to finish.
    pub fn load_normalized(&self, name: &str) -> BoxFuture<'_, Result<Arc<ModuleRecord>>> {
        self.request(name.to_string(), None)
    }

    /// Import several names concurrently, returning records in order.
    pub async fn require(
        &self,
        names: &[&str],
        parent: Option<&str>,
    ) -> Result<Vec<Arc<ModuleRecord>>> {
        try_join_all(names.iter().map(|name| self.import(name, parent))).await
    }

    // Registry

    /// A completed module
    pub fn get(&self, name: &str) -> Option<Arc<ModuleRecord>> {
        self.inner
            .registry
            .get(name)
            .filter(|record| record.is_ready())
    }

    /// Whether a completed module exists
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register a namespace under `name`, replacing any existing module
    pub fn set(&self, name: impl Into<String>, namespace: Arc<Namespace>) -> Arc<ModuleRecord> {
        let record = Arc::new(ModuleRecord::ready(name, namespace));
        self.inner.registry.set(record.clone());
        record
    }

    /// Forget a module so the next request loads it again
    pub fn delete(&self, name: &str) -> bool {
        self.inner.registry.delete(name).is_some()
    }

    /// Names of every completed module, sorted
    pub fn module_names(&self) -> Vec<String> {
        self.inner
            .registry
            .keys()
            .into_iter()
            .filter(|name| self.has(name))
            .collect()
    }

    /// Register a one-shot definition consumed by the next load of `name`.
    pub fn define<F>(&self, name: impl Into<String>, deps: Vec<String>, execute: F)
    where
        F: FnOnce(&Loader, &[ResolvedDep]) -> Result<Arc<Namespace>> + Send + Sync + 'static,
    {
        self.inner
            .definitions
            .insert(name, Definition::new(deps, execute));
    }

    // Driving

    /// Resolve a request for `name`, made by `requester` when it is a
    /// dependency.
    fn request(
        &self,
        name: String,
        requester: Option<String>,
    ) -> BoxFuture<'_, Result<Arc<ModuleRecord>>> {
        async move {
            let (record, created) = self.inner.registry.get_or_begin(&name);
            if created {
                debug!(module = %name, "Starting module load");
                tokio::spawn(self.clone().drive(record.clone()));
            }

            if !record.is_loading() {
                record.wait().await?;
                return Ok(record);
            }

            let _edge = match requester.as_deref() {
                Some(from) => match self.inner.graph.enter(from, &name) {
                    Some(edge) => Some(edge),
                    None => {
                        debug!(module = %name, requester = from, "Cycle detected, using in-flight module");
                        return Ok(record);
                    }
                },
                None => None,
            };

            record.wait().await?;
            Ok(record)
        }
        .boxed()
    }

    /// Run one module's pass to completion and settle its record.
    fn drive(self, record: Arc<ModuleRecord>) -> BoxFuture<'static, ()> {
        async move {
            match self.run(record.name()).await {
                Ok(namespace) => {
                    debug!(module = record.name(), "Module executed");
                    record.complete(namespace);
                }
                Err(err) => {
                    warn!(module = record.name(), error = %err, "Module load failed");
                    record.fail(err);
                    self.inner.registry.evict(&record);
                }
            }
        }
        .boxed()
    }

    async fn run(&self, name: &str) -> Result<Arc<Namespace>> {
        let mut load = LoadRecord::new(name);
        load.address = self.locate(&mut load).await?;
        load.source = self.fetch(&mut load).await?;
        load.source = self.translate(&mut load).await?;

        let Instantiation { deps, execute } = self.instantiate(&mut load).await?;
        let deps = dedupe(deps);
        let resolved = self.resolve_deps(name, &deps).await?;
        execute(self, &resolved)
    }

    async fn resolve_deps(&self, parent: &str, deps: &[String]) -> Result<Vec<ResolvedDep>> {
        trace!(module = parent, deps = ?deps, "Loading dependencies");

        try_join_all(deps.iter().map(|dep| async move {
            let name = self
                .normalize(dep, Some(parent))
                .await
                .map_err(|e| e.along_edge(parent, dep.as_str()))?;
            let record = self
                .request(name.clone(), Some(parent.to_string()))
                .await
                .map_err(|e| e.along_edge(parent, dep.as_str()))?;
            Ok::<_, LoaderError>(ResolvedDep {
                requested: dep.clone(),
                name,
                record,
            })
        }))
        .await
    }
}

/// Assembles a [`Loader`] and its pipeline.
pub struct LoaderBuilder {
    host: Arc<dyn ScriptHost>,
    fetcher: Arc<dyn Fetch>,
    config: LoaderConfig,
    global: ObjectRef,
    formats: Vec<Arc<dyn FormatDescriptor>>,
    extensions: Vec<Box<dyn Extension>>,
}

impl LoaderBuilder {
    /// A builder with default configuration.
    pub fn new(host: impl ScriptHost + 'static, fetcher: impl Fetch + 'static) -> Self {
        Self {
            host: Arc::new(host),
            fetcher: Arc::new(fetcher),
            config: LoaderConfig::default(),
            global: ObjectRef::new(),
            formats: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Use `config`
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Run scripts against `global` instead of a fresh object
    pub fn global(mut self, global: ObjectRef) -> Self {
        self.global = global;
        self
    }

    /// Register a custom format, detected ahead of the global fallback
    pub fn format(mut self, format: impl FormatDescriptor + 'static) -> Self {
        self.formats.push(Arc::new(format));
        self
    }

    /// Install an extension after the built-in ones, so its hooks run first
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    /// Validate the configuration and compose the pipeline.
    pub fn build(self) -> Result<Loader> {
        let config = self.config;
        config.validate()?;

        let shims = config.shims();
        let formats = Arc::new(FormatRegistry::with_defaults(
            shims.clone(),
            self.formats,
            &config.formats,
        )?);
        let versions = Arc::new(VersionTable::from_config(&config.versions));
        let bundles = Arc::new(BundleTable::from_config(&config.bundles));
        let definitions = Arc::new(DefinitionTable::new());

        let mut pipeline = Pipeline::new();
        pipeline
            .on_normalize(Arc::new(BaseNormalize))
            .on_locate(Arc::new(BaseLocate::new(
                config.paths.clone(),
                config.base_url.as_deref(),
            )?))
            .on_fetch(Arc::new(BaseFetch::new(self.fetcher)))
            .on_translate(Arc::new(BaseTranslate))
            .on_instantiate(Arc::new(FormatInstantiate::new(formats.clone(), shims)));

        pipeline
            .install(&MapExtension::new(MapTable::from_config(&config.map)))
            .install(&VersionExtension::new(versions.clone()))
            .install(&PluginExtension)
            .install(&BundleExtension::new(bundles.clone()))
            .install(&RegisterExtension::new(definitions.clone()));

        for extension in &self.extensions {
            pipeline.install(extension.as_ref());
        }

        debug!(formats = ?formats.ids(), depth = ?pipeline.depth(), "Loader built");

        Ok(Loader {
            inner: Arc::new(Inner {
                pipeline,
                registry: ModuleRegistry::new(),
                graph: WaitGraph::new(),
                host: self.host,
                global: self.global,
                config,
                formats,
                versions,
                bundles,
                definitions,
            }),
        })
    }
}
