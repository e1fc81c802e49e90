// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader plugins
//!
//! `argument!plugin` loads `argument` through the module named `plugin`.
//! The plugin module's exported value may provide `locate`, `fetch` and
//! `translate` functions, each called with the load as an object; any it
//! leaves out fall back to the standard hooks.
//!
//! A plugin that is itself a function uses the legacy single-callback
//! convention: `plugin(argument, address, fetch, resolve, reject)`, where
//! `fetch(url, callback, errback)` reads another resource.

use crate::error::{LoaderError, Result};
use crate::module_system::{Loader, ModuleRecord};
use crate::pipeline::{
    Extension, FetchHook, LoadRecord, LocateHook, NormalizeHook, Next, Pipeline, PluginRef,
    TranslateHook,
};
use crate::runtime::{Function, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Split `argument!plugin`; a bare trailing `!` takes the plugin name from
/// whatever follows the argument's last `.`, or the whole argument.
pub fn split_plugin(name: &str) -> Option<(&str, String)> {
    let bang = name.rfind('!')?;
    let argument = &name[..bang];
    let plugin = match &name[bang + 1..] {
        "" => match argument.rfind('.') {
            Some(dot) => argument[dot + 1..].to_string(),
            None => argument.to_string(),
        },
        plugin => plugin.to_string(),
    };
    Some((argument, plugin))
}

/// The value a plugin module offers its hooks through.
fn plugin_value(record: &ModuleRecord) -> Value {
    let Some(namespace) = record.namespace() else {
        return Value::Undefined;
    };
    let default = namespace.default_export();
    if default.to_boolean() {
        default
    } else {
        namespace.to_value()
    }
}

fn rejected(plugin: &PluginRef, name: &str, reason: impl ToString) -> LoaderError {
    LoaderError::Plugin {
        plugin: plugin.name.clone(),
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Call a plugin hook with the load object, expecting text back.
///
/// An undefined result means the hook updated `field` on the load object.
/// Metadata the hook set on the object is kept either way.
fn call_hook(
    plugin: &PluginRef,
    hook: &Function,
    load: &mut LoadRecord,
    field: &str,
) -> Result<String> {
    let arg = load.to_value();
    let result = hook
        .call(std::slice::from_ref(&arg))
        .map_err(|e| rejected(plugin, &load.name, e))?;
    load.absorb_metadata(&arg);

    match result {
        Value::String(text) => Ok(text),
        Value::Undefined => match arg.get(field) {
            Value::String(text) => Ok(text),
            other => Err(rejected(
                plugin,
                &load.name,
                format!("expected {field} to be a string, got {}", other.type_of()),
            )),
        },
        other => Err(rejected(
            plugin,
            &load.name,
            format!("hook returned {} instead of a string", other.type_of()),
        )),
    }
}

/// Installs the plugin hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct PluginExtension;

impl Extension for PluginExtension {
    fn name(&self) -> &str {
        "plugins"
    }

    fn install(&self, pipeline: &mut Pipeline) {
        let hooks = Arc::new(PluginHooks);
        pipeline
            .on_normalize(hooks.clone())
            .on_locate(hooks.clone())
            .on_fetch(hooks.clone())
            .on_translate(hooks);
    }
}

struct PluginHooks;

#[async_trait]
impl NormalizeHook for PluginHooks {
    async fn normalize(
        &self,
        loader: &Loader,
        name: &str,
        parent: Option<&str>,
        next: Next<'_, dyn NormalizeHook>,
    ) -> Result<String> {
        // a plugin parent resolves relative names against its argument
        let parent = parent.map(|p| p.split('!').next().unwrap_or(p));
        let normalized = next.normalize(loader, name, parent).await?;

        let Some((argument, plugin)) = split_plugin(&normalized) else {
            return Ok(normalized);
        };
        let plugin = loader.normalize(&plugin, parent).await?;
        let argument = loader.normalize(argument, parent).await?;
        Ok(format!("{argument}!{plugin}"))
    }
}

#[async_trait]
impl LocateHook for PluginHooks {
    async fn locate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn LocateHook>,
    ) -> Result<String> {
        let Some(bang) = load.name.rfind('!') else {
            return next.locate(loader, load).await;
        };
        let full = load.name.clone();
        let plugin_name = full[bang + 1..].to_string();
        let argument = full[..bang].to_string();

        // the resource located is the argument alone
        load.name = argument.clone();

        let record = loader
            .load_normalized(&plugin_name)
            .await
            .map_err(|e| e.along_edge(full.as_str(), plugin_name.as_str()))?;
        let plugin = PluginRef {
            name: plugin_name,
            argument,
            value: plugin_value(&record),
        };
        debug!(module = %full, plugin = %plugin.name, "Loaded plugin");
        load.metadata.plugin = Some(plugin.clone());

        if let Value::Function(hook) = plugin.value.get("locate") {
            return call_hook(&plugin, &hook, load, "address");
        }

        let address = loader.locate(load).await?;
        if load.name.ends_with(".js") {
            return Ok(address);
        }
        Ok(address
            .strip_suffix(".js")
            .map(str::to_string)
            .unwrap_or(address))
    }
}

#[async_trait]
impl FetchHook for PluginHooks {
    async fn fetch(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn FetchHook>,
    ) -> Result<String> {
        let Some(plugin) = load.metadata.plugin.clone() else {
            return next.fetch(loader, load).await;
        };

        if let Value::Function(legacy) = &plugin.value {
            return legacy_fetch(&plugin, legacy, loader, load, next).await;
        }
        match plugin.value.get("fetch") {
            Value::Function(hook) => call_hook(&plugin, &hook, load, "source"),
            _ => next.fetch(loader, load).await,
        }
    }
}

#[async_trait]
impl TranslateHook for PluginHooks {
    async fn translate(
        &self,
        loader: &Loader,
        load: &mut LoadRecord,
        next: Next<'_, dyn TranslateHook>,
    ) -> Result<String> {
        let hook = load
            .metadata
            .plugin
            .as_ref()
            .map(|plugin| (plugin.clone(), plugin.value.get("translate")));

        match hook {
            Some((plugin, Value::Function(hook))) => call_hook(&plugin, &hook, load, "source"),
            _ => next.translate(loader, load).await,
        }
    }
}

/// State shared between a legacy plugin and the bindings it was handed.
#[derive(Default)]
struct Legacy {
    requests: Vec<(String, Value, Value)>,
    outcome: Option<std::result::Result<String, String>>,
}

async fn legacy_fetch(
    plugin: &PluginRef,
    function: &Function,
    loader: &Loader,
    load: &LoadRecord,
    next: Next<'_, dyn FetchHook>,
) -> Result<String> {
    let state = Arc::new(Mutex::new(Legacy::default()));

    let fetch = {
        let state = state.clone();
        Value::function("fetch", move |args| {
            let url = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| LoaderError::type_error("fetch expects a url"))?;
            let callback = args.get(1).cloned().unwrap_or_default();
            let errback = args.get(2).cloned().unwrap_or_default();
            state.lock().requests.push((url.to_string(), callback, errback));
            Ok(Value::Undefined)
        })
    };
    let settle = |ok: bool| {
        let state = state.clone();
        Value::function(if ok { "resolve" } else { "reject" }, move |args| {
            let value = args.first().cloned().unwrap_or_default();
            let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            let mut state = state.lock();
            if state.outcome.is_none() {
                state.outcome = Some(if ok { Ok(text) } else { Err(text) });
            }
            Ok(Value::Undefined)
        })
    };

    function
        .call(&[
            Value::string(plugin.argument.as_str()),
            Value::string(load.address.as_str()),
            fetch,
            settle(true),
            settle(false),
        ])
        .map_err(|e| rejected(plugin, &load.name, e))?;

    loop {
        let outcome = state.lock().outcome.take();
        if let Some(outcome) = outcome {
            return outcome.map_err(|reason| rejected(plugin, &load.name, reason));
        }

        let requests = std::mem::take(&mut state.lock().requests);
        if requests.is_empty() {
            return Err(rejected(plugin, &load.name, "plugin never resolved"));
        }

        for (url, callback, errback) in requests {
            let mut request = LoadRecord::new(load.name.clone());
            request.address = url;
            let (handler, arg) = match next.fetch(loader, &mut request).await {
                Ok(source) => (callback, Value::String(source)),
                Err(err) => (errback, Value::string(err.to_string())),
            };
            if let Value::Function(handler) = handler {
                handler
                    .call(&[arg])
                    .map_err(|e| rejected(plugin, &load.name, e))?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plugin() {
        assert_eq!(split_plugin("a/b.txt!text"), Some(("a/b.txt", "text".to_string())));
        assert_eq!(split_plugin("a/b.css!"), Some(("a/b.css", "css".to_string())));
        assert_eq!(split_plugin("a/b!"), Some(("a/b", "a/b".to_string())));
        assert_eq!(split_plugin("x!y!z"), Some(("x!y", "z".to_string())));
        assert_eq!(split_plugin("a/b"), None);
    }

    #[test]
    fn test_bare_bang_reads_after_last_dot() {
        assert_eq!(split_plugin("lib.v2/file!"), Some(("lib.v2/file", "v2/file".to_string())));
    }
}
