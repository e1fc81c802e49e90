// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Global scripts
//!
//! The fallback format: any source is a global script. Its value is found
//! by diffing the global object before and after execution, or read from an
//! export path declared inline (`"export my.Global";`) or by a shim.
//!
//! The globals a module wrote are remembered so that a module importing it
//! can see them again even if a later script overwrote them.

use super::FormatDescriptor;
use crate::config::ShimConfig;
use crate::error::Result;
use crate::module_system::Loader;
use crate::pipeline::{LoadRecord, ResolvedDep};
use crate::runtime::{Namespace, ObjectRef, Scope, Script, Value};
use dashmap::DashMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::trace;

static DIRECTIVES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["']global["'];\s*)((['"]import [^'"]+['"];\s*)*)(['"]export ([^'"]+)["'])?"#)
        .expect("global directive regex")
});

static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(["']import [^'"]+)+"#).expect("global import regex"));

/// Inline `"global"` directives.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Directives {
    /// Names from `"import <name>";`
    pub imports: Vec<String>,
    /// Path from `"export <path>";`
    pub export: Option<String>,
}

/// Parse the `"global"; "import a"; "export b";` prologue, if present.
pub fn parse_directives(source: &str) -> Option<Directives> {
    let caps = DIRECTIVES.captures(source)?;
    let imports = caps
        .get(2)
        .map(|block| {
            IMPORT
                .find_iter(block.as_str())
                .filter_map(|m| m.as_str().get("'import ".len()..))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Directives {
        imports,
        export: caps.get(5).map(|m| m.as_str().to_string()),
    })
}

/// Global-script format descriptor
pub struct GlobalFormat {
    shims: BTreeMap<String, ShimConfig>,
    captured: DashMap<String, FxHashMap<String, Value>>,
}

impl GlobalFormat {
    /// Format id
    pub const ID: &'static str = "global";

    /// A global format honouring `shims`.
    pub fn new(shims: BTreeMap<String, ShimConfig>) -> Self {
        Self {
            shims,
            captured: DashMap::new(),
        }
    }

    /// Globals a module wrote when it ran
    pub fn captured(&self, name: &str) -> Option<FxHashMap<String, Value>> {
        self.captured.get(name).map(|entry| entry.clone())
    }
}

impl FormatDescriptor for GlobalFormat {
    fn id(&self) -> &str {
        Self::ID
    }

    fn detect(&self, _load: &LoadRecord) -> bool {
        true
    }

    fn extract_deps(&self, _loader: &Loader, load: &mut LoadRecord) -> Result<Vec<String>> {
        let mut deps = Vec::new();

        if let Some(directives) = parse_directives(&load.source) {
            deps = directives.imports;
            if directives.export.is_some() {
                load.metadata.global_export = directives.export;
            }
        }

        if let Some(shim) = self.shims.get(&load.name) {
            if let Some(exports) = &shim.exports {
                load.metadata.global_export = Some(exports.clone());
            }
            deps.extend(shim.deps.iter().cloned());
        }

        Ok(deps)
    }

    fn execute(&self, loader: &Loader, deps: &[ResolvedDep], load: &LoadRecord) -> Result<Value> {
        let global = loader.global();

        for dep in deps {
            if let Some(captured) = self.captured.get(&dep.name) {
                for (key, value) in captured.iter() {
                    global.set(key.as_str(), value.clone());
                }
            }
        }

        let before = global.snapshot();
        let export = load.metadata.global_export.as_deref();

        let source = match export {
            Some(path) => format!("{}\nthis[\"{path}\"] = {path};", load.source),
            None => load.source.clone(),
        };
        let script = Script {
            name: &load.name,
            address: &load.address,
            source: &source,
        };
        loader.host().execute(&script, &Scope::global(global.clone()))?;

        let (single, written) = match export {
            Some(path) => {
                let first = path.split('.').next().unwrap_or(path);
                let mut written = FxHashMap::default();
                written.insert(first.to_string(), global.get(first));
                (Value::Object(global.clone()).get_path(path), written)
            }
            None => diff(global, &before),
        };

        trace!(module = %load.name, globals = ?written.keys().collect::<Vec<_>>(), "Captured globals");
        self.captured.insert(load.name.clone(), written.clone());

        if single.to_boolean() {
            Ok(single)
        } else {
            Ok(Value::Module(Arc::new(Namespace::from_bindings(written))))
        }
    }
}

/// Globals that changed since `before`, plus their common value if every
/// changed global holds the same one.
fn diff(global: &ObjectRef, before: &FxHashMap<String, Value>) -> (Value, FxHashMap<String, Value>) {
    let mut written = FxHashMap::default();
    let mut single: Option<Value> = None;
    let mut shared = true;

    for (key, value) in global.snapshot() {
        if matches!(&value, Value::Object(obj) if ObjectRef::ptr_eq(obj, global)) {
            continue;
        }
        if before.get(&key).is_some_and(|old| old.same_value(&value)) {
            continue;
        }

        match &single {
            None => single = Some(value.clone()),
            Some(first) if !first.same_value(&value) => shared = false,
            Some(_) => {}
        }
        written.insert(key, value);
    }

    let single = if shared { single.unwrap_or_default() } else { Value::Undefined };
    (single, written)
}
