// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! AMD modules
//!
//! AMD sources are run twice. The first run happens in a disposable scope
//! (a shallow copy of the global object) with a recording `define`, and
//! only yields the dependency list. Once dependencies are loaded the source
//! runs again against the real global object and the recorded factory is
//! called with the dependency values injected.
//!
//! The pseudo-dependencies `require`, `exports` and `module` are removed
//! from the dependency list and synthesized at execution time at the
//! positions they were declared in.

use super::cjs::extract_requires;
use super::FormatDescriptor;
use crate::error::{LoaderError, Result};
use crate::module_system::{Loader, ModuleRecord, WeakLoader};
use crate::pipeline::{dedupe, LoadRecord, ResolvedDep};
use crate::runtime::{Function, Namespace, Object, ObjectRef, Scope, Script, Value};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^\s*|[}{\(\);,\n\?\&]\s*)define\s*\(\s*("[^"]+"\s*,|'[^']+'\s*,\s*)?(\[(\s*("[^"]+"|'[^']+')\s*,)*(\s*("[^"]+"|'[^']+')\s*)?\]|function\s*|\{|[_$a-zA-Z\x{A0}-\x{FFFF}][_$a-zA-Z0-9\x{A0}-\x{FFFF}]*\))"#,
    )
    .expect("define regex")
});

const REQUIRE: &str = "require";
const EXPORTS: &str = "exports";
const MODULE: &str = "module";

/// Where the pseudo-dependencies sat in a define's dependency list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmdMetadata {
    /// Position of `require`
    pub require_index: Option<usize>,
    /// Position of `exports`, after `require` was removed
    pub exports_index: Option<usize>,
    /// Position of `module`, after `require` and `exports` were removed
    pub module_index: Option<usize>,
}

/// De-duplicate `deps` and pull out the pseudo-dependencies.
pub fn prepare_deps(deps: Vec<String>) -> (Vec<String>, AmdMetadata) {
    let mut deps = dedupe(deps);
    let mut take = |pseudo: &str| {
        let index = deps.iter().position(|d| d == pseudo)?;
        deps.remove(index);
        Some(index)
    };

    let require_index = take(REQUIRE);
    let exports_index = take(EXPORTS);
    let module_index = take(MODULE);

    (
        deps,
        AmdMetadata {
            require_index,
            exports_index,
            module_index,
        },
    )
}

/// One recorded `define(...)` call.
#[derive(Debug, Clone)]
struct DefineCall {
    name: Option<String>,
    deps: Vec<String>,
    factory: Value,
}

impl DefineCall {
    fn parse(args: &[Value], module_source: &str) -> Result<Self> {
        let (name, rest) = match args.split_first() {
            Some((Value::String(name), rest)) => (Some(name.clone()), rest),
            _ => (None, args),
        };

        let (deps, factory) = match rest.first() {
            Some(Value::Array(items)) => {
                let deps = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            LoaderError::type_error("define dependencies must be strings")
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (deps, rest.get(1).cloned().unwrap_or_default())
            }
            first => {
                // CommonJS sugar: define(function (require, exports, module) { ... })
                let factory = first.cloned().unwrap_or_default();
                let mut deps = vec![REQUIRE.to_string(), EXPORTS.to_string(), MODULE.to_string()];
                if let Value::Function(f) = &factory {
                    deps.extend(extract_requires(f.source().unwrap_or(module_source)));
                }
                (deps, factory)
            }
        };

        Ok(Self {
            name,
            deps,
            factory,
        })
    }

    fn defines(&self, module: &str) -> bool {
        self.name.as_deref().map_or(true, |name| name == module)
    }
}

/// Calls recorded by a `define` binding during one run.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl Recorder {
    fn binding(&self) -> Value {
        let calls = self.calls.clone();
        define_binding(move |args| {
            calls.lock().push(args.to_vec());
            Ok(Value::Undefined)
        })
    }

    fn run(&self, loader: &Loader, load: &LoadRecord, global: ObjectRef) -> Result<Vec<DefineCall>> {
        let mut locals = Object::new();
        locals.set("define".into(), self.binding());
        locals.set("module".into(), Value::Undefined);
        locals.set("exports".into(), Value::Undefined);

        let script = Script {
            name: &load.name,
            address: &load.address,
            source: &load.source,
        };
        loader
            .host()
            .execute(&script, &Scope::with_locals(global, locals))?;

        let recorded = std::mem::take(&mut *self.calls.lock());
        let calls = recorded
            .iter()
            .map(|args| DefineCall::parse(args, &load.source))
            .collect::<Result<Vec<_>>>()?;

        let anonymous = calls.iter().filter(|call| call.name.is_none()).count();
        if anonymous > 1 {
            return Err(LoaderError::DefinitionConflict(load.name.clone()));
        }
        Ok(calls)
    }
}

/// Builds the values a factory is called with.
struct Injection {
    args: Vec<Value>,
    module: Option<ObjectRef>,
}

impl Injection {
    fn new(
        meta: &AmdMetadata,
        id: &str,
        uri: &str,
        deps: &[ResolvedDep],
        loader: WeakLoader,
    ) -> Self {
        let mut args: Vec<Value> = deps.iter().map(ResolvedDep::value).collect();
        let mut module = None;
        let mut exports = None;

        if let Some(index) = meta.module_index {
            let shared = ObjectRef::new();
            let descriptor = ObjectRef::from_pairs([
                ("id", Value::string(id)),
                ("uri", Value::string(uri)),
                (
                    "config",
                    Value::function("config", |_| Ok(Value::object::<&str, _>([]))),
                ),
                ("exports", Value::Object(shared.clone())),
            ]);
            args.insert(index.min(args.len()), Value::Object(descriptor.clone()));
            module = Some(descriptor);
            exports = Some(shared);
        }
        if let Some(index) = meta.exports_index {
            let shared = exports.get_or_insert_with(ObjectRef::new).clone();
            args.insert(index.min(args.len()), Value::Object(shared));
        }
        if let Some(index) = meta.require_index {
            args.insert(index.min(args.len()), scoped_require(deps, loader));
        }

        // a factory using only `exports` still gets its object returned
        let module = module.or_else(|| {
            exports.map(|exports| ObjectRef::from_pairs([("exports", Value::Object(exports))]))
        });
        Self { args, module }
    }

    fn call(self, factory: &Value) -> Result<Value> {
        let output = match factory {
            Value::Function(f) => f.call(&self.args)?,
            constant => constant.clone(),
        };
        if output.to_boolean() {
            return Ok(output);
        }
        Ok(self
            .module
            .map(|module| module.get("exports"))
            .unwrap_or(Value::Undefined))
    }
}

/// `require` as seen inside a factory: declared dependencies first, then
/// any module the loader already holds.
fn scoped_require(deps: &[ResolvedDep], loader: WeakLoader) -> Value {
    let declared: Vec<(String, Arc<ModuleRecord>)> = deps
        .iter()
        .map(|dep| (dep.requested.clone(), dep.record.clone()))
        .collect();

    Value::function("require", move |args| {
        let name = match args.first() {
            Some(Value::String(name)) => name,
            _ => {
                return Err(LoaderError::type_error(
                    "require inside a module factory takes a single module name",
                ))
            }
        };

        if let Some((_, record)) = declared.iter().find(|(requested, _)| requested == name) {
            return Ok(record.export_value());
        }
        loader
            .upgrade()
            .and_then(|loader| loader.get(name))
            .map(|record| record.export_value())
            .ok_or_else(|| LoaderError::NotLoaded(name.clone()))
    })
}

/// Register a named define for another module as a predefined module.
fn predefine(loader: &Loader, call: DefineCall) {
    let Some(name) = call.name else { return };
    let (deps, meta) = prepare_deps(call.deps);
    let factory = call.factory;
    let id = name.clone();

    loader.define(name, deps, move |loader, resolved| {
        let output = Injection::new(&meta, &id, &id, resolved, loader.downgrade()).call(&factory)?;
        Ok(Namespace::from_value(output))
    });
}

fn define_binding<F>(body: F) -> Value
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
{
    let define = Function::native("define", body);
    // capability probe: `if (typeof define == "function" && define.amd)`
    define
        .properties()
        .set("amd", Value::object::<&str, _>([]));
    Value::Function(Arc::new(define))
}

/// A `define` for bundle scripts: every named definition is predefined
/// as soon as it is made.
pub fn registering_define(loader: &Loader) -> Value {
    let loader = loader.downgrade();
    define_binding(move |args| {
        let loader = loader
            .upgrade()
            .ok_or_else(|| LoaderError::execution("define", "loader was dropped"))?;
        let call = DefineCall::parse(args, "")?;
        if call.name.is_none() {
            warn!("Ignoring anonymous define inside a bundle");
            return Ok(Value::Undefined);
        }
        predefine(&loader, call);
        Ok(Value::Undefined)
    })
}

/// AMD format descriptor
#[derive(Debug, Default, Clone, Copy)]
pub struct AmdFormat;

impl AmdFormat {
    /// Format id
    pub const ID: &'static str = "amd";
}

impl FormatDescriptor for AmdFormat {
    fn id(&self) -> &str {
        Self::ID
    }

    fn detect(&self, load: &LoadRecord) -> bool {
        DEFINE.is_match(&load.source)
    }

    fn extract_deps(&self, loader: &Loader, load: &mut LoadRecord) -> Result<Vec<String>> {
        let disposable = ObjectRef::from_pairs(loader.global().snapshot());
        let calls = Recorder::default().run(loader, load, disposable)?;

        let declared = calls
            .into_iter()
            .filter(|call| call.defines(&load.name))
            .last()
            .map(|call| call.deps)
            .unwrap_or_default();

        let (deps, meta) = prepare_deps(declared);
        load.metadata.amd = Some(meta);
        Ok(deps)
    }

    fn execute(&self, loader: &Loader, deps: &[ResolvedDep], load: &LoadRecord) -> Result<Value> {
        let calls = Recorder::default().run(loader, load, loader.global().clone())?;

        let mut own = None;
        for call in calls {
            if call.defines(&load.name) {
                own = Some(call);
            } else {
                debug!(module = %load.name, defines = ?call.name, "Named define registered");
                predefine(loader, call);
            }
        }

        let Some(call) = own else {
            return Ok(Value::Undefined);
        };
        let meta = load.metadata.amd.clone().unwrap_or_default();
        Injection::new(&meta, &load.name, &load.address, deps, loader.downgrade()).call(&call.factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_define_forms() {
        for source in [
            "define(['a', 'b'], function (a, b) {});",
            "define('named', ['a'], function (a) {});",
            "define(function (require) {});",
            "define({ answer: 42 });",
            "define(factory);",
            "if (x) { define([], function () {}); }",
        ] {
            let mut load = LoadRecord::new("m");
            load.source = source.into();
            assert!(AmdFormat.detect(&load), "{source}");
        }

        let mut load = LoadRecord::new("m");
        load.source = "undefined(1); redefine(['a'], f);".into();
        assert!(!AmdFormat.detect(&load));
    }

    #[test]
    fn test_prepare_deps_records_pseudo_positions() {
        let (deps, meta) = prepare_deps(strings(&["a", "require", "b", "exports", "module", "a"]));
        assert_eq!(deps, vec!["a", "b"]);
        assert_eq!(meta.require_index, Some(1));
        assert_eq!(meta.exports_index, Some(2));
        assert_eq!(meta.module_index, Some(2));
    }

    #[test]
    fn test_parse_forms() {
        let call = DefineCall::parse(
            &[
                Value::from("named"),
                Value::Array(vec![Value::from("a")]),
                Value::from(1.0),
            ],
            "",
        )
        .unwrap();
        assert_eq!(call.name.as_deref(), Some("named"));
        assert_eq!(call.deps, vec!["a"]);

        let sugar = Function::anonymous(|_| Ok(Value::Undefined))
            .with_source("function (require) { var x = require('x'); }");
        let call = DefineCall::parse(&[Value::Function(Arc::new(sugar))], "").unwrap();
        assert_eq!(call.deps, strings(&["require", "exports", "module", "x"]));

        let call = DefineCall::parse(&[Value::from(5.0)], "").unwrap();
        assert_eq!(call.factory, Value::from(5.0));
        assert!(DefineCall::parse(&[Value::Array(vec![Value::Null])], "").is_err());
    }

    #[test]
    fn test_injection_restores_pseudo_positions() {
        let (_, meta) = prepare_deps(strings(&["require", "exports", "module"]));
        let injection = Injection::new(&meta, "m", "m.js", &[], WeakLoader::default());
        assert_eq!(injection.args.len(), 3);
        assert!(injection.args[0].is_function());
        let exports = injection.args[1].clone();
        assert_eq!(injection.args[2].get("exports"), exports);
        assert_eq!(injection.args[2].get("id"), Value::from("m"));
    }

    #[test]
    fn test_factory_result_wins_over_exports() {
        let (_, meta) = prepare_deps(strings(&["exports"]));
        let factory = Value::function("factory", |args| {
            args[0].as_object().unwrap().set("x", Value::from(1.0));
            Ok(Value::Undefined)
        });
        let output = Injection::new(&meta, "m", "m.js", &[], WeakLoader::default())
            .call(&factory)
            .unwrap();
        assert_eq!(output.get("x"), Value::from(1.0));

        let factory = Value::function("factory", |_| Ok(Value::from("value")));
        let output = Injection::new(&meta, "m", "m.js", &[], WeakLoader::default())
            .call(&factory)
            .unwrap();
        assert_eq!(output, Value::from("value"));
    }
}
