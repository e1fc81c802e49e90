//! Shared fixtures for loader integration tests
//!
//! Module bodies are Rust closures keyed by module name; the fetched source
//! only has to carry whatever text format detection and dependency
//! scanning look at.

#![allow(dead_code)]

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use spacey_loader::{
    LoaderBuilder, LoaderConfig, LoaderError, MemoryFetcher, Result, Scope, Script, ScriptHost,
    Value,
};
use std::sync::Arc;

type Body = Arc<dyn Fn(&Script<'_>, &Scope) -> Result<()> + Send + Sync>;

/// A host that runs registered closures in place of script text.
#[derive(Clone, Default)]
pub struct ScriptedHost {
    bodies: Arc<Mutex<FxHashMap<String, Body>>>,
    runs: Arc<Mutex<FxHashMap<String, usize>>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` whenever the module `name` executes.
    pub fn on<F>(&self, name: &str, body: F) -> &Self
    where
        F: Fn(&Script<'_>, &Scope) -> Result<()> + Send + Sync + 'static,
    {
        self.bodies.lock().insert(name.to_string(), Arc::new(body));
        self
    }

    /// How many times `name` was run.
    pub fn runs(&self, name: &str) -> usize {
        self.runs.lock().get(name).copied().unwrap_or(0)
    }
}

impl ScriptHost for ScriptedHost {
    fn execute(&self, script: &Script<'_>, scope: &Scope) -> Result<()> {
        *self.runs.lock().entry(script.name.to_string()).or_default() += 1;
        let body = self.bodies.lock().get(script.name).cloned();
        match body {
            Some(body) => body(script, scope),
            None => Ok(()),
        }
    }
}

/// Call the function bound to `name` in `scope`.
pub fn call(scope: &Scope, name: &str, args: &[Value]) -> Result<Value> {
    match scope.lookup(name) {
        Value::Function(f) => f.call(args),
        other => Err(LoaderError::type_error(format!(
            "{name} is not a function but {}",
            other.type_of()
        ))),
    }
}

/// Strings as an array value.
pub fn strings(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(*s)).collect())
}

/// A function value.
pub fn func<F>(body: F) -> Value
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
{
    Value::function("f", body)
}

/// Set `module.exports` from inside a CommonJS body.
pub fn set_exports(scope: &Scope, value: Value) {
    if let Value::Object(module) = scope.lookup("module") {
        module.set("exports", value);
    }
}

/// A loader over `host` and `fetcher` with JSON configuration.
pub fn loader_with(host: &ScriptedHost, fetcher: MemoryFetcher, config: &str) -> spacey_loader::Loader {
    let config = LoaderConfig::from_json(config).unwrap();
    LoaderBuilder::new(host.clone(), fetcher)
        .config(config)
        .build()
        .unwrap()
}

/// A loader with default configuration.
pub fn loader(host: &ScriptedHost, fetcher: MemoryFetcher) -> spacey_loader::Loader {
    loader_with(host, fetcher, "{}")
}

/// Fail a module body instead of panicking inside the loader's task.
pub fn ensure(condition: bool, what: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(LoaderError::type_error(format!("check failed: {what}")))
    }
}
