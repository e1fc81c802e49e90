//! The script-execution primitive the loader runs module bodies with.
//!
//! The loader never interprets module source itself: every format hands
//! the source and a [`Scope`] to a [`ScriptHost`] and reads back whatever
//! the script left in its bindings.

use super::object::{Object, ObjectRef};
use super::value::Value;
use crate::error::Result;

/// A script to run.
#[derive(Debug, Clone, Copy)]
pub struct Script<'a> {
    /// Normalized module name
    pub name: &'a str,
    /// Address the source was fetched from
    pub address: &'a str,
    /// Source text
    pub source: &'a str,
}

/// Bindings visible to a running script.
///
/// Identifier lookup checks the local bindings first and falls back to the
/// global object; assigning a name that is not bound locally writes the
/// global object.
#[derive(Debug, Clone)]
pub struct Scope {
    global: ObjectRef,
    locals: ObjectRef,
}

impl Scope {
    /// A scope with no local bindings.
    pub fn global(global: ObjectRef) -> Self {
        Self {
            global,
            locals: ObjectRef::new(),
        }
    }

    /// A scope with the given local bindings ahead of the global object.
    pub fn with_locals(global: ObjectRef, locals: Object) -> Self {
        Self {
            global,
            locals: ObjectRef::from_object(locals),
        }
    }

    /// Adds a local binding.
    pub fn bind(&self, name: impl Into<String>, value: Value) {
        self.locals.set(name, value);
    }

    /// Resolves an identifier.
    pub fn lookup(&self, name: &str) -> Value {
        if self.locals.has(name) {
            self.locals.get(name)
        } else {
            self.global.get(name)
        }
    }

    /// Assigns an identifier.
    pub fn assign(&self, name: &str, value: Value) {
        if self.locals.has(name) {
            self.locals.set(name, value);
        } else {
            self.global.set(name, value);
        }
    }

    /// Whether `name` is bound locally.
    pub fn has_local(&self, name: &str) -> bool {
        self.locals.has(name)
    }

    /// The global object.
    pub fn global_object(&self) -> &ObjectRef {
        &self.global
    }

    /// The local bindings.
    pub fn locals(&self) -> &ObjectRef {
        &self.locals
    }
}

/// A script engine.
///
/// `execute` runs synchronously to completion. Failures should be reported
/// as [`LoaderError::Execution`](crate::LoaderError::Execution).
pub trait ScriptHost: Send + Sync {
    /// Runs `script` against `scope`.
    fn execute(&self, script: &Script<'_>, scope: &Scope) -> Result<()>;
}

impl<F> ScriptHost for F
where
    F: Fn(&Script<'_>, &Scope) -> Result<()> + Send + Sync,
{
    fn execute(&self, script: &Script<'_>, scope: &Scope) -> Result<()> {
        self(script, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locals_shadow_globals() {
        let global = ObjectRef::new();
        global.set("module", Value::from("global module"));

        let mut locals = Object::new();
        locals.set("module".into(), Value::Undefined);
        let scope = Scope::with_locals(global.clone(), locals);

        assert!(scope.lookup("module").is_undefined());

        scope.assign("leak", Value::from(1.0));
        assert_eq!(global.get("leak"), Value::from(1.0));

        scope.assign("module", Value::from(2.0));
        assert_eq!(global.get("module"), Value::from("global module"));
    }

    #[test]
    fn test_closure_host() {
        let host = |script: &Script<'_>, scope: &Scope| -> Result<()> {
            scope.assign("ran", Value::from(script.name));
            Ok(())
        };
        let global = ObjectRef::new();
        let scope = Scope::global(global.clone());
        host.execute(
            &Script {
                name: "a",
                address: "a.js",
                source: "",
            },
            &scope,
        )
        .unwrap();

        assert_eq!(global.get("ran"), Value::from("a"));
    }
}
