//! Native function representation.

use super::object::ObjectRef;
use super::value::Value;
use crate::error::Result;
use std::fmt;

/// The signature of a native function body.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A callable value.
///
/// Both loader-provided bindings (`define`, `require`, ...) and the
/// functions a script host hands back (factories, plugin hooks) are
/// represented as native closures.
pub struct Function {
    /// The function name (if any)
    name: Option<String>,
    /// Source text of the function body, when the host can provide it
    source: Option<String>,
    /// Properties attached to the function object (`define.amd`)
    properties: ObjectRef,
    /// The native body
    body: Box<NativeFn>,
}

impl Function {
    /// Creates a new native function.
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            source: None,
            properties: ObjectRef::new(),
            body: Box::new(body),
        }
    }

    /// Creates an anonymous native function.
    pub fn anonymous<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: None,
            source: None,
            properties: ObjectRef::new(),
            body: Box::new(body),
        }
    }

    /// Attaches the source text of the function.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Calls the function.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args)
    }

    /// The function name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The function's source text.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Properties of the function object.
    pub fn properties(&self) -> &ObjectRef {
        &self.properties
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "NativeFunction({})", name),
            None => write!(f, "NativeFunction(anonymous)"),
        }
    }
}
